//! Integration tests for imgsync

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn imgsync() -> Command {
        cargo_bin_cmd!("imgsync")
    }

    #[test]
    fn help_displays() {
        imgsync()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("mirror virtual machine images"));
    }

    #[test]
    fn version_displays() {
        imgsync()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("imgsync"));
    }

    #[test]
    fn completions_generate() {
        imgsync()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("imgsync"));
    }

    #[test]
    fn unknown_command_fails() {
        imgsync().arg("frobnicate").assert().failure();
    }
}

mod sync_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use imgsync::checksum::Hasher;
    use predicates::prelude::*;
    use serde_json::json;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Isolated config, sources file, cache and published lists
    struct Env {
        dir: TempDir,
    }

    impl Env {
        fn new() -> Self {
            let env = Self {
                dir: TempDir::new().unwrap(),
            };
            let config = format!(
                "[general]\naudit_log = false\n\n[cache]\npath = {:?}\n\n[sources]\npath = {:?}\n\n[dispatcher]\nkind = \"log\"\n",
                env.cache().display().to_string(),
                env.sources().display().to_string(),
            );
            fs::write(env.config(), config).unwrap();
            fs::create_dir_all(env.published()).unwrap();
            env
        }

        fn config(&self) -> PathBuf {
            self.dir.path().join("config.toml")
        }

        fn sources(&self) -> PathBuf {
            self.dir.path().join("sources.toml")
        }

        fn cache(&self) -> PathBuf {
            self.dir.path().join("cache")
        }

        fn published(&self) -> PathBuf {
            self.dir.path().join("published")
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("imgsync");
            cmd.arg("--config").arg(self.config());
            cmd
        }

        /// Publish an image file and return its URI and digest
        fn publish_image(&self, name: &str, content: &[u8]) -> (String, String) {
            let path = self.published().join(name);
            fs::write(&path, content).unwrap();
            let mut hasher = Hasher::new();
            hasher.update(content);
            (format!("file://{}", path.display()), hasher.finalize_hex())
        }

        /// Publish a HEPiX list and return its URI
        fn publish_list(&self, name: &str, images: &[(&str, &str, &str)]) -> String {
            let entries: Vec<_> = images
                .iter()
                .map(|(id, uri, digest)| image_entry(id, uri, digest))
                .collect();
            let document = json!({
                "hv:imagelist": {
                    "dc:identifier": name,
                    "dc:title": format!("List {name}"),
                    "dc:date:expires": "2999-01-01T00:00:00Z",
                    "hv:endorser": {"hv:x509": {"hv:dn": "/DC=org/CN=Test Endorser"}},
                    "hv:images": entries,
                }
            });
            let path = self.published().join(format!("{name}.json"));
            fs::write(&path, document.to_string()).unwrap();
            format!("file://{}", path.display())
        }

        fn add(&self, name: &str, url: &str) {
            self.cmd()
                .args(["add", name, "--url", url])
                .assert()
                .success();
        }
    }

    fn image_entry(identifier: &str, uri: &str, digest: &str) -> serde_json::Value {
        json!({
            "hv:image": {
                "ad:group": "test.vo",
                "ad:mpuri": "https://marketplace.example.org/1",
                "ad:user:fullname": "Test User",
                "ad:user:guid": "1",
                "ad:user:uri": "https://marketplace.example.org/users/1",
                "dc:description": "",
                "dc:identifier": identifier,
                "dc:title": format!("Image {identifier}"),
                "hv:hypervisor": "KVM",
                "hv:format": "raw",
                "hv:size": "3",
                "hv:uri": uri,
                "hv:version": "1",
                "sl:arch": "x86_64",
                "sl:checksum:sha512": digest,
                "sl:comments": "",
                "sl:os": "Linux",
                "sl:osname": "Test",
                "sl:osversion": "1"
            }
        })
    }

    /// Every path under `root`, relative, root excluded
    fn tree(root: &Path) -> Vec<String> {
        let mut paths: Vec<String> = walkdir::WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| {
                e.unwrap()
                    .path()
                    .strip_prefix(root)
                    .unwrap()
                    .display()
                    .to_string()
            })
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn lists_without_sources_file_hints_add() {
        let env = Env::new();
        env.cmd()
            .arg("lists")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cannot open file"))
            .stderr(predicate::str::contains("imgsync add"));
    }

    #[test]
    fn config_path_honors_flag() {
        let env = Env::new();
        env.cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_prints_sections() {
        let env = Env::new();
        env.cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("download_workers"));
    }

    #[test]
    fn add_then_lists() {
        let env = Env::new();
        env.add("egi", "https://lists.example.org/egi.json");

        env.cmd()
            .args(["lists", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::eq("egi\n"));

        let stored = fs::read_to_string(env.sources()).unwrap();
        assert!(stored.contains("[egi]"));
    }

    #[test]
    fn duplicate_add_needs_force() {
        let env = Env::new();
        env.add("egi", "https://lists.example.org/egi.json");

        env.cmd()
            .args(["add", "egi", "--url", "https://lists.example.org/other.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"))
            .stderr(predicate::str::contains("--force"));

        env.cmd()
            .args(["add", "egi", "--url", "https://lists.example.org/other.json", "--force"])
            .assert()
            .success();
        assert!(fs::read_to_string(env.sources())
            .unwrap()
            .contains("other.json"));
    }

    #[test]
    fn sync_mirrors_subscribed_images() {
        let env = Env::new();
        let (uri, digest) = env.publish_image("img-1.raw", b"one");
        let list = env.publish_list("examples", &[("img-1", &uri, &digest)]);
        env.add("examples", &list);

        env.cmd().arg("sync").assert().success();

        assert_eq!(
            tree(&env.cache()),
            vec!["examples", "examples/images", "examples/images/img-1"]
        );
        assert_eq!(
            fs::read(env.cache().join("examples/images/img-1")).unwrap(),
            b"one"
        );
    }

    #[test]
    fn sync_sweeps_disabled_lists() {
        let env = Env::new();
        let (uri, digest) = env.publish_image("img-1.raw", b"one");
        let list = env.publish_list("old", &[("img-1", &uri, &digest)]);
        env.add("old", &list);
        env.cmd().arg("sync").assert().success();
        assert!(env.cache().join("old/images/img-1").exists());

        env.cmd().args(["disable", "old"]).assert().success();
        env.cmd().arg("sync").assert().success();

        assert!(!env.cache().join("old").exists());
        assert!(tree(&env.cache()).is_empty());
    }

    #[test]
    fn sync_reports_checksum_mismatch_without_failing() {
        let env = Env::new();
        let (uri, _) = env.publish_image("img-1.raw", b"tampered");
        let (_, expected) = env.publish_image("reference.raw", b"one");
        let list = env.publish_list("examples", &[("img-1", &uri, &expected)]);
        env.add("examples", &list);

        env.cmd()
            .arg("sync")
            .assert()
            .success()
            .stdout(predicate::str::contains("Verification of image 'img-1' failed"));
    }

    #[test]
    fn broken_list_does_not_stop_others() {
        let env = Env::new();
        let (uri, digest) = env.publish_image("img-1.raw", b"one");
        let good = env.publish_list("good", &[("img-1", &uri, &digest)]);
        env.add("good", &good);
        env.add("broken", "file:///nonexistent/list.json");

        env.cmd().arg("sync").assert().success();
        assert!(env.cache().join("good/images/img-1").exists());
        assert!(env.cache().join("broken").is_dir());

        env.cmd()
            .arg("fetch")
            .assert()
            .failure()
            .stderr(predicate::str::contains("1 of 2 list(s) could not be fetched"));
    }

    #[test]
    fn show_lists_images() {
        let env = Env::new();
        let (uri, digest) = env.publish_image("img-1.raw", b"one");
        let list = env.publish_list("examples", &[("img-1", &uri, &digest)]);
        env.add("examples", &list);

        env.cmd()
            .args(["show", "examples", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::eq("img-1\n"));
    }

    #[test]
    fn remove_last_list_clears_sources() {
        let env = Env::new();
        env.add("egi", "https://lists.example.org/egi.json");

        env.cmd()
            .args(["remove", "egi", "--yes"])
            .assert()
            .success();
        assert!(!env.sources().exists());
    }

    #[test]
    fn dispatch_with_sync_downloads() {
        let env = Env::new();
        let (uri, digest) = env.publish_image("img-1.raw", b"one");
        let list = env.publish_list("examples", &[("img-1", &uri, &digest)]);
        env.add("examples", &list);

        env.cmd()
            .args(["dispatch", "--sync"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dispatched 1 list(s) via 'log'"));
        assert!(env.cache().join("examples/images/img-1").exists());
    }
}
