//! Persisted image list source definitions
//!
//! Sources live in a TOML file with one table per list name:
//!
//! ```toml
//! [egi]
//! url = "https://appdb.egi.eu/store/vo/image.list"
//! prefix = "EGI "
//! subscribed_images = ["img-1"]
//! ```

use crate::error::{ImgsyncError, ImgsyncResult};
use crate::image_list::source::SourceDefinition;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Source definitions keyed by list name
pub type SourceMap = BTreeMap<String, SourceDefinition>;

/// File-backed store of source definitions
#[derive(Debug, Clone)]
pub struct SourceStore {
    path: PathBuf,
}

impl SourceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every definition; the file must exist
    pub fn load(&self) -> ImgsyncResult<SourceMap> {
        let content = fs::read_to_string(&self.path).map_err(|e| ImgsyncError::CannotOpenFile {
            path: self.path.clone(),
            source: e,
        })?;

        let sources: SourceMap =
            toml::from_str(&content).map_err(|e| ImgsyncError::SourcesInvalid {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            "Loaded {} source(s) from {}",
            sources.len(),
            self.path.display()
        );
        Ok(sources)
    }

    /// Like [`load`](Self::load), but a missing file yields no sources
    pub fn load_or_default(&self) -> ImgsyncResult<SourceMap> {
        match self.load() {
            Err(ImgsyncError::CannotOpenFile { source, .. })
                if source.kind() == ErrorKind::NotFound =>
            {
                debug!("No sources file at {}", self.path.display());
                Ok(SourceMap::new())
            }
            other => other,
        }
    }

    /// Write every definition, replacing the file
    pub fn save(&self, sources: &SourceMap) -> ImgsyncResult<()> {
        let content = toml::to_string_pretty(sources)?;
        if content.trim().is_empty() {
            return Err(ImgsyncError::EmptySerialization(self.path.clone()));
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ImgsyncError::ConfigDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        fs::write(&self.path, content)
            .map_err(|e| ImgsyncError::io(format!("writing {}", self.path.display()), e))?;

        info!("Saved {} source(s) to {}", sources.len(), self.path.display());
        Ok(())
    }

    /// Delete the file; used once the last source is removed
    pub fn clear(&self) -> ImgsyncResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ImgsyncError::io(
                format!("removing {}", self.path.display()),
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_list::source::SourceKind;
    use tempfile::TempDir;

    #[test]
    fn persist_then_load_is_equivalent() {
        let dir = TempDir::new().unwrap();
        let store = SourceStore::new(dir.path().join("etc").join("sources.toml"));

        let mut egi = SourceDefinition::new("https://lists.example.org/egi.json");
        egi.prefix = "EGI ".to_string();
        egi.subscribed_images.insert("img-1".to_string());
        egi.endorser = Some("/DC=org/CN=Endorser".to_string());
        let mut old = SourceDefinition::new("file:///srv/old.json");
        old.enabled = false;

        let mut sources = SourceMap::new();
        sources.insert("egi".to_string(), egi);
        sources.insert("old".to_string(), old);

        store.save(&sources).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, sources);
        assert_eq!(loaded["egi"].kind, SourceKind::Hepix);
    }

    #[test]
    fn missing_file_cannot_be_opened() {
        let dir = TempDir::new().unwrap();
        let store = SourceStore::new(dir.path().join("sources.toml"));

        assert!(matches!(
            store.load(),
            Err(ImgsyncError::CannotOpenFile { .. })
        ));
        assert!(store.load_or_default().unwrap().is_empty());
    }

    #[test]
    fn malformed_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sources.toml");
        fs::write(&path, "[egi]\nenabled = true\n").unwrap();

        let err = SourceStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ImgsyncError::SourcesInvalid { .. }));
    }

    #[test]
    fn empty_serialization_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sources.toml");
        fs::write(&path, "[egi]\nurl = \"x\"\n").unwrap();

        let err = SourceStore::new(&path).save(&SourceMap::new()).unwrap_err();
        assert!(matches!(err, ImgsyncError::EmptySerialization(_)));
        // Existing file is left alone
        assert!(fs::read_to_string(&path).unwrap().contains("[egi]"));
    }
}
