//! Collection of configured image list sources
//!
//! The manager owns every source plus the collaborators needed to act on
//! them: the source store, the cache, the transport and the dispatcher.
//! Fetch failures are isolated per list; only configuration and cache
//! faults abort an operation.

use crate::cache::{CacheManager, SyncReport};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::dispatcher::{create_dispatcher, Dispatcher};
use crate::error::{ImgsyncError, ImgsyncResult};
use crate::image_list::is_plain_name;
use crate::image_list::source::ImageListSource;
use crate::image_list::store::{SourceMap, SourceStore};
use crate::transport::Transport;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// A list that could not be fetched
#[derive(Debug)]
pub struct FetchFailure {
    pub name: String,
    pub url: String,
    pub error: ImgsyncError,
}

/// Result of fetching one or more lists
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Lists fetched successfully
    pub fetched: Vec<String>,
    pub failures: Vec<FetchFailure>,
}

/// Result of a full fetch and cache sync
#[derive(Debug)]
pub struct SyncSummary {
    pub fetch: FetchReport,
    pub cache: SyncReport,
}

pub struct ListManager {
    store: SourceStore,
    lists: BTreeMap<String, ImageListSource>,
    cache: CacheManager,
    transport: Arc<dyn Transport>,
    dispatcher: Box<dyn Dispatcher>,
}

impl ListManager {
    /// Build a manager from configuration; no sources are loaded yet
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        cancel: CancelToken,
    ) -> ImgsyncResult<Self> {
        let dispatcher = create_dispatcher(&config.dispatcher)?;
        let cache = CacheManager::new(
            &config.cache.path,
            config.sync.download_workers,
            transport.clone(),
            cancel,
        );

        Ok(Self::with_parts(
            SourceStore::new(&config.sources.path),
            cache,
            transport,
            dispatcher,
        ))
    }

    pub fn with_parts(
        store: SourceStore,
        cache: CacheManager,
        transport: Arc<dyn Transport>,
        dispatcher: Box<dyn Dispatcher>,
    ) -> Self {
        Self {
            store,
            lists: BTreeMap::new(),
            cache,
            transport,
            dispatcher,
        }
    }

    pub fn store(&self) -> &SourceStore {
        &self.store
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Load every source from the store; the file must exist
    pub fn load_sources(&mut self) -> ImgsyncResult<usize> {
        let sources = self.store.load()?;
        self.replace_sources(sources)
    }

    /// Load sources, treating a missing store file as empty
    pub fn load_sources_or_default(&mut self) -> ImgsyncResult<usize> {
        let sources = self.store.load_or_default()?;
        self.replace_sources(sources)
    }

    fn replace_sources(&mut self, sources: SourceMap) -> ImgsyncResult<usize> {
        let mut lists = BTreeMap::new();
        for (name, definition) in sources {
            if !is_plain_name(&name) {
                return Err(ImgsyncError::SourcesInvalid {
                    path: self.store.path().to_path_buf(),
                    reason: format!("'{}' is not a valid list name", name),
                });
            }
            lists.insert(name.clone(), ImageListSource::new(name, definition));
        }

        self.lists = lists;
        debug!("Loaded {} image list source(s)", self.lists.len());
        Ok(self.lists.len())
    }

    /// Add a source; an existing one with the same name is only replaced
    /// when `force` is set
    pub fn add_source(&mut self, source: ImageListSource, force: bool) -> ImgsyncResult<()> {
        if !is_plain_name(source.name()) {
            return Err(ImgsyncError::invalid_list(format!(
                "'{}' is not a valid list name",
                source.name()
            )));
        }
        if self.lists.contains_key(source.name()) && !force {
            return Err(ImgsyncError::DuplicatedImageList(source.name().to_string()));
        }

        info!("Adding image list '{}' ({})", source.name(), source.url());
        self.lists.insert(source.name().to_string(), source);
        Ok(())
    }

    pub fn remove_source(&mut self, name: &str) -> ImgsyncResult<ImageListSource> {
        let removed = self
            .lists
            .remove(name)
            .ok_or_else(|| ImgsyncError::ListNotFound(name.to_string()))?;
        info!("Removed image list '{}'", name);
        Ok(removed)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> ImgsyncResult<()> {
        let source = self
            .lists
            .get_mut(name)
            .ok_or_else(|| ImgsyncError::ListNotFound(name.to_string()))?;
        source.set_enabled(enabled);
        info!(
            "Image list '{}' {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ImageListSource> {
        self.lists.get(name)
    }

    /// Sources in name order
    pub fn lists(&self) -> impl Iterator<Item = &ImageListSource> {
        self.lists.values()
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Fetch a single list by name.
    ///
    /// An unknown name is an error; a failed fetch is logged and reported.
    pub fn fetch_one(&mut self, name: &str) -> ImgsyncResult<FetchReport> {
        let source = self.lists.get_mut(name).ok_or_else(|| {
            ImgsyncError::invalid_list(format!("'{}' not found in configuration", name))
        })?;

        let mut report = FetchReport::default();
        fetch_and_verify(source, self.transport.as_ref(), &mut report);
        Ok(report)
    }

    /// Fetch every list, carrying on past failures
    pub fn fetch_all(&mut self) -> FetchReport {
        let mut report = FetchReport::default();
        for source in self.lists.values_mut() {
            fetch_and_verify(source, self.transport.as_ref(), &mut report);
        }
        info!(
            "Fetched {} list(s), {} failed",
            report.fetched.len(),
            report.failures.len()
        );
        report
    }

    /// Fetch every list and reconcile the cache with the result
    pub fn sync_cache(&mut self) -> ImgsyncResult<SyncSummary> {
        let fetch = self.fetch_all();
        let cache = self.cache.sync(self.lists.values_mut())?;
        Ok(SyncSummary { fetch, cache })
    }

    /// Notify the dispatcher about every list, after a full sync when
    /// `notify_after_sync` is set
    pub fn dispatch(&mut self, notify_after_sync: bool) -> ImgsyncResult<Option<SyncSummary>> {
        let summary = if notify_after_sync {
            Some(self.sync_cache()?)
        } else {
            None
        };

        for source in self.lists.values() {
            debug!(
                "Dispatching list '{}' via {}",
                source.name(),
                self.dispatcher.name()
            );
            self.dispatcher.dispatch(source);
        }

        Ok(summary)
    }

    /// Write every source definition back to the store
    pub fn persist_sources(&self) -> ImgsyncResult<()> {
        let sources: SourceMap = self
            .lists
            .iter()
            .map(|(name, source)| (name.clone(), source.definition().clone()))
            .collect();
        self.store.save(&sources)
    }
}

fn fetch_and_verify(
    source: &mut ImageListSource,
    transport: &dyn Transport,
    report: &mut FetchReport,
) {
    match source.fetch(transport) {
        Ok(()) => report.fetched.push(source.name().to_string()),
        Err(e) => {
            error!(
                "Error loading list '{}' from '{}': {}",
                source.name(),
                source.url(),
                e
            );
            report.failures.push(FetchFailure {
                name: source.name().to_string(),
                url: source.url().to_string(),
                error: e,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Hasher;
    use crate::dispatcher::testing::RecordingDispatcher;
    use crate::dispatcher::NoopDispatcher;
    use crate::image_list::hepix::fixtures::{image_entry, list_document};
    use crate::image_list::source::SourceDefinition;
    use crate::transport::testing::MemoryTransport;
    use std::fs;
    use tempfile::TempDir;

    const LIST_A: &str = "https://lists.example.org/a.json";
    const LIST_B: &str = "https://lists.example.org/b.json";
    const IMG_B: &str = "https://images.example.org/b-1.qcow2";

    struct Fixture {
        dir: TempDir,
        transport: Arc<MemoryTransport>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                transport: Arc::new(MemoryTransport::new()),
            }
        }

        fn root(&self) -> std::path::PathBuf {
            self.dir.path().join("cache")
        }

        fn manager(&self, dispatcher: Box<dyn Dispatcher>) -> ListManager {
            let cache = CacheManager::new(
                self.root(),
                2,
                self.transport.clone(),
                CancelToken::new(),
            );
            ListManager::with_parts(
                SourceStore::new(self.dir.path().join("sources.toml")),
                cache,
                self.transport.clone(),
                dispatcher,
            )
        }

        /// Publish list B with one image whose bytes match its digest
        fn publish_list_b(&self) {
            let mut hasher = Hasher::new();
            hasher.update(b"b-1 bytes");
            self.transport.insert(IMG_B, b"b-1 bytes".to_vec());
            self.transport.insert(
                LIST_B,
                list_document(
                    vec![image_entry("b-1", IMG_B, &hasher.finalize_hex())],
                    "2999-01-01T00:00:00Z",
                ),
            );
        }
    }

    fn source(name: &str, url: &str) -> ImageListSource {
        ImageListSource::new(name, SourceDefinition::new(url))
    }

    #[test]
    fn duplicate_add_leaves_original_untouched() {
        let fx = Fixture::new();
        let mut manager = fx.manager(Box::new(NoopDispatcher));
        let mut original = SourceDefinition::new(LIST_A);
        original.prefix = "A ".to_string();
        manager
            .add_source(ImageListSource::new("a", original), false)
            .unwrap();

        let err = manager.add_source(source("a", LIST_B), false).unwrap_err();

        assert!(matches!(err, ImgsyncError::DuplicatedImageList(ref n) if n == "a"));
        let kept = manager.get("a").unwrap();
        assert_eq!(kept.url(), LIST_A);
        assert_eq!(kept.prefix(), "A ");
    }

    #[test]
    fn forced_add_replaces_source() {
        let fx = Fixture::new();
        let mut manager = fx.manager(Box::new(NoopDispatcher));
        manager.add_source(source("a", LIST_A), false).unwrap();
        manager.add_source(source("a", LIST_B), true).unwrap();

        assert_eq!(manager.get("a").unwrap().url(), LIST_B);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn rejects_path_like_names() {
        let fx = Fixture::new();
        let mut manager = fx.manager(Box::new(NoopDispatcher));
        for name in ["..", "a/b", ""] {
            assert!(manager.add_source(source(name, LIST_A), false).is_err());
        }
    }

    #[test]
    fn fetch_one_unknown_name() {
        let fx = Fixture::new();
        let mut manager = fx.manager(Box::new(NoopDispatcher));

        let err = manager.fetch_one("nope").unwrap_err();
        assert!(matches!(err, ImgsyncError::InvalidImageList(ref r) if r.contains("not found")));
    }

    #[test]
    fn fetch_failure_is_reported_not_raised() {
        let fx = Fixture::new();
        let mut manager = fx.manager(Box::new(NoopDispatcher));
        manager.add_source(source("a", LIST_A), false).unwrap();

        let report = manager.fetch_one("a").unwrap();

        assert!(report.fetched.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(!manager.get("a").unwrap().is_fetched());
    }

    #[test]
    fn partial_failure_isolation() {
        let fx = Fixture::new();
        fx.publish_list_b();
        // A was cached by an earlier run
        fs::create_dir_all(fx.root().join("a").join("images")).unwrap();
        fs::write(fx.root().join("a").join("images").join("a-1"), b"old").unwrap();

        let mut manager = fx.manager(Box::new(NoopDispatcher));
        manager.add_source(source("a", LIST_A), false).unwrap();
        manager.add_source(source("b", LIST_B), false).unwrap();

        let summary = manager.sync_cache().unwrap();

        assert_eq!(summary.fetch.fetched, vec!["b".to_string()]);
        assert_eq!(summary.fetch.failures.len(), 1);
        assert_eq!(summary.fetch.failures[0].name, "a");

        let b_image = fx.root().join("b").join("images").join("b-1");
        assert_eq!(fs::read(&b_image).unwrap(), b"b-1 bytes");
        assert!(fx.root().join("a").is_dir());
        assert!(!fx.root().join("a").join("images").exists());
    }

    #[test]
    fn dispatch_after_sync_sees_downloaded_images() {
        let fx = Fixture::new();
        fx.publish_list_b();
        let recorder = RecordingDispatcher::default();
        let mut manager = fx.manager(Box::new(recorder.clone()));
        manager.add_source(source("b", LIST_B), false).unwrap();

        let summary = manager.dispatch(true).unwrap();

        assert!(summary.is_some());
        assert_eq!(*recorder.seen.lock().unwrap(), vec![("b".to_string(), 1)]);
    }

    #[test]
    fn dispatch_without_sync_is_immediate() {
        let fx = Fixture::new();
        fx.publish_list_b();
        let recorder = RecordingDispatcher::default();
        let mut manager = fx.manager(Box::new(recorder.clone()));
        manager.add_source(source("b", LIST_B), false).unwrap();

        let summary = manager.dispatch(false).unwrap();

        assert!(summary.is_none());
        assert_eq!(fx.transport.requests(), 0);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![("b".to_string(), 0)]);
    }

    #[test]
    fn persist_then_load_round_trip() {
        let fx = Fixture::new();
        let mut manager = fx.manager(Box::new(NoopDispatcher));
        let mut definition = SourceDefinition::new(LIST_A);
        definition.subscribed_images.insert("a-1".to_string());
        manager
            .add_source(ImageListSource::new("a", definition.clone()), false)
            .unwrap();
        manager.add_source(source("b", LIST_B), false).unwrap();
        manager.set_enabled("b", false).unwrap();
        manager.persist_sources().unwrap();

        let mut reloaded = fx.manager(Box::new(NoopDispatcher));
        assert_eq!(reloaded.load_sources().unwrap(), 2);
        assert_eq!(reloaded.get("a").unwrap().definition(), &definition);
        assert!(!reloaded.get("b").unwrap().is_enabled());
    }

    #[test]
    fn persisting_no_sources_fails() {
        let fx = Fixture::new();
        let manager = fx.manager(Box::new(NoopDispatcher));
        assert!(matches!(
            manager.persist_sources(),
            Err(ImgsyncError::EmptySerialization(_))
        ));
    }

    #[test]
    fn load_requires_sources_file() {
        let fx = Fixture::new();
        let mut manager = fx.manager(Box::new(NoopDispatcher));

        assert!(matches!(
            manager.load_sources(),
            Err(ImgsyncError::CannotOpenFile { .. })
        ));
        assert_eq!(manager.load_sources_or_default().unwrap(), 0);
    }

    #[test]
    fn remove_and_toggle_unknown_list() {
        let fx = Fixture::new();
        let mut manager = fx.manager(Box::new(NoopDispatcher));

        assert!(matches!(
            manager.remove_source("x"),
            Err(ImgsyncError::ListNotFound(_))
        ));
        assert!(matches!(
            manager.set_enabled("x", true),
            Err(ImgsyncError::ListNotFound(_))
        ));
    }
}
