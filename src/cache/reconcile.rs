//! Mark-and-sweep reconciliation of the image cache
//!
//! The mark phase walks the enabled sources, downloads what eligible lists
//! subscribe to and records every path that belongs in the cache. The
//! sweep phase walks the whole tree and removes everything unrecorded.
//!
//! ```text
//! <root>/
//! ├── <list>/            every enabled list
//! │   └── images/        trusted, verified, unexpired lists only
//! │       └── <identifier>
//! ```

use crate::cache::lock::CacheLock;
use crate::cancel::CancelToken;
use crate::error::{ImgsyncError, ImgsyncResult};
use crate::image::{DownloadOutcome, Image};
use crate::image_list::ImageListSource;
use crate::transport::Transport;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Directory holding a list's images
pub const IMAGES_DIR: &str = "images";

/// An image present and verified in the cache after a sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub list: String,
    pub identifier: String,
    pub path: PathBuf,
    /// Bytes transferred; zero when the copy on disk was reused
    pub bytes: u64,
}

/// An image that could not be brought into the cache
#[derive(Debug)]
pub struct ImageFailure {
    pub list: String,
    pub identifier: String,
    pub error: ImgsyncError,
}

/// What a sync changed
#[derive(Debug)]
pub struct SyncReport {
    pub run_id: Uuid,
    /// Images transferred in this run
    pub downloaded: Vec<CachedImage>,
    /// Images already valid on disk
    pub cached: Vec<CachedImage>,
    pub failures: Vec<ImageFailure>,
    /// Paths removed by the sweep
    pub removed: Vec<PathBuf>,
}

impl SyncReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            downloaded: Vec::new(),
            cached: Vec::new(),
            failures: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.downloaded.iter().map(|img| img.bytes).sum()
    }
}

/// Paths recorded during the mark phase
#[derive(Default)]
struct Marks {
    /// Paths that belong in the cache
    valid: HashSet<PathBuf>,
    /// Not valid, but spared by this sweep: files first written by this
    /// run that failed verification
    deferred: HashSet<PathBuf>,
}

/// Outcome of one image download within a list
struct Attempt {
    identifier: String,
    /// The target file was on disk before the download started
    preexisting: bool,
    result: ImgsyncResult<(DownloadOutcome, PathBuf)>,
}

/// Owner of the cache root
pub struct CacheManager {
    root: PathBuf,
    workers: usize,
    transport: Arc<dyn Transport>,
    cancel: CancelToken,
}

impl CacheManager {
    pub fn new(
        root: impl Into<PathBuf>,
        workers: usize,
        transport: Arc<dyn Transport>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            root: root.into(),
            workers: workers.max(1),
            transport,
            cancel,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the images of list `name`
    pub fn images_dir(&self, name: &str) -> PathBuf {
        self.root.join(name).join(IMAGES_DIR)
    }

    /// Bring the cache in line with `sources`.
    ///
    /// Per-image download and verification failures are reported and the
    /// image left out. Cancellation aborts before anything is removed.
    pub fn sync<'a, I>(&self, sources: I) -> ImgsyncResult<SyncReport>
    where
        I: IntoIterator<Item = &'a mut ImageListSource>,
    {
        let _lock = CacheLock::acquire(&self.root)?;
        info!("Syncing cache at {}", self.root.display());

        create_dir(&self.root)?;

        let mut report = SyncReport::new();
        let mut marks = Marks::default();
        marks.valid.insert(self.root.clone());

        for source in sources {
            self.cancel.check()?;
            self.mark(source, &mut marks, &mut report)?;
        }

        self.cancel.check()?;
        report.removed = self.sweep(&marks)?;

        info!(
            "Cache synced: {} downloaded, {} cached, {} failed, {} removed",
            report.downloaded.len(),
            report.cached.len(),
            report.failures.len(),
            report.removed.len()
        );
        Ok(report)
    }

    fn mark(
        &self,
        source: &mut ImageListSource,
        marks: &mut Marks,
        report: &mut SyncReport,
    ) -> ImgsyncResult<()> {
        if !source.is_enabled() {
            debug!("List '{}' is disabled, skipping", source.name());
            return Ok(());
        }

        let name = source.name().to_string();
        let list_dir = self.root.join(&name);
        create_dir(&list_dir)?;
        marks.valid.insert(list_dir);

        if !source.is_eligible() {
            warn!(
                "List '{}' is not fetched, trusted, verified or is expired; not caching its images",
                name
            );
            return Ok(());
        }

        let images_dir = self.images_dir(&name);
        create_dir(&images_dir)?;
        marks.valid.insert(images_dir.clone());

        let images = source.subscribed_images_mut()?;
        for attempt in self.download_all(images, &images_dir)? {
            let Attempt {
                identifier,
                preexisting,
                result,
            } = attempt;
            match result {
                Ok((outcome, path)) => {
                    marks.valid.insert(path.clone());
                    let cached = CachedImage {
                        list: name.clone(),
                        identifier,
                        path,
                        bytes: 0,
                    };
                    match outcome {
                        DownloadOutcome::Cached => report.cached.push(cached),
                        DownloadOutcome::Fetched { bytes } => {
                            report.downloaded.push(CachedImage { bytes, ..cached })
                        }
                    }
                }
                Err(e) if e.is_recoverable() => {
                    error!("List '{}': skipping image '{}': {}", name, identifier, e);
                    // A copy that already failed a previous run is swept now
                    if matches!(e, ImgsyncError::VerificationFailed { .. }) && !preexisting {
                        marks.deferred.insert(images_dir.join(&identifier));
                    }
                    report.failures.push(ImageFailure {
                        list: name.clone(),
                        identifier,
                        error: e,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Download `images` on a bounded pool of scoped threads.
    ///
    /// Results come back in no particular order. A panicked worker fails
    /// the whole run.
    fn download_all(
        &self,
        images: Vec<&mut Image>,
        dest_dir: &Path,
    ) -> ImgsyncResult<Vec<Attempt>> {
        let workers = self.workers.min(images.len());
        if workers == 0 {
            return Ok(Vec::new());
        }

        let queue = Mutex::new(images.into_iter());
        let transport: &dyn Transport = self.transport.as_ref();
        let cancel = &self.cancel;

        thread::scope(|scope| -> ImgsyncResult<Vec<Attempt>> {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let queue = &queue;
                    scope.spawn(move || {
                        let mut results = Vec::new();
                        loop {
                            let next = match queue.lock() {
                                Ok(mut queue) => queue.next(),
                                Err(_) => None,
                            };
                            let Some(image) = next else { break };

                            let identifier = image.identifier().to_string();
                            let preexisting = dest_dir.join(&identifier).exists();
                            let result = image
                                .download(dest_dir, transport, cancel)
                                .and_then(|outcome| match image.location() {
                                    Some(path) => Ok((outcome, path.to_path_buf())),
                                    None => Err(ImgsyncError::Internal(format!(
                                        "image '{}' has no location after download",
                                        identifier
                                    ))),
                                });
                            let fatal = matches!(&result, Err(e) if !e.is_recoverable());
                            results.push(Attempt {
                                identifier,
                                preexisting,
                                result,
                            });
                            if fatal {
                                break;
                            }
                        }
                        results
                    })
                })
                .collect();

            let mut attempts = Vec::new();
            for handle in handles {
                let results = handle.join().map_err(|_| {
                    ImgsyncError::Internal(format!(
                        "download worker for {} panicked",
                        dest_dir.display()
                    ))
                })?;
                attempts.extend(results);
            }
            Ok(attempts)
        })
    }

    /// Remove every unmarked entry under the root
    fn sweep(&self, marks: &Marks) -> ImgsyncResult<Vec<PathBuf>> {
        let mut invalid: Vec<(PathBuf, bool)> = Vec::new();

        let mut walker = WalkDir::new(&self.root).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound) => {
                    continue
                }
                Err(e) => {
                    let context = match e.path() {
                        Some(path) => format!("walking {}", path.display()),
                        None => format!("walking {}", self.root.display()),
                    };
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                    return Err(ImgsyncError::io(context, source));
                }
            };

            if marks.valid.contains(entry.path()) {
                continue;
            }
            if marks.deferred.contains(entry.path()) {
                debug!("Leaving {} for the next sync", entry.path().display());
                continue;
            }

            let is_dir = entry.file_type().is_dir();
            if is_dir {
                walker.skip_current_dir();
            }
            invalid.push((entry.into_path(), is_dir));
        }

        let mut removed = Vec::with_capacity(invalid.len());
        for (path, is_dir) in invalid {
            let result = if is_dir {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };

            match result {
                Ok(()) => {
                    info!("Removed {}", path.display());
                    removed.push(path);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} already gone", path.display());
                }
                Err(e) => {
                    return Err(ImgsyncError::io(format!("removing {}", path.display()), e))
                }
            }
        }

        Ok(removed)
    }
}

fn create_dir(path: &Path) -> ImgsyncResult<()> {
    fs::create_dir_all(path)
        .map_err(|e| ImgsyncError::io(format!("creating {}", path.display()), e))
}
