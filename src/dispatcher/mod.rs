//! Downstream notification once a list is ready
//!
//! Dispatchers are one-way: they receive a list and return nothing, so a
//! failing consumer can never affect the cache.

use crate::config::schema::DispatcherConfig;
use crate::error::{ImgsyncError, ImgsyncResult};
use crate::image_list::ImageListSource;
use tracing::{debug, info, warn};

/// Receives lists that are ready for consumption
pub trait Dispatcher: Send + Sync {
    /// Dispatcher name as used in configuration
    fn name(&self) -> &'static str;

    /// Notify about `list`
    fn dispatch(&self, list: &ImageListSource);
}

/// Does nothing
pub struct NoopDispatcher;

impl Dispatcher for NoopDispatcher {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn dispatch(&self, list: &ImageListSource) {
        debug!("Dispatching list '{}' (noop)", list.name());
    }
}

/// Logs every subscribed image of a list under its prefixed name
pub struct LogDispatcher;

impl LogDispatcher {
    /// Name an image is published under downstream
    pub fn published_name(prefix: &str, title: &str) -> String {
        format!("{}{}", prefix, title)
    }
}

impl Dispatcher for LogDispatcher {
    fn name(&self) -> &'static str {
        "log"
    }

    fn dispatch(&self, list: &ImageListSource) {
        let images = match list.get_subscribed_images() {
            Ok(images) => images,
            Err(e) => {
                warn!("Not dispatching list '{}': {}", list.name(), e);
                return;
            }
        };

        for image in images {
            info!(
                list = list.name(),
                identifier = image.identifier(),
                location = ?image.location(),
                "Image ready: {}",
                Self::published_name(list.prefix(), &image.metadata().title)
            );
        }
    }
}

/// Available dispatcher names
pub const DISPATCHERS: &[&str] = &["noop", "log"];

/// Create the dispatcher selected in configuration
pub fn create_dispatcher(config: &DispatcherConfig) -> ImgsyncResult<Box<dyn Dispatcher>> {
    match config.kind.as_str() {
        "noop" => Ok(Box::new(NoopDispatcher)),
        "log" => Ok(Box::new(LogDispatcher)),
        other => Err(ImgsyncError::UnknownDispatcher(other.to_string())),
    }
}
