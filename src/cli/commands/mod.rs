//! CLI command implementations
//!
//! The image list and cache core is synchronous; commands drive it from
//! tokio's blocking pool so Ctrl-C stays responsive.

pub mod add;
pub mod completions;
pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod lists;
pub mod remove;
pub mod show;
pub mod sync;
pub mod toggle;

pub use add::execute as add;
pub use completions::execute as completions;
pub use config::execute as config;
pub use dispatch::execute as dispatch;
pub use fetch::execute as fetch;
pub use lists::execute as lists;
pub use remove::execute as remove;
pub use show::execute as show;
pub use sync::execute as sync;
pub use toggle::execute as toggle;

use crate::cache::SyncReport;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{ImgsyncError, ImgsyncResult};
use crate::image_list::ListManager;
use crate::transport::{DefaultTransport, Transport};
use crate::ui::{self, UiContext};
use std::sync::Arc;

/// How sources are loaded for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sources {
    /// The sources file must exist
    Required,
    /// A missing sources file means no lists yet
    Optional,
}

/// Build a list manager from configuration and load its sources
pub(crate) fn open_manager(
    config: &Config,
    cancel: &CancelToken,
    sources: Sources,
) -> ImgsyncResult<ListManager> {
    let transport: Arc<dyn Transport> = Arc::new(DefaultTransport::new(&config.http));
    let mut manager = ListManager::new(config, transport, cancel.clone())?;
    match sources {
        Sources::Required => manager.load_sources()?,
        Sources::Optional => manager.load_sources_or_default()?,
    };
    Ok(manager)
}

/// Run synchronous work on the blocking pool
pub(crate) async fn run_blocking<T, F>(work: F) -> ImgsyncResult<T>
where
    F: FnOnce() -> ImgsyncResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ImgsyncError::Internal(format!("blocking task failed: {}", e)))?
}

/// Print what a cache sync did
pub(crate) fn print_sync_report(ctx: &UiContext, report: &SyncReport) {
    for image in &report.downloaded {
        ui::step_ok_detail(
            ctx,
            &format!("{}/{}", image.list, image.identifier),
            &ui::format_bytes(image.bytes),
        );
    }
    for failure in &report.failures {
        ui::step_error_detail(
            ctx,
            &format!("{}/{}", failure.list, failure.identifier),
            &failure.error.to_string(),
        );
    }

    ui::key_value(ctx, "Downloaded", &report.downloaded.len().to_string());
    ui::key_value(ctx, "Transferred", &ui::format_bytes(report.bytes_downloaded()));
    ui::key_value(ctx, "Already cached", &report.cached.len().to_string());
    ui::key_value(ctx, "Removed", &report.removed.len().to_string());
}
