//! Sync command - fetch every list and reconcile the cache

use crate::audit::AuditLog;
use crate::cancel::CancelToken;
use crate::cli::commands::{open_manager, print_sync_report, run_blocking, Sources};
use crate::config::Config;
use crate::error::ImgsyncResult;
use crate::image_list::SyncSummary;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the sync command.
///
/// List and image failures are reported but do not fail the command.
pub async fn execute(config: &Config, cancel: &CancelToken) -> ImgsyncResult<()> {
    let ctx = UiContext::detect();
    let mut manager = open_manager(config, cancel, Sources::Required)?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!(
        "Syncing {} list(s) into {}",
        manager.len(),
        manager.cache().root().display()
    ));

    let summary = match run_blocking(move || manager.sync_cache()).await {
        Ok(summary) => summary,
        Err(e) => {
            spinner.stop_error("Sync failed");
            return Err(e);
        }
    };

    record(config, &summary).await;

    if summary.fetch.failures.is_empty() && summary.cache.failures.is_empty() {
        spinner.stop("Cache synced");
    } else {
        spinner.stop_warn("Cache synced with errors");
    }
    report(&ctx, &summary);
    Ok(())
}

pub(crate) async fn record(config: &Config, summary: &SyncSummary) {
    let audit = AuditLog::new(config);
    audit.record_fetch(&summary.fetch).await;
    audit.record_sync(&summary.cache).await;
}

pub(crate) fn report(ctx: &UiContext, summary: &SyncSummary) {
    for failure in &summary.fetch.failures {
        ui::step_error_detail(
            ctx,
            &format!("list '{}'", failure.name),
            &failure.error.to_string(),
        );
    }
    print_sync_report(ctx, &summary.cache);

    let failed = summary.fetch.failures.len() + summary.cache.failures.len();
    if failed == 0 {
        ui::outro_success(ctx, "Done");
    } else {
        ui::outro_warn(ctx, &format!("{} failure(s), see above", failed));
    }
}
