//! Fetch command - fetch and verify lists without touching the cache

use crate::audit::AuditLog;
use crate::cancel::CancelToken;
use crate::cli::args::FetchArgs;
use crate::cli::commands::{open_manager, run_blocking, Sources};
use crate::config::Config;
use crate::error::{ImgsyncError, ImgsyncResult};
use crate::image_list::FetchReport;
use crate::ui::{self, ListProgress, UiContext};

/// Execute the fetch command.
///
/// Fails when any list could not be fetched, after trying all of them.
pub async fn execute(args: FetchArgs, config: &Config, cancel: &CancelToken) -> ImgsyncResult<()> {
    let ctx = UiContext::detect();
    let mut manager = open_manager(config, cancel, Sources::Required)?;

    let names: Vec<String> = match args.name {
        Some(name) => vec![name],
        None => manager.lists().map(|l| l.name().to_string()).collect(),
    };

    let progress = ListProgress::new(&ctx, "Fetching", names.len() as u64);
    let mut report = FetchReport::default();

    for name in names {
        cancel.check()?;
        progress.begin(&name);

        let task_name = name.clone();
        let (returned, one) = run_blocking(move || {
            let one = manager.fetch_one(&task_name)?;
            Ok((manager, one))
        })
        .await?;
        manager = returned;

        progress.finish_one(&name, one.failures.is_empty());
        report.fetched.extend(one.fetched);
        report.failures.extend(one.failures);
    }
    progress.finish();

    AuditLog::new(config).record_fetch(&report).await;

    for name in &report.fetched {
        if let Some(source) = manager.get(name) {
            if source.is_eligible() {
                ui::step_ok(&ctx, name);
            } else {
                ui::step_warn_hint(
                    &ctx,
                    name,
                    "fetched but not trusted, verified or still valid; images will not be cached",
                );
            }
        }
    }
    for failure in &report.failures {
        ui::step_error_detail(&ctx, &failure.name, &failure.error.to_string());
    }

    if report.failures.is_empty() {
        ui::outro_success(&ctx, &format!("Fetched {} list(s)", report.fetched.len()));
        Ok(())
    } else {
        Err(ImgsyncError::User(format!(
            "{} of {} list(s) could not be fetched",
            report.failures.len(),
            report.failures.len() + report.fetched.len()
        )))
    }
}
