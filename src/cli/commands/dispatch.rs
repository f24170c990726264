//! Dispatch command - notify the configured dispatcher

use crate::cancel::CancelToken;
use crate::cli::args::DispatchArgs;
use crate::cli::commands::{open_manager, run_blocking, sync, Sources};
use crate::config::Config;
use crate::error::ImgsyncResult;
use crate::ui::{self, UiContext};

/// Execute the dispatch command
pub async fn execute(
    args: DispatchArgs,
    config: &Config,
    cancel: &CancelToken,
) -> ImgsyncResult<()> {
    let ctx = UiContext::detect();
    let mut manager = open_manager(config, cancel, Sources::Required)?;
    let count = manager.len();

    let summary = run_blocking(move || manager.dispatch(args.sync)).await?;

    if let Some(summary) = &summary {
        sync::record(config, summary).await;
        sync::report(&ctx, summary);
    }

    ui::step_ok(
        &ctx,
        &format!(
            "Dispatched {} list(s) via '{}'",
            count, config.dispatcher.kind
        ),
    );
    Ok(())
}
