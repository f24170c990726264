//! Remove command - unregister an image list

use crate::cancel::CancelToken;
use crate::cli::args::RemoveArgs;
use crate::cli::commands::{open_manager, Sources};
use crate::config::Config;
use crate::error::{ImgsyncError, ImgsyncResult};
use crate::ui::{self, UiContext};

/// Execute the remove command
pub async fn execute(args: RemoveArgs, config: &Config) -> ImgsyncResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let mut manager = open_manager(config, &CancelToken::new(), Sources::Required)?;

    if manager.get(&args.name).is_none() {
        return Err(ImgsyncError::ListNotFound(args.name));
    }

    let prompt = format!(
        "Remove image list '{}'? Its cached images are deleted on the next sync",
        args.name
    );
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::step_info(&ctx, "Nothing removed");
        return Ok(());
    }

    manager.remove_source(&args.name)?;
    if manager.is_empty() {
        manager.store().clear()?;
    } else {
        manager.persist_sources()?;
    }

    ui::step_ok(&ctx, &format!("Removed image list '{}'", args.name));
    Ok(())
}
