//! Enable and disable commands

use crate::cancel::CancelToken;
use crate::cli::args::NameArgs;
use crate::cli::commands::{open_manager, Sources};
use crate::config::Config;
use crate::error::ImgsyncResult;
use crate::ui::{self, UiContext};

/// Execute the enable (`enabled = true`) or disable command
pub async fn execute(args: NameArgs, enabled: bool, config: &Config) -> ImgsyncResult<()> {
    let ctx = UiContext::detect();
    let mut manager = open_manager(config, &CancelToken::new(), Sources::Required)?;

    manager.set_enabled(&args.name, enabled)?;
    manager.persist_sources()?;

    if enabled {
        ui::step_ok(&ctx, &format!("Enabled image list '{}'", args.name));
    } else {
        ui::step_ok(&ctx, &format!("Disabled image list '{}'", args.name));
        ui::step_info(&ctx, "Its cached images are removed on the next sync");
    }
    Ok(())
}
