//! Add command - register an image list

use crate::cancel::CancelToken;
use crate::cli::args::AddArgs;
use crate::cli::commands::{open_manager, Sources};
use crate::config::Config;
use crate::error::ImgsyncResult;
use crate::image_list::{ImageListSource, SourceDefinition};
use crate::ui::{self, UiContext};

/// Execute the add command
pub async fn execute(args: AddArgs, config: &Config) -> ImgsyncResult<()> {
    let ctx = UiContext::detect();
    let mut manager = open_manager(config, &CancelToken::new(), Sources::Optional)?;

    let mut definition = SourceDefinition::new(args.url);
    definition.enabled = !args.disabled;
    definition.prefix = args.prefix;
    definition.endorser = args.endorser;
    definition.token = args.token;
    definition.subscribed_images = args
        .images
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();

    manager.add_source(ImageListSource::new(&args.name, definition), args.force)?;
    manager.persist_sources()?;

    ui::step_ok_detail(
        &ctx,
        &format!("Added image list '{}'", args.name),
        &manager.store().path().display().to_string(),
    );
    Ok(())
}
