//! Lists command - show configured image lists

use crate::cancel::CancelToken;
use crate::cli::args::{ListsArgs, OutputFormat};
use crate::cli::commands::{open_manager, Sources};
use crate::config::Config;
use crate::error::ImgsyncResult;
use crate::image_list::{ImageListSource, SourceKind};
use crate::ui::{self, UiContext};
use console::style;
use serde::Serialize;
use std::collections::BTreeSet;

/// A list as shown to users; the token is never printed
#[derive(Serialize)]
struct ListRow<'a> {
    name: &'a str,
    url: &'a str,
    enabled: bool,
    kind: SourceKind,
    prefix: &'a str,
    subscribed_images: &'a BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endorser: Option<&'a str>,
}

impl<'a> From<&'a ImageListSource> for ListRow<'a> {
    fn from(source: &'a ImageListSource) -> Self {
        let definition = source.definition();
        Self {
            name: source.name(),
            url: &definition.url,
            enabled: definition.enabled,
            kind: definition.kind,
            prefix: &definition.prefix,
            subscribed_images: &definition.subscribed_images,
            endorser: definition.endorser.as_deref(),
        }
    }
}

/// Execute the lists command
pub async fn execute(args: ListsArgs, config: &Config) -> ImgsyncResult<()> {
    let manager = open_manager(config, &CancelToken::new(), Sources::Required)?;
    let rows: Vec<ListRow> = manager.lists().map(ListRow::from).collect();

    match args.format {
        OutputFormat::Table => print_table(&rows),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Plain => {
            for row in &rows {
                println!("{}", row.name);
            }
        }
    }

    Ok(())
}

fn print_table(rows: &[ListRow]) {
    let ctx = UiContext::detect();
    if rows.is_empty() {
        ui::step_info(&ctx, "No image lists configured");
        return;
    }

    println!(
        "{:<16} {:<9} {:<7} {:<12} {}",
        style("NAME").bold(),
        style("STATUS").bold(),
        style("KIND").bold(),
        style("IMAGES").bold(),
        style("URL").bold()
    );

    for row in rows {
        let status = if row.enabled {
            style("enabled").green()
        } else {
            style("disabled").dim()
        };
        let images = if row.subscribed_images.is_empty() {
            "all".to_string()
        } else {
            row.subscribed_images.len().to_string()
        };

        println!(
            "{:<16} {:<9} {:<7} {:<12} {}",
            row.name,
            status,
            row.kind.to_string(),
            images,
            row.url
        );
    }

    println!();
    println!("{} list(s)", rows.len());
}
