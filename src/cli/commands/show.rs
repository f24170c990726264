//! Show command - fetch one list and print its images

use crate::audit::AuditLog;
use crate::cancel::CancelToken;
use crate::cli::args::{OutputFormat, ShowArgs};
use crate::cli::commands::{open_manager, run_blocking, Sources};
use crate::config::Config;
use crate::error::{ImgsyncError, ImgsyncResult};
use crate::image::Image;
use crate::image_list::ImageListSource;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the show command
pub async fn execute(args: ShowArgs, config: &Config, cancel: &CancelToken) -> ImgsyncResult<()> {
    let mut manager = open_manager(config, cancel, Sources::Required)?;
    if manager.get(&args.name).is_none() {
        return Err(ImgsyncError::ListNotFound(args.name));
    }

    let name = args.name.clone();
    let (manager, report) = run_blocking(move || {
        let report = manager.fetch_one(&name)?;
        Ok((manager, report))
    })
    .await?;

    AuditLog::new(config).record_fetch(&report).await;
    if let Some(failure) = report.failures.into_iter().next() {
        return Err(failure.error);
    }

    let source = manager
        .get(&args.name)
        .ok_or_else(|| ImgsyncError::ListNotFound(args.name.clone()))?;

    let images: Vec<&Image> = if args.all {
        source.get_images()?.iter().collect()
    } else {
        source.get_subscribed_images()?
    };

    match args.format {
        OutputFormat::Table => print_table(source, &images),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&images)?),
        OutputFormat::Plain => {
            for image in &images {
                println!("{}", image.identifier());
            }
        }
    }

    Ok(())
}

fn print_table(source: &ImageListSource, images: &[&Image]) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, &format!("Image list '{}'", source.name()));

    if let Some(fetched) = source.fetched() {
        if let Some(title) = &fetched.title {
            ui::key_value(&ctx, "Title", title);
        }
        if let Some(dn) = &fetched.endorser_dn {
            ui::key_value(&ctx, "Endorser", dn);
        }
        if let Some(expires) = fetched.expires {
            ui::key_value(&ctx, "Expires", &expires.format("%Y-%m-%d %H:%M UTC").to_string());
        }
    }
    ui::key_value_status(&ctx, "Enabled", yes_no(source.is_enabled()), source.is_enabled());
    ui::key_value_status(&ctx, "Trusted", yes_no(source.is_trusted()), source.is_trusted());
    ui::key_value_status(&ctx, "Verified", yes_no(source.is_verified()), source.is_verified());
    ui::key_value_status(&ctx, "Expired", yes_no(source.is_expired()), !source.is_expired());
    println!();

    if images.is_empty() {
        ui::step_info(&ctx, "No images");
        return;
    }

    println!(
        "{:<38} {:<8} {:<10} {}",
        style("IDENTIFIER").bold(),
        style("FORMAT").bold(),
        style("SIZE").bold(),
        style("TITLE").bold()
    );
    for image in images {
        let meta = image.metadata();
        println!(
            "{:<38} {:<8} {:<10} {}",
            meta.identifier,
            meta.format,
            ui::format_bytes(meta.size),
            meta.title
        );
    }

    println!();
    println!("{} image(s)", images.len());
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
