//! imgsync - mirror virtual machine images from image lists
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use imgsync::cancel::CancelToken;
use imgsync::cli::{commands, Cli, Commands};
use imgsync::config::{Config, ConfigManager};
use imgsync::error::ImgsyncResult;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ImgsyncResult<()> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions(args) = cli.command {
        return commands::completions(args);
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Using configuration {}", config_manager.path().display());

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current block");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Completions(_) => unreachable!("handled above"),
        Commands::Lists(args) => commands::lists(args, &config).await,
        Commands::Show(args) => commands::show(args, &config, &cancel).await,
        Commands::Fetch(args) => commands::fetch(args, &config, &cancel).await,
        Commands::Add(args) => commands::add(args, &config).await,
        Commands::Remove(args) => commands::remove(args, &config).await,
        Commands::Enable(args) => commands::toggle(args, true, &config).await,
        Commands::Disable(args) => commands::toggle(args, false, &config).await,
        Commands::Sync => commands::sync(&config, &cancel).await,
        Commands::Dispatch(args) => commands::dispatch(args, &config, &cancel).await,
        Commands::Config(args) => commands::config(args, &config_manager, &config).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, config: &Config) {
    let level = match verbose {
        0 => "imgsync=warn",
        1 => "imgsync=info",
        _ => "imgsync=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}
