//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// imgsync - mirror virtual machine images from image lists
///
/// Fetches HEPiX image lists, downloads and verifies the images you
/// subscribed to and keeps the local cache in line with the lists.
#[derive(Parser, Debug)]
#[command(name = "imgsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "IMGSYNC_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show configured image lists
    Lists(ListsArgs),

    /// Fetch a list and show its images
    Show(ShowArgs),

    /// Fetch and verify image lists without touching the cache
    Fetch(FetchArgs),

    /// Add an image list
    Add(AddArgs),

    /// Remove an image list
    Remove(RemoveArgs),

    /// Enable an image list
    Enable(NameArgs),

    /// Disable an image list; its cached images are removed on next sync
    Disable(NameArgs),

    /// Fetch every list and reconcile the image cache
    Sync,

    /// Notify the configured dispatcher about every list
    Dispatch(DispatchArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Output format for listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

#[derive(Parser, Debug)]
pub struct ListsArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// List name
    pub name: String,

    /// Show every image, not only subscribed ones
    #[arg(short, long)]
    pub all: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// List name (defaults to every list)
    pub name: Option<String>,
}

#[derive(Parser, Debug)]
pub struct AddArgs {
    /// List name, used as its cache directory
    pub name: String,

    /// Where the list is published
    #[arg(short, long)]
    pub url: String,

    /// Image identifiers to subscribe to (comma-separated, default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub images: Vec<String>,

    /// Prefix for image names handed to dispatchers
    #[arg(short, long, default_value = "")]
    pub prefix: String,

    /// Distinguished name the list endorser must have
    #[arg(long)]
    pub endorser: Option<String>,

    /// Bearer token sent when requesting the list
    #[arg(long, env = "IMGSYNC_LIST_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Add the list disabled
    #[arg(long)]
    pub disabled: bool,

    /// Replace an existing list with the same name
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct RemoveArgs {
    /// List name
    pub name: String,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Debug)]
pub struct NameArgs {
    /// List name
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct DispatchArgs {
    /// Sync the cache before dispatching
    #[arg(long)]
    pub sync: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}
