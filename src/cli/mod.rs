pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_PREVIEW_LIMIT: usize = 3;

#[derive(Parser)]
#[command(name = "runnel")]
#[command(about = "Posts new RSS/Atom entries to Discord channels", long_about = None)]
pub struct Cli {
    /// Path to the config file (default: ~/.config/runnel/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the poller and the command listener until interrupted
    Run,
    /// Create any missing tables and exit
    Bootstrap,
    /// List registered feeds
    Feeds,
    /// Fetch a feed and print how its entries would be posted
    Preview {
        /// URL of the feed
        url: String,

        /// Format template (default: the built-in format)
        #[arg(short, long)]
        format: Option<String>,

        /// Number of entries to render
        #[arg(short = 'n', long, default_value_t = DEFAULT_PREVIEW_LIMIT)]
        limit: usize,
    },
}
