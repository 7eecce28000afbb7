pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "newsrelay")]
#[command(about = "Collects fresh headlines and relays them to a Telegram chat", long_about = None)]
pub struct Cli {
    /// Path to the config file (default: ~/.config/newsrelay/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the sent-items database
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect and deliver once, now
    Run {
        /// Print the payloads instead of sending them; nothing is marked
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the daily scheduler, the health server and chat commands
    Serve,
    /// List configured sources
    Sources,
    /// Show recently delivered item ids
    Seen {
        /// Number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}
