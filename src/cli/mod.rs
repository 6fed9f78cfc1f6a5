pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rssforward")]
#[command(about = "Turns websites into RSS feeds and serves them locally", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Don't start the feed file server
    #[arg(long, global = true)]
    pub no_server: bool,

    /// Run a single generation cycle instead of looping
    #[arg(long, global = true)]
    pub no_loop: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Commands {
    /// Generate feeds periodically and serve them (default)
    #[default]
    Run,
    /// Run one generation cycle and exit
    Generate,
    /// List configured generators
    List,
    /// Open the log file
    OpenLog,
}
