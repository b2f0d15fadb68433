use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "storefront-notify",
    version,
    about = "Stream real-time storefront notifications to the terminal"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to <config dir>/storefront-notify/config.toml)
    #[arg(short, long, global = true, env = "STOREFRONT_NOTIFY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and print notifications as they arrive
    Watch {
        /// Bearer token for the notification service
        #[arg(short, long, env = "STOREFRONT_TOKEN", hide_env_values = true)]
        token: String,

        /// Base URL of the notification service
        #[arg(short, long, env = "STOREFRONT_BASE_URL")]
        base_url: Option<String>,

        /// Username to report for the session
        #[arg(short, long)]
        user: Option<String>,

        /// Print notifications as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Apply a base URL override before printing
        #[arg(short, long, env = "STOREFRONT_BASE_URL")]
        base_url: Option<String>,
    },
}
