use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quote-cache")]
#[command(about = "Stale-while-revalidate quote cache for stock and crypto watchlists")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory containing `assets/configs`
    #[arg(short, long, global = true, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available watchlists
    List,

    /// Keep a watchlist fresh and print every update until Ctrl-C
    Watch {
        /// Watchlist code (e.g., watchlist, crypto_watchlist)
        code: String,
    },

    /// Run one refresh cycle now
    Refresh { code: String },

    /// Print the persisted snapshot without network access
    Show { code: String },

    /// Write the persisted snapshot to a CSV file
    Export {
        code: String,
        /// Destination CSV path
        path: PathBuf,
    },
}
