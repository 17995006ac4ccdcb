//! CLI definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// cardsync - pull remote flashcards into a local collection
#[derive(Parser, Debug)]
#[command(name = "cardsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Collection database path (default: ~/.cardsync/data/collection.db)
    #[arg(long, global = true, env = "CARDSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one sync: fetch remote changes and apply them to the collection
    Sync {
        /// Account the checkpoint is stored under (overrides config)
        #[arg(long, env = "CARDSYNC_ACCOUNT")]
        account: Option<String>,

        /// Remote service base URL (overrides config)
        #[arg(long, env = "CARDSYNC_ENDPOINT")]
        endpoint: Option<String>,
    },

    /// Show checkpoint and collection counts
    Status {
        /// Account whose checkpoint to show
        #[arg(long, env = "CARDSYNC_ACCOUNT")]
        account: Option<String>,
    },

    /// Checkpoint management
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },

    /// Authenticate with the remote service
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Subcommand, Debug)]
pub enum CheckpointCommands {
    /// Forget sync progress so the next sync re-fetches everything
    Reset {
        /// Account whose checkpoint to reset
        #[arg(long, env = "CARDSYNC_ACCOUNT")]
        account: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Sign in through the browser and store the access token
    Login {
        /// Seconds to wait for the browser callback (default: 120)
        #[arg(long)]
        timeout: Option<u64>,
    },
}
