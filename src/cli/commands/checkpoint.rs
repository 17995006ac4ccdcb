//! Checkpoint command implementations.

use std::path::PathBuf;

use crate::cli::CheckpointCommands;
use crate::config::load_config;
use crate::error::Result;
use crate::sync::checkpoint;

use super::open_existing;

/// Execute checkpoint commands.
pub fn execute(command: &CheckpointCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    match command {
        CheckpointCommands::Reset { account } => reset(account.as_deref(), db_path, json),
    }
}

fn reset(account: Option<&str>, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let account = match account {
        Some(account) => account.to_string(),
        None => load_config()?.resolve_account(),
    };
    let mut collection = open_existing(db_path)?;
    let cleared = checkpoint::reset(&mut collection, &account)?;

    if json {
        let output = serde_json::json!({
            "success": true,
            "account": account,
            "checkpoint": cleared,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Checkpoint reset for account '{account}'.");
        println!("The next sync re-fetches every remote card; existing notes are matched by external id.");
    }
    Ok(())
}
