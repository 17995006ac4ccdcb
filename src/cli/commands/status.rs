//! Status command implementation.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::load_config;
use crate::error::Result;
use crate::storage::events::{latest_event, EventType};
use crate::storage::{CheckpointStore, CollectionCounts};
use crate::sync::SyncCheckpoint;

use super::open_existing;

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput {
    account: String,
    checkpoint: Option<SyncCheckpoint>,
    /// Stored checkpoint exists but does not parse
    checkpoint_corrupted: bool,
    /// Unix millis of the last checkpoint write
    last_checkpoint_at: Option<i64>,
    counts: CollectionCounts,
}

/// Execute status command.
///
/// Read-only: a corrupted checkpoint is reported, not reset.
pub fn execute(account: Option<&str>, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let account = match account {
        Some(account) => account.to_string(),
        None => load_config()?.resolve_account(),
    };
    let collection = open_existing(db_path)?;

    let (checkpoint, checkpoint_corrupted) = match collection.load_checkpoint(&account)? {
        Some(raw) => match SyncCheckpoint::parse(&raw) {
            Ok(cp) => (Some(cp), false),
            Err(_) => (None, true),
        },
        None => (None, false),
    };
    let last_checkpoint_at = latest_event(collection.conn(), &account, EventType::CheckpointStored)?
        .map(|e| e.created_at);

    let output = StatusOutput {
        account,
        checkpoint,
        checkpoint_corrupted,
        last_checkpoint_at,
        counts: collection.counts()?,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("cardsync status");
    println!("===============");
    println!();
    println!("Account: {}", output.account);

    match (&output.checkpoint, output.checkpoint_corrupted) {
        (_, true) => println!("Checkpoint: corrupted (next sync re-fetches everything)"),
        (None, false) => println!("Checkpoint: none (next sync is a full sync)"),
        (Some(cp), false) => {
            println!(
                "Checkpoint: generation {}, cursor {}",
                cp.generation,
                cp.cursor.as_deref().unwrap_or("<start>")
            );
            if let Some(ts) = output
                .last_checkpoint_at
                .and_then(chrono::DateTime::from_timestamp_millis)
            {
                println!("Last sync:  {}", ts.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
    }

    println!();
    println!("Notes:            {}", output.counts.notes);
    println!("  linked:         {}", output.counts.linked);
    println!("  locally edited: {}", output.counts.locally_modified);

    Ok(())
}
