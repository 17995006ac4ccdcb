//! Sync checkpoint: where the next incremental fetch resumes.
//!
//! Stored per account through [`CheckpointStore`] as a JSON document. The
//! checkpoint only moves forward: `high_water_ms` never decreases, and
//! `generation` counts successful persists.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::CheckpointStore;

/// Persisted position in the remote change feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// Opaque cursor from the remote; `None` means start from the beginning
    pub cursor: Option<String>,
    /// Highest remote `last_modified` applied so far
    pub high_water_ms: i64,
    pub generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// What [`load`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointLoad {
    pub checkpoint: SyncCheckpoint,
    /// The stored value was unreadable and has been replaced with a full resync
    pub reset: bool,
}

impl SyncCheckpoint {
    /// Parse a stored checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CheckpointCorruption`] for malformed JSON or impossible values.
    pub fn parse(raw: &str) -> Result<Self> {
        let checkpoint: Self = serde_json::from_str(raw)
            .map_err(|e| Error::CheckpointCorruption(format!("unreadable checkpoint: {e}")))?;

        if checkpoint.high_water_ms < 0 {
            return Err(Error::CheckpointCorruption(format!(
                "negative high-water mark {}",
                checkpoint.high_water_ms
            )));
        }
        if checkpoint.cursor.as_deref() == Some("") {
            return Err(Error::CheckpointCorruption("empty cursor".into()));
        }
        Ok(checkpoint)
    }

    /// The checkpoint after a fully applied page.
    ///
    /// A page without a `next_cursor` keeps the previous cursor, so a later run
    /// never restarts from the beginning.
    #[must_use]
    pub fn advance(&self, next_cursor: Option<&str>, page_high_water: i64) -> Self {
        Self {
            cursor: next_cursor
                .map(ToString::to_string)
                .or_else(|| self.cursor.clone()),
            high_water_ms: self.high_water_ms.max(page_high_water),
            generation: self.generation + 1,
            updated_at: Some(Utc::now().to_rfc3339()),
        }
    }

    /// Whether `next` would move this checkpoint at all.
    #[must_use]
    pub fn would_change(&self, next_cursor: Option<&str>, page_high_water: i64) -> bool {
        let cursor_moves = next_cursor.is_some_and(|c| self.cursor.as_deref() != Some(c));
        cursor_moves || page_high_water > self.high_water_ms
    }
}

/// Load the checkpoint for `account`, resetting it if corrupted.
///
/// # Errors
///
/// Returns an error only if the store itself fails; corruption is recovered.
pub fn load<S: CheckpointStore + ?Sized>(store: &mut S, account: &str) -> Result<CheckpointLoad> {
    let Some(raw) = store.load_checkpoint(account)? else {
        debug!(account, "no checkpoint stored; starting full sync");
        return Ok(CheckpointLoad {
            checkpoint: SyncCheckpoint::default(),
            reset: false,
        });
    };

    match SyncCheckpoint::parse(&raw) {
        Ok(checkpoint) => Ok(CheckpointLoad {
            checkpoint,
            reset: false,
        }),
        Err(e) => {
            warn!(account, error = %e, "checkpoint corrupted; resetting to full resync");
            let checkpoint = reset(store, account)?;
            Ok(CheckpointLoad {
                checkpoint,
                reset: true,
            })
        }
    }
}

/// Persist `checkpoint` for `account`.
///
/// # Errors
///
/// Returns an error if serialization or the store fails.
pub fn save<S: CheckpointStore + ?Sized>(
    store: &mut S,
    account: &str,
    checkpoint: &SyncCheckpoint,
) -> Result<()> {
    let raw = serde_json::to_string(checkpoint)?;
    store.store_checkpoint(account, &raw)?;
    debug!(
        account,
        generation = checkpoint.generation,
        high_water_ms = checkpoint.high_water_ms,
        "checkpoint persisted"
    );
    Ok(())
}

/// Replace the stored checkpoint with an empty one.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn reset<S: CheckpointStore + ?Sized>(store: &mut S, account: &str) -> Result<SyncCheckpoint> {
    let checkpoint = SyncCheckpoint {
        updated_at: Some(Utc::now().to_rfc3339()),
        ..SyncCheckpoint::default()
    };
    save(store, account, &checkpoint)?;
    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteCollection;

    #[test]
    fn test_missing_checkpoint_is_default() {
        let mut store = SqliteCollection::open_memory().unwrap();
        let loaded = load(&mut store, "me").unwrap();
        assert_eq!(loaded.checkpoint, SyncCheckpoint::default());
        assert!(!loaded.reset);
    }

    #[test]
    fn test_save_and_load() {
        let mut store = SqliteCollection::open_memory().unwrap();
        let cp = SyncCheckpoint::default().advance(Some("c2"), 2000);
        save(&mut store, "me", &cp).unwrap();

        let loaded = load(&mut store, "me").unwrap();
        assert_eq!(loaded.checkpoint, cp);
        assert_eq!(loaded.checkpoint.generation, 1);
        assert!(load(&mut store, "someone-else").unwrap().checkpoint.cursor.is_none());
    }

    #[test]
    fn test_advance_is_monotonic() {
        let cp = SyncCheckpoint {
            cursor: Some("c5".into()),
            high_water_ms: 5000,
            generation: 3,
            updated_at: None,
        };
        let next = cp.advance(None, 1000);
        assert_eq!(next.high_water_ms, 5000);
        assert_eq!(next.cursor.as_deref(), Some("c5"));
        assert_eq!(next.generation, 4);
    }

    #[test]
    fn test_would_change() {
        let cp = SyncCheckpoint::default().advance(Some("c1"), 100);
        assert!(!cp.would_change(None, 0));
        assert!(!cp.would_change(Some("c1"), 100));
        assert!(cp.would_change(Some("c2"), 100));
        assert!(cp.would_change(None, 101));
    }

    #[test]
    fn test_corrupted_checkpoint_resets_and_persists() {
        let mut store = SqliteCollection::open_memory().unwrap();
        store.store_checkpoint("me", "{not json").unwrap();

        let loaded = load(&mut store, "me").unwrap();
        assert!(loaded.reset);
        assert!(loaded.checkpoint.cursor.is_none());

        // The reset was written back, so the next load is clean
        assert!(!load(&mut store, "me").unwrap().reset);
    }

    #[test]
    fn test_impossible_values_are_corruption() {
        assert!(matches!(
            SyncCheckpoint::parse(r#"{"cursor":null,"high_water_ms":-5,"generation":1}"#),
            Err(Error::CheckpointCorruption(_))
        ));
        assert!(matches!(
            SyncCheckpoint::parse(r#"{"cursor":"","high_water_ms":5,"generation":1}"#),
            Err(Error::CheckpointCorruption(_))
        ));
    }
}
