//! SQLite collection implementation.
//!
//! A small but complete host collection: notes with an external-id column,
//! per-account sync state, and an audit log. Sync writes go through an
//! explicit transaction and each write runs inside its own savepoint, so a
//! rejected note never leaves half a row behind.

use crate::error::{Error, Result};
use crate::model::{LocalNote, LocalNoteDraft, LocalNoteId, NoteFields};
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use crate::storage::{CheckpointStore, LinkedNote, NoteCollection};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

/// Largest field the collection accepts, in bytes.
pub const MAX_FIELD_BYTES: usize = 128 * 1024;

/// SQLite-based host collection.
#[derive(Debug)]
pub struct SqliteCollection {
    conn: Connection,
    in_transaction: bool,
}

/// Summary counts for status output.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CollectionCounts {
    /// All notes in the collection.
    pub notes: usize,
    /// Notes carrying an external id.
    pub linked: usize,
    /// Linked notes edited by the host since sync last wrote them.
    pub locally_modified: usize,
}

const NOTE_COLUMNS: &str = "id, external_id, front, back, deck, tags, modified_at, synced_at";

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn join_tags(tags: &[String]) -> String {
    tags.join(" ")
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn row_to_note(row: &Row<'_>) -> rusqlite::Result<LocalNote> {
    let tags: String = row.get(5)?;
    Ok(LocalNote {
        id: LocalNoteId(row.get(0)?),
        external_id: row.get(1)?,
        fields: NoteFields {
            front: row.get(2)?,
            back: row.get(3)?,
            deck: row.get(4)?,
            tags: split_tags(&tags),
        },
        modified_at: row.get(6)?,
        synced_at: row.get(7)?,
    })
}

/// Host-side validation applied to every note the sync core writes.
fn validate_fields(fields: &NoteFields) -> Result<()> {
    if fields.front.trim().is_empty() {
        return Err(Error::Persistence("note front must not be empty".into()));
    }
    for (name, value) in [("front", &fields.front), ("back", &fields.back)] {
        if value.len() > MAX_FIELD_BYTES {
            return Err(Error::Persistence(format!(
                "note {name} is {} bytes, limit is {MAX_FIELD_BYTES}",
                value.len()
            )));
        }
    }
    Ok(())
}

impl SqliteCollection {
    /// Open a collection at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a collection with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            in_transaction: false,
        })
    }

    /// Open an in-memory collection (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            in_transaction: false,
        })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run one write inside a savepoint of the open transaction.
    ///
    /// On error the savepoint is rolled back and the transaction stays usable.
    fn write<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        if !self.in_transaction {
            return Err(Error::Persistence(
                "write issued outside a transaction".into(),
            ));
        }

        self.conn.execute_batch("SAVEPOINT note_write")?;
        match f(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("RELEASE note_write")?;
                Ok(value)
            }
            Err(e) => {
                self.conn
                    .execute_batch("ROLLBACK TO note_write; RELEASE note_write")?;
                Err(e)
            }
        }
    }

    // ==================
    // Host-side operations
    // ==================

    /// Add a note the way the host UI would (outside of sync).
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_note(&mut self, external_id: Option<&str>, fields: &NoteFields) -> Result<LocalNoteId> {
        let now = now_millis();
        self.conn.execute(
            "INSERT INTO notes (external_id, front, back, deck, tags, modified_at, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            rusqlite::params![
                external_id,
                fields.front,
                fields.back,
                fields.deck,
                join_tags(&fields.tags),
                now
            ],
        )?;
        Ok(LocalNoteId(self.conn.last_insert_rowid()))
    }

    /// Edit a note's sides from the host, bumping the local-modification marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the note does not exist or the update fails.
    pub fn edit_note_locally(&mut self, id: LocalNoteId, front: &str, back: &str) -> Result<()> {
        let synced_at: Option<Option<i64>> = self
            .conn
            .query_row("SELECT synced_at FROM notes WHERE id = ?1", [id.0], |r| r.get(0))
            .optional()?;
        let Some(synced_at) = synced_at else {
            return Err(Error::InvalidArgument(format!("note {id} not found")));
        };

        // Same-millisecond edits must still register as newer than the sync write
        let modified_at = now_millis().max(synced_at.unwrap_or(0) + 1);
        self.conn.execute(
            "UPDATE notes SET front = ?1, back = ?2, modified_at = ?3 WHERE id = ?4",
            rusqlite::params![front, back, modified_at, id.0],
        )?;
        Ok(())
    }

    /// List all notes ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_notes(&self) -> Result<Vec<LocalNote>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY id"))?;
        let notes = stmt
            .query_map([], row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Count notes holding `external_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_external_id(&self, external_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notes WHERE external_id = ?1",
            [external_id],
            |r| r.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Summary counts for status output.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn counts(&self) -> Result<CollectionCounts> {
        let (notes, linked, locally_modified): (i64, i64, i64) = self.conn.query_row(
            "SELECT COUNT(*),
                    COUNT(external_id),
                    COALESCE(SUM(CASE WHEN external_id IS NOT NULL
                                       AND (synced_at IS NULL OR modified_at > synced_at)
                                  THEN 1 ELSE 0 END), 0)
             FROM notes",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        Ok(CollectionCounts {
            notes: usize::try_from(notes).unwrap_or(0),
            linked: usize::try_from(linked).unwrap_or(0),
            locally_modified: usize::try_from(locally_modified).unwrap_or(0),
        })
    }
}

impl NoteCollection for SqliteCollection {
    fn linked_notes(&self) -> Result<Vec<LinkedNote>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE external_id IS NOT NULL ORDER BY id"
        ))?;
        let notes = stmt
            .query_map([], row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(notes
            .into_iter()
            .filter_map(|note| {
                note.external_id.map(|external_id| LinkedNote {
                    id: note.id,
                    external_id,
                    fields: note.fields,
                })
            })
            .collect())
    }

    fn get_note(&self, id: LocalNoteId) -> Result<Option<LocalNote>> {
        let note = self
            .conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                [id.0],
                row_to_note,
            )
            .optional()?;
        Ok(note)
    }

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<LocalNoteId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM notes WHERE external_id = ?1 ORDER BY id LIMIT 1",
                [external_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id.map(LocalNoteId))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(Error::Persistence("transaction already open".into()));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::Persistence("no transaction to commit".into()));
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn create_note(&mut self, draft: &LocalNoteDraft) -> Result<LocalNoteId> {
        validate_fields(&draft.fields)?;
        if draft.external_id.is_empty() {
            return Err(Error::Persistence("external id must not be empty".into()));
        }

        let now = now_millis();
        self.write(|conn| {
            conn.execute(
                "INSERT INTO notes (external_id, front, back, deck, tags, modified_at, synced_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    draft.external_id,
                    draft.fields.front,
                    draft.fields.back,
                    draft.fields.deck,
                    join_tags(&draft.fields.tags),
                    now
                ],
            )?;
            let id = conn.last_insert_rowid();
            insert_event(
                conn,
                &Event::new(EventType::NoteCreated, &draft.external_id).with_note(id),
            )?;
            Ok(LocalNoteId(id))
        })
    }

    fn update_note(&mut self, id: LocalNoteId, draft: &LocalNoteDraft) -> Result<()> {
        validate_fields(&draft.fields)?;

        let now = now_millis();
        self.write(|conn| {
            let changed = conn.execute(
                "UPDATE notes SET front = ?1, back = ?2, deck = ?3, tags = ?4,
                                  modified_at = ?5, synced_at = ?5
                 WHERE id = ?6",
                rusqlite::params![
                    draft.fields.front,
                    draft.fields.back,
                    draft.fields.deck,
                    join_tags(&draft.fields.tags),
                    now,
                    id.0
                ],
            )?;
            if changed == 0 {
                return Err(Error::Persistence(format!("note {id} not found")));
            }
            insert_event(
                conn,
                &Event::new(EventType::NoteUpdated, &draft.external_id).with_note(id.0),
            )?;
            Ok(())
        })
    }

    fn delete_note(&mut self, id: LocalNoteId) -> Result<()> {
        self.write(|conn| {
            let external_id: Option<Option<String>> = conn
                .query_row("SELECT external_id FROM notes WHERE id = ?1", [id.0], |r| {
                    r.get(0)
                })
                .optional()?;
            let Some(external_id) = external_id else {
                return Err(Error::Persistence(format!("note {id} not found")));
            };

            conn.execute("DELETE FROM notes WHERE id = ?1", [id.0])?;
            insert_event(
                conn,
                &Event::new(EventType::NoteDeleted, external_id.as_deref().unwrap_or(""))
                    .with_note(id.0),
            )?;
            Ok(())
        })
    }
}

impl CheckpointStore for SqliteCollection {
    fn load_checkpoint(&self, account: &str) -> Result<Option<String>> {
        let raw = self
            .conn
            .query_row(
                "SELECT checkpoint FROM sync_state WHERE account = ?1",
                [account],
                |r| r.get(0),
            )
            .optional()?;
        Ok(raw)
    }

    fn store_checkpoint(&mut self, account: &str, raw: &str) -> Result<()> {
        let now = now_millis();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO sync_state (account, checkpoint, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(account) DO UPDATE SET checkpoint = excluded.checkpoint,
                                                updated_at = excluded.updated_at",
            rusqlite::params![account, raw, now],
        )?;
        insert_event(
            &tx,
            &Event::new(EventType::CheckpointStored, account).with_detail(raw),
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::events::get_events;

    fn draft(external_id: &str, front: &str) -> LocalNoteDraft {
        LocalNoteDraft {
            external_id: external_id.to_string(),
            fields: NoteFields {
                front: front.to_string(),
                back: "back".to_string(),
                deck: "Default".to_string(),
                tags: vec!["a".into(), "b".into()],
            },
        }
    }

    #[test]
    fn test_create_and_find() {
        let mut collection = SqliteCollection::open_memory().unwrap();
        collection.begin_transaction().unwrap();
        let id = collection.create_note(&draft("a1", "Q1")).unwrap();
        collection.commit().unwrap();

        assert_eq!(collection.find_by_external_id("a1").unwrap(), Some(id));
        let note = collection.get_note(id).unwrap().unwrap();
        assert_eq!(note.fields.tags, vec!["a".to_string(), "b".to_string()]);
        assert!(!note.is_locally_modified());

        let events = get_events(collection.conn(), "a1", None).unwrap();
        assert_eq!(events[0].event_type, EventType::NoteCreated);
    }

    #[test]
    fn test_write_outside_transaction_rejected() {
        let mut collection = SqliteCollection::open_memory().unwrap();
        let err = collection.create_note(&draft("a1", "Q1")).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut collection = SqliteCollection::open_memory().unwrap();
        collection.begin_transaction().unwrap();
        collection.create_note(&draft("a1", "Q1")).unwrap();
        collection.rollback().unwrap();

        assert_eq!(collection.find_by_external_id("a1").unwrap(), None);
        assert_eq!(collection.counts().unwrap().notes, 0);
    }

    #[test]
    fn test_rejected_write_keeps_transaction_usable() {
        let mut collection = SqliteCollection::open_memory().unwrap();
        collection.begin_transaction().unwrap();
        collection.create_note(&draft("a1", "Q1")).unwrap();

        let mut oversized = draft("a2", "Q2");
        oversized.fields.back = "x".repeat(MAX_FIELD_BYTES + 1);
        assert!(collection.create_note(&oversized).is_err());

        collection.create_note(&draft("a3", "Q3")).unwrap();
        collection.commit().unwrap();

        assert_eq!(collection.counts().unwrap().notes, 2);
        assert_eq!(collection.find_by_external_id("a2").unwrap(), None);
    }

    #[test]
    fn test_update_and_delete_missing_note() {
        let mut collection = SqliteCollection::open_memory().unwrap();
        collection.begin_transaction().unwrap();
        assert!(collection.update_note(LocalNoteId(42), &draft("a1", "Q")).is_err());
        assert!(collection.delete_note(LocalNoteId(42)).is_err());
        collection.rollback().unwrap();
    }

    #[test]
    fn test_local_edit_sets_marker() {
        let mut collection = SqliteCollection::open_memory().unwrap();
        collection.begin_transaction().unwrap();
        let id = collection.create_note(&draft("a1", "Q1")).unwrap();
        collection.commit().unwrap();

        collection.edit_note_locally(id, "mine", "mine").unwrap();
        let note = collection.get_note(id).unwrap().unwrap();
        assert!(note.is_locally_modified());
        assert_eq!(collection.counts().unwrap().locally_modified, 1);
    }

    #[test]
    fn test_linked_notes_excludes_unlinked() {
        let mut collection = SqliteCollection::open_memory().unwrap();
        let fields = draft("x", "Q").fields;
        collection.add_note(None, &fields).unwrap();
        collection.add_note(Some("a1"), &fields).unwrap();

        let linked = collection.linked_notes().unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].external_id, "a1");
    }

    #[test]
    fn test_checkpoint_roundtrip_overwrites() {
        let mut collection = SqliteCollection::open_memory().unwrap();
        assert_eq!(collection.load_checkpoint("me").unwrap(), None);

        collection.store_checkpoint("me", "one").unwrap();
        collection.store_checkpoint("me", "two").unwrap();
        collection.store_checkpoint("other", "three").unwrap();

        assert_eq!(collection.load_checkpoint("me").unwrap().as_deref(), Some("two"));
        assert_eq!(collection.load_checkpoint("other").unwrap().as_deref(), Some("three"));
    }
}
