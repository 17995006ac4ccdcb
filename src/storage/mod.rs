//! Host collection interface and the SQLite reference collection.
//!
//! The sync core never talks to a database directly. It needs a handful of
//! calls from the host, expressed here as two traits:
//!
//! - [`NoteCollection`] - note CRUD, external-id lookup, and a transaction boundary
//! - [`CheckpointStore`] - per-account persisted sync state
//!
//! # Submodules
//!
//! - [`events`] - Audit log of writes made by sync
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - SQLite collection implementing both traits

pub mod events;
pub mod schema;
pub mod sqlite;

pub use sqlite::{CollectionCounts, SqliteCollection};

use crate::error::Result;
use crate::model::{LocalNote, LocalNoteDraft, LocalNoteId, NoteFields};

/// A note carrying an external id, as listed for index building.
#[derive(Debug, Clone)]
pub struct LinkedNote {
    pub id: LocalNoteId,
    pub external_id: String,
    pub fields: NoteFields,
}

/// The host's note store.
///
/// Writes are only issued between `begin_transaction` and `commit`/`rollback`.
/// A failed write must leave no partial trace, so the caller can keep going
/// with the rest of the transaction.
pub trait NoteCollection {
    /// Every note that carries an external id.
    fn linked_notes(&self) -> Result<Vec<LinkedNote>>;

    /// Fetch one note by its host id.
    fn get_note(&self, id: LocalNoteId) -> Result<Option<LocalNote>>;

    /// First note holding `external_id`, if any.
    fn find_by_external_id(&self, external_id: &str) -> Result<Option<LocalNoteId>>;

    fn begin_transaction(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;

    fn create_note(&mut self, draft: &LocalNoteDraft) -> Result<LocalNoteId>;
    fn update_note(&mut self, id: LocalNoteId, draft: &LocalNoteDraft) -> Result<()>;
    fn delete_note(&mut self, id: LocalNoteId) -> Result<()>;
}

/// Persisted sync state, keyed by the user's account.
///
/// The store only moves opaque strings; parsing and validation live in
/// [`crate::sync::checkpoint`].
pub trait CheckpointStore {
    fn load_checkpoint(&self, account: &str) -> Result<Option<String>>;
    fn store_checkpoint(&mut self, account: &str, raw: &str) -> Result<()>;
}
