//! Identity resolver: external id → local note.
//!
//! The [`CollectionIndex`] is built once per run from the collection's
//! current state and never cached across runs, so notes deleted or edited
//! out-of-band between startups are always seen. Lookups are by external id
//! only; content is never used to guess a match.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{Error, Result};
use crate::model::LocalNoteId;
use crate::storage::{LinkedNote, NoteCollection};
use crate::sync::hash::fingerprint;

/// A linked note as the index sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedNote {
    pub id: LocalNoteId,
    /// Fingerprint of the note's remote-owned fields
    pub fingerprint: String,
}

/// A committed write, replayed into the index after its sub-batch commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexChange {
    Linked {
        external_id: String,
        note: IndexedNote,
    },
    Unlinked {
        external_id: String,
    },
}

/// Per-run map from external id to local note.
#[derive(Debug, Default)]
pub struct CollectionIndex {
    links: HashMap<String, IndexedNote>,
    ambiguous: HashMap<String, Vec<LocalNoteId>>,
}

impl CollectionIndex {
    /// Build the index from the collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read.
    pub fn build<C: NoteCollection + ?Sized>(collection: &C) -> Result<Self> {
        Self::from_linked(collection.linked_notes()?)
    }

    /// Build the index from an already-listed set of linked notes.
    ///
    /// Duplicated external ids are remembered rather than rejected here, so
    /// corruption only aborts a run that actually touches the affected card.
    ///
    /// # Errors
    ///
    /// Returns an error if a fingerprint cannot be computed.
    pub fn from_linked(notes: Vec<LinkedNote>) -> Result<Self> {
        let mut index = Self::default();

        for note in notes {
            let indexed = IndexedNote {
                id: note.id,
                fingerprint: fingerprint(&note.fields)?,
            };

            if let Some(ids) = index.ambiguous.get_mut(&note.external_id) {
                ids.push(note.id);
                continue;
            }

            if let Some(existing) = index.links.remove(&note.external_id) {
                warn!(
                    external_id = %note.external_id,
                    first = %existing.id,
                    second = %note.id,
                    "external id linked to more than one note"
                );
                index
                    .ambiguous
                    .insert(note.external_id, vec![existing.id, note.id]);
                continue;
            }

            index.links.insert(note.external_id, indexed);
        }

        Ok(index)
    }

    /// Look up the note linked to `external_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousLink`] if more than one note holds the id.
    pub fn lookup(&self, external_id: &str) -> Result<Option<&IndexedNote>> {
        if let Some(ids) = self.ambiguous.get(external_id) {
            return Err(Error::AmbiguousLink {
                external_id: external_id.to_string(),
                note_ids: ids.iter().map(|id| id.0).collect(),
            });
        }
        Ok(self.links.get(external_id))
    }

    /// Replay committed writes.
    pub fn apply(&mut self, changes: Vec<IndexChange>) {
        for change in changes {
            match change {
                IndexChange::Linked { external_id, note } => {
                    self.links.insert(external_id, note);
                }
                IndexChange::Unlinked { external_id } => {
                    self.links.remove(&external_id);
                }
            }
        }
    }

    /// Number of unambiguous links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// External ids held by more than one note.
    #[must_use]
    pub fn ambiguous_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.ambiguous.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Resolve an external id to its local note id.
///
/// # Errors
///
/// Returns [`Error::AmbiguousLink`] if the index holds more than one note for the id.
pub fn resolve(external_id: &str, index: &CollectionIndex) -> Result<Option<LocalNoteId>> {
    Ok(index.lookup(external_id)?.map(|note| note.id))
}
