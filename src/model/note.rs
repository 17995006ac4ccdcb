//! Local note model.
//!
//! Notes live in the host collection. The fields in [`NoteFields`] are owned
//! by the remote service: only the sync core writes them once a note is
//! linked. Everything else about a note belongs to the host.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host-assigned note identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalNoteId(pub i64);

impl fmt::Display for LocalNoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The remote-owned content of a note, already in host format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFields {
    pub front: String,
    pub back: String,
    /// Host deck path, `::`-separated
    pub deck: String,
    /// Sorted, deduplicated, whitespace-free
    pub tags: Vec<String>,
}

/// What the mapper produces for one remote card: the note it should become.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNoteDraft {
    pub external_id: String,
    pub fields: NoteFields,
}

/// A note as stored in the host collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNote {
    pub id: LocalNoteId,

    /// Correlation key, set once at creation; `None` for notes the user made by hand
    pub external_id: Option<String>,

    pub fields: NoteFields,

    /// Last edit of any kind (Unix milliseconds)
    pub modified_at: i64,

    /// Last write by sync (Unix milliseconds)
    pub synced_at: Option<i64>,
}

impl LocalNote {
    /// True when the host edited the note after sync last wrote it.
    #[must_use]
    pub fn is_locally_modified(&self) -> bool {
        self.synced_at.is_none_or(|synced| self.modified_at > synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(modified_at: i64, synced_at: Option<i64>) -> LocalNote {
        LocalNote {
            id: LocalNoteId(1),
            external_id: Some("a1".into()),
            fields: NoteFields {
                front: "Q".into(),
                back: "A".into(),
                deck: "Default".into(),
                tags: Vec::new(),
            },
            modified_at,
            synced_at,
        }
    }

    #[test]
    fn test_local_modification_marker() {
        assert!(!note(100, Some(100)).is_locally_modified());
        assert!(note(150, Some(100)).is_locally_modified());
        assert!(note(100, None).is_locally_modified());
    }
}
