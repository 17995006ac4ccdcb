//! Data models for cardsync.
//!
//! This module contains the domain models on both sides of the sync:
//! - RemoteFlashcard (what the remote service sends)
//! - LocalNote / LocalNoteDraft (what the host collection stores)

pub mod flashcard;
pub mod note;

pub use flashcard::{RemoteFlashcard, WireDefect};
pub use note::{LocalNote, LocalNoteDraft, LocalNoteId, NoteFields};
