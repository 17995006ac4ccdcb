//! Content fingerprints for change detection.
//!
//! The collection index keeps a SHA256 fingerprint of each linked note's
//! remote-owned fields instead of the fields themselves. A freshly mapped
//! draft is compared against that fingerprint to decide Update vs Skip.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::model::NoteFields;

/// Compute a SHA256 hash of a serializable value.
///
/// The value is serialized to JSON first, so field order is fixed by the
/// struct definition and the hash is deterministic across runs.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint of the remote-owned fields of a note.
///
/// # Errors
///
/// Returns an error if the fields cannot be serialized.
pub fn fingerprint(fields: &NoteFields) -> Result<String> {
    content_hash(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(front: &str) -> NoteFields {
        NoteFields {
            front: front.into(),
            back: "A".into(),
            deck: "Default".into(),
            tags: vec!["t".into()],
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let hash1 = fingerprint(&fields("Q")).unwrap();
        let hash2 = fingerprint(&fields("Q")).unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        assert_ne!(
            fingerprint(&fields("Q1")).unwrap(),
            fingerprint(&fields("Q2")).unwrap()
        );
    }

    #[test]
    fn test_fingerprint_sees_tag_changes() {
        let mut retagged = fields("Q");
        retagged.tags.push("extra".into());
        assert_ne!(
            fingerprint(&fields("Q")).unwrap(),
            fingerprint(&retagged).unwrap()
        );
    }
}
