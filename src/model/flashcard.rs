//! Remote flashcard model.
//!
//! A `RemoteFlashcard` is an immutable snapshot of one card as the remote
//! spaced-repetition service reported it in a single fetch. A later fetch
//! carrying the same external id supersedes it.
//!
//! Decoding from JSON never fails. A field of the wrong type is recorded as a
//! [`WireDefect`] on the card, so one bad record is rejected on its own
//! instead of taking the rest of its page down with it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// First field the remote sent with a wrong or missing value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireDefect {
    pub field: &'static str,
    pub message: String,
}

/// One flashcard as delivered by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFlashcard {
    /// Stable identifier assigned by the remote service
    #[serde(rename = "id")]
    pub external_id: String,

    /// Question side, in remote markup
    pub front: Option<String>,

    /// Answer side, in remote markup
    pub back: Option<String>,

    /// Last modification on the remote side (Unix milliseconds)
    #[serde(rename = "updated_at")]
    pub last_modified: i64,

    /// Set when the card was deleted remotely
    pub deleted: bool,

    /// Remote deck path, `/`-separated
    pub deck: Option<String>,

    /// Remote tags
    pub tags: Vec<String>,

    /// Set when the wire record did not decode cleanly
    #[serde(skip)]
    pub defect: Option<WireDefect>,
}

impl RemoteFlashcard {
    /// A live card with both sides set.
    pub fn new(external_id: impl Into<String>, front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            front: Some(front.into()),
            back: Some(back.into()),
            last_modified: 0,
            deleted: false,
            deck: None,
            tags: Vec::new(),
            defect: None,
        }
    }

    /// A deletion tombstone; the remote sends no content for these.
    pub fn tombstone(external_id: impl Into<String>) -> Self {
        Self {
            front: None,
            back: None,
            deleted: true,
            ..Self::new(external_id, "", "")
        }
    }

    #[must_use]
    pub fn with_deck(mut self, deck: impl Into<String>) -> Self {
        self.deck = Some(deck.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn modified_at(mut self, millis: i64) -> Self {
        self.last_modified = millis;
        self
    }

    /// Decode one record of a fetched page.
    ///
    /// `position` is the record's index on its page; a record without a
    /// usable id is named after it.
    #[must_use]
    pub fn from_wire(value: Value, position: usize) -> Self {
        let placeholder = || format!("<record {position}>");

        let Value::Object(mut map) = value else {
            let mut card = Self::tombstone(placeholder());
            card.deleted = false;
            card.defect = Some(WireDefect {
                field: "record",
                message: "is not a JSON object".to_string(),
            });
            return card;
        };

        let mut reader = WireReader::default();
        let external_id = match map.remove("id") {
            Some(Value::String(id)) => id,
            None | Some(Value::Null) => {
                reader.flag("id", "is missing");
                placeholder()
            }
            Some(other) => {
                reader.flag("id", "is not a string");
                other.to_string()
            }
        };

        let front = reader.string(&mut map, "front");
        let back = reader.string(&mut map, "back");
        let last_modified = reader.integer(&mut map, "updated_at");
        let deleted = reader.boolean(&mut map, "deleted");
        let deck = reader.string(&mut map, "deck");
        let tags = reader.strings(&mut map, "tags");

        Self {
            external_id,
            front,
            back,
            last_modified,
            deleted,
            deck,
            tags,
            defect: reader.defect,
        }
    }
}

impl<'de> Deserialize<'de> for RemoteFlashcard {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(|value| Self::from_wire(value, 0))
    }
}

/// Pulls typed fields out of a JSON object, keeping the first type error.
#[derive(Default)]
struct WireReader {
    defect: Option<WireDefect>,
}

impl WireReader {
    fn flag(&mut self, field: &'static str, message: &str) {
        if self.defect.is_none() {
            self.defect = Some(WireDefect {
                field,
                message: message.to_string(),
            });
        }
    }

    fn string(&mut self, map: &mut Map<String, Value>, field: &'static str) -> Option<String> {
        match map.remove(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => {
                self.flag(field, "is not a string");
                None
            }
        }
    }

    fn integer(&mut self, map: &mut Map<String, Value>, field: &'static str) -> i64 {
        match map.remove(field) {
            None | Some(Value::Null) => 0,
            Some(Value::Number(n)) => match n.as_i64() {
                Some(v) => v,
                None => {
                    self.flag(field, "is not an integer");
                    0
                }
            },
            Some(_) => {
                self.flag(field, "is not an integer");
                0
            }
        }
    }

    fn boolean(&mut self, map: &mut Map<String, Value>, field: &'static str) -> bool {
        match map.remove(field) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => b,
            Some(_) => {
                self.flag(field, "is not a boolean");
                false
            }
        }
    }

    fn strings(&mut self, map: &mut Map<String, Value>, field: &'static str) -> Vec<String> {
        let items = match map.remove(field) {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.flag(field, "must be a list of strings");
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let Value::String(s) = item {
                out.push(s);
            } else {
                self.flag(field, "must be a list of strings");
                return Vec::new();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_tombstone_without_content() {
        let card: RemoteFlashcard =
            serde_json::from_str(r#"{"id":"a1","deleted":true}"#).unwrap();
        assert_eq!(card, RemoteFlashcard::tombstone("a1"));
    }

    #[test]
    fn test_deserialize_full_record() {
        let card: RemoteFlashcard = serde_json::from_str(
            r#"{"id":"a1","front":"Q1","back":"A1","updated_at":1700,"deck":"Spanish/Verbs","tags":["verb"]}"#,
        )
        .unwrap();
        assert_eq!(card.external_id, "a1");
        assert_eq!(card.last_modified, 1700);
        assert!(!card.deleted);
        assert_eq!(card.deck.as_deref(), Some("Spanish/Verbs"));
        assert!(card.defect.is_none());
    }

    #[test]
    fn test_mistyped_fields_become_defects() {
        let cases = [
            (r#"{"id":"a2","front":42}"#, "front"),
            (r#"{"id":"a2","front":"Q","deleted":"yes"}"#, "deleted"),
            (r#"{"id":"a2","front":"Q","updated_at":"yesterday"}"#, "updated_at"),
            (r#"{"id":"a2","front":"Q","tags":["ok",7]}"#, "tags"),
            (r#"{"id":null,"front":"Q"}"#, "id"),
        ];
        for (json, field) in cases {
            let card: RemoteFlashcard = serde_json::from_str(json).unwrap();
            assert_eq!(card.defect.map(|d| d.field), Some(field), "{json}");
        }
    }

    #[test]
    fn test_record_without_id_is_named_by_position() {
        let card = RemoteFlashcard::from_wire(serde_json::json!({"front": "Q"}), 3);
        assert_eq!(card.external_id, "<record 3>");

        let scalar = RemoteFlashcard::from_wire(serde_json::json!(42), 5);
        assert_eq!(scalar.external_id, "<record 5>");
        assert!(!scalar.deleted);
        assert_eq!(scalar.defect.unwrap().field, "record");
    }
}
