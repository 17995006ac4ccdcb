//! Remote change feed.
//!
//! The sync core fetches pages of changed flashcards through the
//! [`RemoteSource`] trait. [`HttpRemote`] is the production client; tests
//! script their own sources.

pub mod http;

pub use http::HttpRemote;

use serde::{Deserialize, Deserializer};

use crate::error::Result;
use crate::model::RemoteFlashcard;

/// One page of the remote change feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FetchPage {
    /// Changed records in the remote's own order
    #[serde(default, deserialize_with = "records_from_wire")]
    pub records: Vec<RemoteFlashcard>,
    /// Cursor to resume from after this page
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

impl FetchPage {
    /// Highest `last_modified` on the page, or 0 when empty.
    #[must_use]
    pub fn high_water(&self) -> i64 {
        self.records
            .iter()
            .map(|r| r.last_modified)
            .max()
            .unwrap_or(0)
    }
}

/// Decode each record on its own so a mistyped one cannot fail the page.
fn records_from_wire<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<RemoteFlashcard>, D::Error> {
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, value)| RemoteFlashcard::from_wire(value, position))
        .collect())
}

/// Source of changed flashcards, authenticated out-of-band.
pub trait RemoteSource: Send + Sync {
    /// Fetch the page of changes that follows `cursor` (`None` = from the beginning).
    fn fetch_changed(
        &self,
        cursor: Option<&str>,
    ) -> impl std::future::Future<Output = Result<FetchPage>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_deserializes_with_defaults() {
        let page: FetchPage = serde_json::from_str(r#"{"records":[]}"#).unwrap();
        assert!(page.next_cursor.is_none());
        assert!(!page.has_more);
        assert_eq!(page.high_water(), 0);
    }

    #[test]
    fn test_mistyped_record_does_not_fail_page() {
        let page: FetchPage = serde_json::from_str(
            r#"{
                "records": [
                    {"id":"a1","front":"Q1","back":"A1","updated_at":10},
                    {"id":"a2","front":42},
                    {"front":"no id"}
                ],
                "next_cursor": "p2",
                "has_more": true
            }"#,
        )
        .unwrap();

        assert_eq!(page.records.len(), 3);
        assert!(page.records[0].defect.is_none());
        assert_eq!(page.records[1].defect.as_ref().unwrap().field, "front");
        assert_eq!(page.records[2].external_id, "<record 2>");
        assert_eq!(page.next_cursor.as_deref(), Some("p2"));
    }

    #[test]
    fn test_page_high_water() {
        let page = FetchPage {
            records: vec![
                RemoteFlashcard::new("a", "Q", "A").modified_at(300),
                RemoteFlashcard::new("b", "Q", "A").modified_at(100),
            ],
            ..FetchPage::default()
        };
        assert_eq!(page.high_water(), 300);
    }
}
