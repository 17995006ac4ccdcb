//! Record mapper: remote flashcard → local note draft.
//!
//! Pure and deterministic. The same remote record always yields a
//! byte-identical draft, which is what makes re-applying a batch a no-op.
//!
//! Transformations:
//! - sides: remote light markup (`**bold**`, `*italic*`, newlines) → host HTML
//! - deck: `Spanish/Verbs` → `Spanish::Verbs`, empty → `Default`
//! - tags: trimmed, inner whitespace → `_`, sorted, deduplicated

use crate::error::{Error, Result};
use crate::model::{LocalNoteDraft, NoteFields, RemoteFlashcard};

/// Deck used when the remote record carries none.
pub const DEFAULT_DECK: &str = "Default";

/// Reject a record whose wire form carried a mistyped or missing field.
///
/// Applies to tombstones too: a deletion whose fields did not decode is not
/// trusted.
///
/// # Errors
///
/// Returns [`Error::Mapping`] naming the first bad field.
pub fn check_wire(remote: &RemoteFlashcard) -> Result<()> {
    match &remote.defect {
        Some(defect) => Err(Error::Mapping {
            external_id: remote.external_id.clone(),
            field: defect.field,
            message: defect.message.clone(),
        }),
        None => Ok(()),
    }
}

/// Map one remote record to the note it should become.
///
/// # Errors
///
/// Returns [`Error::Mapping`] naming the offending field if the record is
/// malformed: a field of the wrong type, empty or whitespace-bearing id,
/// missing/empty front, missing back, or a negative timestamp.
pub fn map_to_local(remote: &RemoteFlashcard) -> Result<LocalNoteDraft> {
    check_wire(remote)?;
    let external_id = &remote.external_id;
    let fail = |field: &'static str, message: &str| Error::Mapping {
        external_id: external_id.clone(),
        field,
        message: message.to_string(),
    };

    if external_id.is_empty() {
        return Err(fail("id", "is empty"));
    }
    if external_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(fail("id", "contains whitespace or control characters"));
    }
    if remote.last_modified < 0 {
        return Err(fail("updated_at", "is negative"));
    }

    let front = remote.front.as_deref().ok_or_else(|| fail("front", "is missing"))?;
    if front.trim().is_empty() {
        return Err(fail("front", "is empty"));
    }
    let back = remote.back.as_deref().ok_or_else(|| fail("back", "is missing"))?;

    Ok(LocalNoteDraft {
        external_id: external_id.clone(),
        fields: NoteFields {
            front: markup_to_html(front),
            back: markup_to_html(back),
            deck: map_deck(remote.deck.as_deref()),
            tags: map_tags(&remote.tags),
        },
    })
}

/// Convert remote light markup to host HTML.
#[must_use]
pub fn markup_to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<String> = normalized
        .trim()
        .lines()
        .map(|line| render_inline(&escape_html(line.trim_end())))
        .collect();
    lines.join("<br>")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Replace paired `**` with `<b>` and paired `*` with `<i>`.
///
/// An unpaired marker is left as literal text.
fn render_inline(line: &str) -> String {
    let bold = wrap_pairs(line, "**", "b");
    wrap_pairs(&bold, "*", "i")
}

fn wrap_pairs(text: &str, marker: &str, tag: &str) -> String {
    let parts: Vec<&str> = text.split(marker).collect();
    // An even number of parts means one marker is unpaired; keep the last literally
    let paired = if parts.len() % 2 == 0 {
        parts.len() - 1
    } else {
        parts.len()
    };

    let mut out = String::with_capacity(text.len());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            if i >= paired {
                out.push_str(marker);
            } else if i % 2 == 1 {
                out.push_str(&format!("<{tag}>"));
            } else {
                out.push_str(&format!("</{tag}>"));
            }
        }
        out.push_str(part);
    }
    out
}

fn map_deck(deck: Option<&str>) -> String {
    let segments: Vec<&str> = deck
        .unwrap_or_default()
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        DEFAULT_DECK.to_string()
    } else {
        segments.join("::")
    }
}

fn map_tags(tags: &[String]) -> Vec<String> {
    let mut mapped: Vec<String> = tags
        .iter()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join("_"))
        .filter(|t| !t.is_empty())
        .collect();
    mapped.sort();
    mapped.dedup();
    mapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_mapping() {
        let remote = RemoteFlashcard::new("a1", "Q1", "A1");
        let draft = map_to_local(&remote).unwrap();
        assert_eq!(draft.external_id, "a1");
        assert_eq!(draft.fields.front, "Q1");
        assert_eq!(draft.fields.back, "A1");
        assert_eq!(draft.fields.deck, DEFAULT_DECK);
        assert!(draft.fields.tags.is_empty());
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let remote = RemoteFlashcard::new("a1", "**to be**\r\nser & estar", "<x>")
            .with_deck("Spanish/ Verbs /")
            .with_tags(["verb", "irregular verb", "verb"]);
        assert_eq!(map_to_local(&remote).unwrap(), map_to_local(&remote).unwrap());
    }

    #[test]
    fn test_markup_conversion() {
        assert_eq!(
            markup_to_html("**to be**\nser & estar"),
            "<b>to be</b><br>ser &amp; estar"
        );
        assert_eq!(markup_to_html("*ir* <a>"), "<i>ir</i> &lt;a&gt;");
        assert_eq!(markup_to_html("2 * 3"), "2 * 3");
        assert_eq!(markup_to_html("  padded  \n"), "padded");
    }

    #[test]
    fn test_deck_and_tags() {
        let remote = RemoteFlashcard::new("a1", "Q", "A")
            .with_deck("Spanish/ Verbs /")
            .with_tags(["verb", "irregular verb", "  ", "verb"]);
        let draft = map_to_local(&remote).unwrap();
        assert_eq!(draft.fields.deck, "Spanish::Verbs");
        assert_eq!(draft.fields.tags, vec!["irregular_verb", "verb"]);
    }

    #[test]
    fn test_malformed_records_name_the_field() {
        let cases = [
            (RemoteFlashcard::new("", "Q", "A"), "id"),
            (RemoteFlashcard::new("a 1", "Q", "A"), "id"),
            (RemoteFlashcard::new("a1", "   ", "A"), "front"),
            (RemoteFlashcard::new("a1", "Q", "A").modified_at(-5), "updated_at"),
            (RemoteFlashcard::tombstone("a1"), "front"),
        ];
        for (remote, expected) in cases {
            match map_to_local(&remote) {
                Err(Error::Mapping { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected mapping error on {expected}, got {other:?}"),
            }
        }

        let mut no_back = RemoteFlashcard::new("a1", "Q", "A");
        no_back.back = None;
        assert!(matches!(
            map_to_local(&no_back),
            Err(Error::Mapping { field: "back", .. })
        ));
    }

    #[test]
    fn test_wire_defect_is_a_mapping_error() {
        let remote: RemoteFlashcard = serde_json::from_str(r#"{"id":"a2","front":42,"back":"A"}"#).unwrap();
        match map_to_local(&remote) {
            Err(Error::Mapping { external_id, field, .. }) => {
                assert_eq!(external_id, "a2");
                assert_eq!(field, "front");
            }
            other => panic!("expected mapping error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_back_is_allowed() {
        let draft = map_to_local(&RemoteFlashcard::new("a1", "Q", "")).unwrap();
        assert_eq!(draft.fields.back, "");
    }
}
