//! Audit log of writes made by sync.
//!
//! Every note the sync core touches and every checkpoint movement leaves a
//! row here, so a user can see what a startup sync did to their collection.

use rusqlite::{Connection, Result};

/// Event types for the sync audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    NoteCreated,
    NoteUpdated,
    NoteDeleted,
    CheckpointStored,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoteCreated => "note_created",
            Self::NoteUpdated => "note_updated",
            Self::NoteDeleted => "note_deleted",
            Self::CheckpointStored => "checkpoint_stored",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "note_created" => Some(Self::NoteCreated),
            "note_updated" => Some(Self::NoteUpdated),
            "note_deleted" => Some(Self::NoteDeleted),
            "checkpoint_stored" => Some(Self::CheckpointStored),
            _ => None,
        }
    }
}

/// An audit event record.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub event_type: EventType,
    /// External id for note events, account for checkpoint events
    pub subject: String,
    pub note_id: Option<i64>,
    pub detail: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(event_type: EventType, subject: &str) -> Self {
        Self {
            id: 0,
            event_type,
            subject: subject.to_string(),
            note_id: None,
            detail: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn with_note(mut self, note_id: i64) -> Self {
        self.note_id = Some(note_id);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO sync_events (event_type, subject, note_id, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            event.event_type.as_str(),
            event.subject,
            event.note_id,
            event.detail,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for a subject, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(conn: &Connection, subject: &str, limit: Option<u32>) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, event_type, subject, note_id, detail, created_at
         FROM sync_events
         WHERE subject = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(rusqlite::params![subject, limit], map_event)?;
    rows.collect()
}

/// Most recent event of one type for a subject.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn latest_event(conn: &Connection, subject: &str, event_type: EventType) -> Result<Option<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, event_type, subject, note_id, detail, created_at
         FROM sync_events
         WHERE subject = ?1 AND event_type = ?2
         ORDER BY id DESC
         LIMIT 1",
    )?;

    let mut rows = stmt.query_map(rusqlite::params![subject, event_type.as_str()], map_event)?;
    rows.next().transpose()
}

fn map_event(row: &rusqlite::Row<'_>) -> Result<Event> {
    let raw: String = row.get(1)?;
    let event_type = EventType::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown event type {raw}").into(),
        )
    })?;
    Ok(Event {
        id: row.get(0)?,
        event_type,
        subject: row.get(2)?,
        note_id: row.get(3)?,
        detail: row.get(4)?,
        created_at: row.get(5)?,
    })
}
