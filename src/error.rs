//! Error types for cardsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=link, 4=validation, etc.)
//! - Retryability flags so the host knows whether the next startup may succeed
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

/// Result type alias for cardsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Hosts match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    DatabaseError,
    PersistenceError,

    // Link integrity (exit 3)
    AmbiguousLink,
    CheckpointCorruption,

    // Validation (exit 4)
    MappingError,
    InvalidArgument,

    // Transport (exit 5)
    TransportError,
    AuthError,

    // Cancelled (exit 6)
    Cancelled,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::PersistenceError => "PERSISTENCE_ERROR",
            Self::AmbiguousLink => "AMBIGUOUS_LINK",
            Self::CheckpointCorruption => "CHECKPOINT_CORRUPTION",
            Self::MappingError => "MAPPING_ERROR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::DatabaseError | Self::PersistenceError => 2,
            Self::AmbiguousLink | Self::CheckpointCorruption => 3,
            Self::MappingError | Self::InvalidArgument => 4,
            Self::TransportError | Self::AuthError => 5,
            Self::Cancelled => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether a later run can be expected to succeed without intervention.
    ///
    /// True for transport trouble, per-entry persistence failures and
    /// cancellation. False for corruption, which needs a human.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportError | Self::PersistenceError | Self::DatabaseError | Self::Cancelled
        )
    }
}

impl serde::Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur while syncing.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: collection database not found")]
    NotInitialized,

    /// A remote record could not be mapped to a local note.
    #[error("Malformed remote record {external_id}: field `{field}` {message}")]
    Mapping {
        external_id: String,
        field: &'static str,
        message: String,
    },

    /// More than one local note carries the same external id.
    #[error("External id {external_id} is linked to {} local notes", note_ids.len())]
    AmbiguousLink {
        external_id: String,
        note_ids: Vec<i64>,
    },

    #[error("Transport error: {message}")]
    Transport { message: String, retryable: bool },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Checkpoint corrupted: {0}")]
    CheckpointCorruption(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Sync cancelled by host shutdown")]
    Cancelled,

    /// A sync run ended without completing; details were already reported.
    #[error("Sync did not complete: {message}")]
    Incomplete { code: ErrorCode, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a transport failure.
    pub fn transport(message: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            message: message.into(),
            retryable,
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::Mapping { .. } => ErrorCode::MappingError,
            Self::AmbiguousLink { .. } => ErrorCode::AmbiguousLink,
            Self::Transport { .. } => ErrorCode::TransportError,
            Self::Persistence(_) => ErrorCode::PersistenceError,
            Self::CheckpointCorruption(_) => ErrorCode::CheckpointCorruption,
            Self::Auth(_) => ErrorCode::AuthError,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Incomplete { code, .. } => *code,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether the fetch that produced this error is worth repeating within the same run.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for users.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some(
                "Pass --db <path> or set CARDSYNC_DB to point at the collection database"
                    .to_string(),
            ),
            Self::AmbiguousLink { external_id, note_ids } => Some(format!(
                "Notes {note_ids:?} all claim external id '{external_id}'. \
                 Remove the duplicates in the host collection, then sync again."
            )),
            Self::Transport {
                retryable: true, ..
            } => Some("The remote service is unreachable. Sync resumes on next startup.".into()),
            Self::Auth(_) => Some("Run `cardsync auth login` to refresh credentials".to_string()),
            Self::CheckpointCorruption(_) => Some(
                "The checkpoint was reset; the next sync re-fetches everything from the start"
                    .to_string(),
            ),
            Self::Config(_) => Some("Check ~/.cardsync/config.json".to_string()),
            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
