//! Sync plan and result types.
//!
//! A [`SyncPlan`] is built fresh for every fetched page and dropped once the
//! executor has applied it. [`SyncResult`] aggregates what happened across
//! pages and is what the host gets to show the user.

use serde::Serialize;

use crate::error::Error;
use crate::model::{LocalNoteDraft, LocalNoteId};

/// Why a record produced no write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Linked note already matches the remote content.
    Unchanged,
    /// Remote deletion for a card we never linked.
    NothingToDelete,
    /// A later record in the same batch carries the same external id.
    Superseded,
    /// The mapper rejected the record.
    Malformed,
}

/// The decided action for one remote record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Create { draft: LocalNoteDraft },
    Update { note_id: LocalNoteId, draft: LocalNoteDraft },
    Delete { note_id: LocalNoteId },
    Skip { reason: SkipReason },
}

/// Action kind without payload, for counting and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Skip,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

impl PlanAction {
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Create { .. } => ActionKind::Create,
            Self::Update { .. } => ActionKind::Update,
            Self::Delete { .. } => ActionKind::Delete,
            Self::Skip { .. } => ActionKind::Skip,
        }
    }

    /// The local note this action touches, for Update and Delete.
    #[must_use]
    pub const fn note_id(&self) -> Option<LocalNoteId> {
        match self {
            Self::Update { note_id, .. } | Self::Delete { note_id } => Some(*note_id),
            Self::Create { .. } | Self::Skip { .. } => None,
        }
    }
}

/// One remote record's decided action within a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlanEntry {
    pub external_id: String,
    /// Remote `last_modified` of the record that produced this entry
    pub last_modified: i64,
    pub action: PlanAction,
}

/// Ordered plan for one fetched page, in remote fetch order.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub entries: Vec<SyncPlanEntry>,
    /// Records the mapper rejected; each also appears as a Malformed skip entry
    pub rejected: Vec<EntryFailure>,
    /// How many entries were downgraded because the id repeated later in the batch
    pub superseded: usize,
}

impl SyncPlan {
    /// `(external_id, kind)` pairs in plan order.
    #[must_use]
    pub fn kinds(&self) -> Vec<(&str, ActionKind)> {
        self.entries
            .iter()
            .map(|e| (e.external_id.as_str(), e.action.kind()))
            .collect()
    }

    /// Number of entries of the given kind.
    #[must_use]
    pub fn count(&self, kind: ActionKind) -> usize {
        self.entries.iter().filter(|e| e.action.kind() == kind).count()
    }

    /// Highest remote timestamp in the page.
    #[must_use]
    pub fn high_water(&self) -> i64 {
        self.entries.iter().map(|e| e.last_modified).max().unwrap_or(0)
    }
}

/// A contained, per-record failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    pub external_id: String,
    /// Machine-readable `ErrorCode` string
    pub code: String,
    pub message: String,
}

impl EntryFailure {
    #[must_use]
    pub fn new(external_id: &str, error: &Error) -> Self {
        Self {
            external_id: external_id.to_string(),
            code: error.error_code().as_str().to_string(),
            message: error.to_string(),
        }
    }
}

/// Aggregate counts and failures for one or more executed plans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    /// Entries whose write the host rejected; these hold the checkpoint back
    pub failures: Vec<EntryFailure>,
    /// Records the mapper rejected; logged and skipped
    pub rejected: Vec<EntryFailure>,
}

impl SyncResult {
    /// Total number of plan entries accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.skipped + self.failures.len()
    }

    /// Number of writes that reached the collection.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: SyncResult) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
        self.rejected.extend(other.rejected);
    }
}
