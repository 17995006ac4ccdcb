//! Sync executor: applies a plan to the host collection.
//!
//! The plan is cut into sub-batches of at most `sub_batch_size` entries.
//! Each sub-batch runs inside one collection transaction:
//!
//! 1. `begin_transaction`
//! 2. apply each entry in plan order; a rejected entry is recorded in
//!    `failures` and the rest of the sub-batch carries on
//! 3. `commit`, then replay the committed links into the index
//!
//! If begin or commit fails, the sub-batch is rolled back and every write in
//! it is reported as failed. Shutdown is honored between sub-batches only.

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::NoteCollection;
use crate::sync::hash::fingerprint;
use crate::sync::resolver::{CollectionIndex, IndexChange, IndexedNote};
use crate::sync::shutdown::ShutdownSignal;
use crate::sync::types::{ActionKind, EntryFailure, PlanAction, SyncPlan, SyncPlanEntry, SyncResult};

/// Default number of entries per transaction.
pub const DEFAULT_SUB_BATCH_SIZE: usize = 50;

/// Outcome of executing one plan.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub result: SyncResult,
    pub sub_batches: usize,
    pub committed_sub_batches: usize,
    /// Shutdown arrived before every sub-batch was started
    pub cancelled: bool,
}

impl ExecutionReport {
    /// Every sub-batch committed and no entry failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.cancelled
            && self.committed_sub_batches == self.sub_batches
            && !self.result.has_failures()
    }
}

/// Result of one committed sub-batch, applied to the report and index only after commit.
#[derive(Default)]
struct Staged {
    result: SyncResult,
    changes: Vec<IndexChange>,
}

/// Applies plans against a collection through its transaction boundary.
pub struct Executor<'a, C: NoteCollection + ?Sized> {
    collection: &'a mut C,
    sub_batch_size: usize,
    shutdown: Option<ShutdownSignal>,
}

impl<'a, C: NoteCollection + ?Sized> Executor<'a, C> {
    pub fn new(collection: &'a mut C) -> Self {
        Self {
            collection,
            sub_batch_size: DEFAULT_SUB_BATCH_SIZE,
            shutdown: None,
        }
    }

    #[must_use]
    pub fn with_sub_batch_size(mut self, size: usize) -> Self {
        self.sub_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Apply `plan` in order, updating `index` as sub-batches commit.
    pub fn execute(&mut self, plan: &SyncPlan, index: &mut CollectionIndex) -> ExecutionReport {
        let mut report = ExecutionReport {
            sub_batches: plan.entries.len().div_ceil(self.sub_batch_size),
            ..ExecutionReport::default()
        };
        report.result.rejected.clone_from(&plan.rejected);

        for (number, chunk) in plan.entries.chunks(self.sub_batch_size).enumerate() {
            if self.shutdown.as_ref().is_some_and(ShutdownSignal::is_triggered) {
                info!(
                    committed = report.committed_sub_batches,
                    remaining = report.sub_batches - number,
                    "shutdown requested; stopping before next sub-batch"
                );
                report.cancelled = true;
                break;
            }

            match self.apply_sub_batch(chunk) {
                Ok(staged) => {
                    index.apply(staged.changes);
                    report.result.merge(staged.result);
                    report.committed_sub_batches += 1;
                    debug!(sub_batch = number, entries = chunk.len(), "sub-batch committed");
                }
                Err(e) => {
                    warn!(sub_batch = number, error = %e, "sub-batch rolled back");
                    for entry in chunk {
                        if entry.action.kind() == ActionKind::Skip {
                            report.result.skipped += 1;
                        } else {
                            report
                                .result
                                .failures
                                .push(EntryFailure::new(&entry.external_id, &e));
                        }
                    }
                }
            }
        }

        report
    }

    fn apply_sub_batch(&mut self, chunk: &[SyncPlanEntry]) -> Result<Staged> {
        self.collection.begin_transaction()?;

        let mut staged = Staged::default();
        for entry in chunk {
            match self.apply_entry(entry) {
                Ok(change) => {
                    match entry.action.kind() {
                        ActionKind::Create => staged.result.created += 1,
                        ActionKind::Update => staged.result.updated += 1,
                        ActionKind::Delete => staged.result.deleted += 1,
                        ActionKind::Skip => staged.result.skipped += 1,
                    }
                    staged.changes.extend(change);
                }
                Err(e) => {
                    warn!(external_id = %entry.external_id, error = %e, "entry rejected by collection");
                    staged
                        .result
                        .failures
                        .push(EntryFailure::new(&entry.external_id, &e));
                }
            }
        }

        if let Err(e) = self.collection.commit() {
            if let Err(rollback_err) = self.collection.rollback() {
                warn!(error = %rollback_err, "rollback after failed commit also failed");
            }
            return Err(e);
        }

        Ok(staged)
    }

    fn apply_entry(&mut self, entry: &SyncPlanEntry) -> Result<Option<IndexChange>> {
        match &entry.action {
            PlanAction::Create { draft } => {
                if let Some(existing) = self.collection.find_by_external_id(&draft.external_id)? {
                    return Err(Error::Persistence(format!(
                        "external id already linked to note {existing}"
                    )));
                }
                let fingerprint = fingerprint(&draft.fields)?;
                let id = self.collection.create_note(draft)?;
                Ok(Some(IndexChange::Linked {
                    external_id: draft.external_id.clone(),
                    note: IndexedNote { id, fingerprint },
                }))
            }
            PlanAction::Update { note_id, draft } => {
                let fingerprint = fingerprint(&draft.fields)?;
                self.collection.update_note(*note_id, draft)?;
                Ok(Some(IndexChange::Linked {
                    external_id: draft.external_id.clone(),
                    note: IndexedNote {
                        id: *note_id,
                        fingerprint,
                    },
                }))
            }
            PlanAction::Delete { note_id } => {
                self.collection.delete_note(*note_id)?;
                Ok(Some(IndexChange::Unlinked {
                    external_id: entry.external_id.clone(),
                }))
            }
            PlanAction::Skip { .. } => Ok(None),
        }
    }
}
