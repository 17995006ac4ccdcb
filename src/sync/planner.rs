//! Change planner: one batch of remote records → ordered plan.
//!
//! Decision rule per record, in fetch order:
//!
//! | deleted | linked | content      | action |
//! |---------|--------|--------------|--------|
//! | yes     | yes    | -            | Delete |
//! | yes     | no     | -            | Skip   |
//! | no      | no     | -            | Create |
//! | no      | yes    | differs      | Update |
//! | no      | yes    | identical    | Skip   |
//!
//! A linked note edited locally since the last sync is still updated: the
//! remote owns these fields. If an external id repeats within the batch, the
//! last occurrence wins and earlier ones become `Skip(Superseded)`.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::RemoteFlashcard;
use crate::sync::hash::fingerprint;
use crate::sync::mapper::{check_wire, map_to_local};
use crate::sync::resolver::CollectionIndex;
use crate::sync::types::{EntryFailure, PlanAction, SkipReason, SyncPlan, SyncPlanEntry};

/// Plan one batch against the current index.
///
/// # Errors
///
/// Returns [`Error::AmbiguousLink`] if any record resolves to more than one
/// local note. Mapping failures do not abort; they become Malformed skips.
pub fn plan(records: &[RemoteFlashcard], index: &CollectionIndex) -> Result<SyncPlan> {
    let mut last_position: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    for (position, record) in records.iter().enumerate() {
        last_position.insert(record.external_id.as_str(), position);
    }

    let mut sync_plan = SyncPlan {
        entries: Vec::with_capacity(records.len()),
        ..SyncPlan::default()
    };

    for (position, record) in records.iter().enumerate() {
        let action = if last_position.get(record.external_id.as_str()) == Some(&position) {
            decide(record, index, &mut sync_plan.rejected)?
        } else {
            warn!(
                external_id = %record.external_id,
                position,
                "external id repeated within one batch; later record wins"
            );
            sync_plan.superseded += 1;
            PlanAction::Skip {
                reason: SkipReason::Superseded,
            }
        };

        debug!(external_id = %record.external_id, action = %action.kind(), "planned");
        sync_plan.entries.push(SyncPlanEntry {
            external_id: record.external_id.clone(),
            last_modified: record.last_modified,
            action,
        });
    }

    Ok(sync_plan)
}

fn decide(
    record: &RemoteFlashcard,
    index: &CollectionIndex,
    rejected: &mut Vec<EntryFailure>,
) -> Result<PlanAction> {
    if let Err(e) = check_wire(record) {
        return Ok(reject(record, &e, rejected));
    }
    let linked = index.lookup(&record.external_id)?;

    if record.deleted {
        return Ok(match linked {
            Some(note) => PlanAction::Delete { note_id: note.id },
            None => PlanAction::Skip {
                reason: SkipReason::NothingToDelete,
            },
        });
    }

    let draft = match map_to_local(record) {
        Ok(draft) => draft,
        Err(e @ Error::Mapping { .. }) => return Ok(reject(record, &e, rejected)),
        Err(e) => return Err(e),
    };

    Ok(match linked {
        None => PlanAction::Create { draft },
        Some(note) if note.fingerprint != fingerprint(&draft.fields)? => PlanAction::Update {
            note_id: note.id,
            draft,
        },
        Some(_) => PlanAction::Skip {
            reason: SkipReason::Unchanged,
        },
    })
}

fn reject(record: &RemoteFlashcard, e: &Error, rejected: &mut Vec<EntryFailure>) -> PlanAction {
    warn!(external_id = %record.external_id, error = %e, "skipping malformed remote record");
    rejected.push(EntryFailure::new(&record.external_id, e));
    PlanAction::Skip {
        reason: SkipReason::Malformed,
    }
}
