//! One-way flashcard reconciliation.
//!
//! Remote records flow through the pipeline in one direction:
//!
//! - **Mapper**: remote record → local note draft (pure, deterministic)
//! - **Resolver**: external id → linked local note, via a per-run index
//! - **Planner**: batch of records → ordered Create/Update/Delete/Skip plan
//! - **Executor**: plan → transactional sub-batches against the collection
//! - **Coordinator**: fetch → plan → execute → checkpoint, page by page
//!
//! # Guarantees
//!
//! - Re-running a sync with no remote changes writes nothing
//! - No two local notes ever end up sharing an external id through sync
//! - The checkpoint only moves past pages that committed with zero failures
//!
//! # Example
//!
//! ```ignore
//! use cardsync::storage::SqliteCollection;
//! use cardsync::remote::HttpRemote;
//! use cardsync::sync::{SyncCoordinator, SyncSettings};
//!
//! let mut collection = SqliteCollection::open(&db_path)?;
//! let remote = HttpRemote::new(endpoint, Some(token));
//! let outcome = SyncCoordinator::new(&mut collection, &remote, SyncSettings::default())
//!     .run_sync()
//!     .await;
//! println!("{}", outcome.summary());
//! ```

pub mod checkpoint;
mod coordinator;
mod executor;
mod hash;
pub mod mapper;
mod planner;
mod resolver;
mod shutdown;
mod types;

pub use checkpoint::{CheckpointLoad, SyncCheckpoint};
pub use coordinator::{RunFailure, RunStatus, SyncCoordinator, SyncOutcome, SyncSettings, SyncState};
pub use executor::{ExecutionReport, Executor, DEFAULT_SUB_BATCH_SIZE};
pub use hash::{content_hash, fingerprint};
pub use mapper::map_to_local;
pub use planner::plan;
pub use resolver::{resolve, CollectionIndex, IndexChange, IndexedNote};
pub use shutdown::ShutdownSignal;
pub use types::{
    ActionKind, EntryFailure, PlanAction, SkipReason, SyncPlan, SyncPlanEntry, SyncResult,
};
