//! Sync coordinator: the startup entry point.
//!
//! One call to [`SyncCoordinator::run_sync`] performs one run:
//!
//! ```text
//! load checkpoint, build index
//! loop per page:
//!     Fetching   -> remote page after the checkpoint cursor (timeout + retry)
//!     Planning   -> plan against the in-run index
//!     Executing  -> sub-batched transactional writes
//!     Persisting -> advance checkpoint if the page applied cleanly
//! until the remote reports no more pages
//! ```
//!
//! Fetch and planning errors abort the run with the checkpoint where it was.
//! A page with any failed entry stops the run as a partial failure so the
//! next startup re-fetches that page. All state needed across runs goes
//! through the [`CheckpointStore`]; the coordinator itself holds none.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Error, ErrorCode, Result};
use crate::remote::{FetchPage, RemoteSource};
use crate::storage::{CheckpointStore, NoteCollection};
use crate::sync::checkpoint::{self, SyncCheckpoint};
use crate::sync::executor::{Executor, DEFAULT_SUB_BATCH_SIZE};
use crate::sync::planner::plan;
use crate::sync::resolver::CollectionIndex;
use crate::sync::shutdown::ShutdownSignal;
use crate::sync::types::SyncResult;

/// Knobs for one run, resolved by the caller from configuration.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Key under which the checkpoint is stored
    pub account: String,
    pub sub_batch_size: usize,
    /// Upper bound on a single page fetch
    pub fetch_timeout: Duration,
    /// Extra attempts for a retryable fetch failure
    pub fetch_retries: u32,
    /// Base delay between attempts; grows linearly
    pub retry_backoff: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            account: "default".to_string(),
            sub_batch_size: DEFAULT_SUB_BATCH_SIZE,
            fetch_timeout: Duration::from_secs(30),
            fetch_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching,
    Planning,
    Executing,
    Persisting,
    Failed,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every page applied and checkpointed
    Completed,
    /// Some entries failed; checkpoint held at the last clean page
    PartialFailure,
    /// Host shutdown stopped the run between sub-batches or fetches
    Cancelled,
    /// Run aborted by a fetch, integrity or persistence error
    Failed,
}

/// Short, user-presentable reason for an aborted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl From<&Error> for RunFailure {
    fn from(e: &Error) -> Self {
        let code = e.error_code();
        Self {
            code,
            message: e.to_string(),
            retryable: code.is_retryable(),
            hint: e.hint(),
        }
    }
}

/// Everything the host needs to report a run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub status: RunStatus,
    pub result: SyncResult,
    /// Pages fetched, including a page whose application failed
    pub pages: usize,
    /// Checkpoint as persisted when the run ended
    pub checkpoint: SyncCheckpoint,
    /// A corrupted checkpoint was found and replaced at run start
    pub checkpoint_reset: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
}

impl SyncOutcome {
    fn new() -> Self {
        Self {
            status: RunStatus::Completed,
            result: SyncResult::default(),
            pages: 0,
            checkpoint: SyncCheckpoint::default(),
            checkpoint_reset: false,
            error: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let r = &self.result;
        format!(
            "{} created, {} updated, {} deleted, {} skipped, {} failed, {} rejected",
            r.created,
            r.updated,
            r.deleted,
            r.skipped,
            r.failures.len(),
            r.rejected.len()
        )
    }
}

/// Runs one sync against a collection and a remote source.
pub struct SyncCoordinator<'a, C, R>
where
    C: NoteCollection + CheckpointStore + ?Sized,
    R: RemoteSource,
{
    collection: &'a mut C,
    remote: &'a R,
    settings: SyncSettings,
    shutdown: ShutdownSignal,
    state: SyncState,
}

impl<'a, C, R> SyncCoordinator<'a, C, R>
where
    C: NoteCollection + CheckpointStore + ?Sized,
    R: RemoteSource,
{
    pub fn new(collection: &'a mut C, remote: &'a R, settings: SyncSettings) -> Self {
        Self {
            collection,
            remote,
            settings,
            shutdown: ShutdownSignal::new(),
            state: SyncState::Idle,
        }
    }

    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    fn transition(&mut self, next: SyncState) {
        debug!(from = ?self.state, to = ?next, "sync state");
        self.state = next;
    }

    /// Run one sync. Never returns an error: aborts are reported in the outcome.
    pub async fn run_sync(&mut self) -> SyncOutcome {
        let mut outcome = SyncOutcome::new();
        info!(account = %self.settings.account, "sync started");

        match self.run_pages(&mut outcome).await {
            Ok(status) => {
                outcome.status = status;
                self.transition(SyncState::Idle);
            }
            Err(Error::Cancelled) => {
                outcome.status = RunStatus::Cancelled;
                self.transition(SyncState::Idle);
            }
            Err(e) => {
                error!(error = %e, code = e.error_code().as_str(), "sync aborted");
                outcome.status = RunStatus::Failed;
                outcome.error = Some(RunFailure::from(&e));
                self.transition(SyncState::Failed);
            }
        }

        info!(
            status = ?outcome.status,
            pages = outcome.pages,
            generation = outcome.checkpoint.generation,
            "sync finished: {}",
            outcome.summary()
        );
        outcome
    }

    async fn run_pages(&mut self, outcome: &mut SyncOutcome) -> Result<RunStatus> {
        let loaded = checkpoint::load(&mut *self.collection, &self.settings.account)?;
        outcome.checkpoint = loaded.checkpoint;
        outcome.checkpoint_reset = loaded.reset;

        let mut index = CollectionIndex::build(&*self.collection)?;
        debug!(linked = index.len(), "collection index built");

        loop {
            if self.shutdown.is_triggered() {
                info!("shutdown requested; not fetching further pages");
                return Ok(RunStatus::Cancelled);
            }

            self.transition(SyncState::Fetching);
            let cursor = outcome.checkpoint.cursor.clone();
            let page = self.fetch_with_retry(cursor.as_deref()).await?;
            outcome.pages += 1;
            check_page_cursor(&page, cursor.as_deref())?;
            debug!(records = page.records.len(), has_more = page.has_more, "page fetched");

            self.transition(SyncState::Planning);
            let page_plan = plan(&page.records, &index)?;

            self.transition(SyncState::Executing);
            let report = Executor::new(&mut *self.collection)
                .with_sub_batch_size(self.settings.sub_batch_size)
                .with_shutdown(self.shutdown.clone())
                .execute(&page_plan, &mut index);
            let clean = report.is_clean();
            let cancelled = report.cancelled;
            outcome.result.merge(report.result);

            if cancelled {
                return Ok(RunStatus::Cancelled);
            }
            if !clean {
                warn!(
                    failures = outcome.result.failures.len(),
                    "page had failed entries; checkpoint held for re-fetch"
                );
                return Ok(RunStatus::PartialFailure);
            }

            self.transition(SyncState::Persisting);
            let high_water = page.high_water();
            if outcome
                .checkpoint
                .would_change(page.next_cursor.as_deref(), high_water)
            {
                let next = outcome
                    .checkpoint
                    .advance(page.next_cursor.as_deref(), high_water);
                checkpoint::save(&mut *self.collection, &self.settings.account, &next)?;
                outcome.checkpoint = next;
            }

            if !page.has_more {
                return Ok(RunStatus::Completed);
            }
        }
    }

    async fn fetch_with_retry(&self, cursor: Option<&str>) -> Result<FetchPage> {
        let timeout = self.settings.fetch_timeout;
        let mut attempt: u32 = 0;

        loop {
            let result = match tokio::time::timeout(timeout, self.remote.fetch_changed(cursor)).await
            {
                Ok(result) => result,
                Err(_) => Err(Error::transport(
                    format!("fetch timed out after {}ms", timeout.as_millis()),
                    true,
                )),
            };

            match result {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.settings.fetch_retries => {
                    attempt += 1;
                    warn!(attempt, max = self.settings.fetch_retries, error = %e, "fetch failed; retrying");
                    tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                    if self.shutdown.is_triggered() {
                        return Err(Error::Cancelled);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Reject pages that would make the fetch loop spin.
fn check_page_cursor(page: &FetchPage, current: Option<&str>) -> Result<()> {
    if !page.has_more {
        return Ok(());
    }
    match page.next_cursor.as_deref() {
        None => Err(Error::transport(
            "remote reported more pages without a cursor",
            false,
        )),
        Some(next) if Some(next) == current => Err(Error::transport(
            format!("remote cursor did not advance past '{next}'"),
            false,
        )),
        Some(_) => Ok(()),
    }
}
