//! Sync command: one fetch → plan → execute → checkpoint run.
//!
//! Ctrl-C triggers the shutdown signal; the run stops before its next
//! sub-batch or fetch and keeps everything committed so far.

use std::path::PathBuf;

use colored::Colorize;
use tracing::warn;

use crate::config::load_config;
use crate::error::{Error, ErrorCode, Result};
use crate::remote::HttpRemote;
use crate::sync::{RunStatus, ShutdownSignal, SyncCoordinator, SyncOutcome};

use super::{open_or_create, runtime};

/// Execute the sync command.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, the collection cannot be
/// opened, or the run did not complete. The outcome is printed either way.
pub fn execute(
    account: Option<&str>,
    endpoint: Option<&str>,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let endpoint = match endpoint {
        Some(endpoint) => endpoint.to_string(),
        None => config.resolve_endpoint()?,
    };
    let account = account.map_or_else(|| config.resolve_account(), ToString::to_string);

    let remote = HttpRemote::new(endpoint, config.resolve_token()).with_page_size(config.page_size);
    let settings = config.sync_settings(account);
    let mut collection = open_or_create(db_path)?;

    let shutdown = ShutdownSignal::new();
    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let on_interrupt = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing current sub-batch");
                on_interrupt.trigger();
            }
        });

        SyncCoordinator::new(&mut collection, &remote, settings)
            .with_shutdown(shutdown.clone())
            .run_sync()
            .await
    });

    if json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    into_result(&outcome)
}

/// Map a finished run onto the process exit status.
fn into_result(outcome: &SyncOutcome) -> Result<()> {
    match outcome.status {
        RunStatus::Completed => Ok(()),
        RunStatus::PartialFailure => Err(Error::Incomplete {
            code: ErrorCode::PersistenceError,
            message: format!(
                "{} entries failed; they will be retried on the next sync",
                outcome.result.failures.len()
            ),
        }),
        RunStatus::Cancelled => Err(Error::Cancelled),
        RunStatus::Failed => {
            let (code, message) = outcome.error.as_ref().map_or_else(
                || (ErrorCode::InternalError, "unknown failure".to_string()),
                |f| (f.code, f.message.clone()),
            );
            Err(Error::Incomplete { code, message })
        }
    }
}

fn print_outcome(outcome: &SyncOutcome) {
    let headline = match outcome.status {
        RunStatus::Completed => "Sync complete".green().bold(),
        RunStatus::PartialFailure => "Sync partially applied".yellow().bold(),
        RunStatus::Cancelled => "Sync cancelled".yellow().bold(),
        RunStatus::Failed => "Sync failed".red().bold(),
    };
    println!("{headline}");
    println!();

    let r = &outcome.result;
    println!("  Created:  {}", r.created);
    println!("  Updated:  {}", r.updated);
    println!("  Deleted:  {}", r.deleted);
    println!("  Skipped:  {}", r.skipped);
    println!("  Pages:    {}", outcome.pages);

    if outcome.checkpoint_reset {
        println!();
        println!(
            "  {} checkpoint was unreadable and has been reset",
            "!".yellow()
        );
    }

    if !r.failures.is_empty() {
        println!();
        println!("{}", "Failed entries".red().bold());
        for failure in &r.failures {
            println!("  {} {}: {}", "•".red(), failure.external_id, failure.message);
        }
    }

    if !r.rejected.is_empty() {
        println!();
        println!("{}", "Rejected remote records".yellow().bold());
        for rejected in &r.rejected {
            println!("  {} {}: {}", "•".yellow(), rejected.external_id, rejected.message);
        }
    }

    if let Some(failure) = &outcome.error {
        println!();
        println!("  Reason: {}", failure.message);
        if let Some(hint) = &failure.hint {
            println!("  Hint:   {hint}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{RunFailure, SyncCheckpoint, SyncResult};

    fn outcome(status: RunStatus) -> SyncOutcome {
        SyncOutcome {
            status,
            result: SyncResult::default(),
            pages: 1,
            checkpoint: SyncCheckpoint::default(),
            checkpoint_reset: false,
            error: None,
        }
    }

    #[test]
    fn test_completed_run_is_ok() {
        assert!(into_result(&outcome(RunStatus::Completed)).is_ok());
    }

    #[test]
    fn test_failed_run_keeps_code() {
        let mut failed = outcome(RunStatus::Failed);
        failed.error = Some(RunFailure::from(&Error::transport("timed out", true)));
        let err = into_result(&failed).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::TransportError);
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_cancelled_run_exit_code() {
        assert_eq!(into_result(&outcome(RunStatus::Cancelled)).unwrap_err().exit_code(), 6);
    }
}
