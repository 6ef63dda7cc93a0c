//! Merge Executor: collapse several clusters into the oldest one.
//!
//! The store runs the merge in one transaction. This module owns the
//! retry loop around it: serialization failures and deadlocks are retried
//! with linear backoff, anything else is returned as is.

use std::collections::BTreeSet;

use reconcile_core::{ContactId, MergeOutcome, ReconcileError, ReconcileResult};
use reconcile_storage::ContactStore;

use crate::config::ResolverConfig;

/// Merge the clusters rooted at `roots`, retrying retryable conflicts.
pub async fn execute_merge(
    store: &dyn ContactStore,
    roots: &BTreeSet<ContactId>,
    config: &ResolverConfig,
) -> ReconcileResult<MergeOutcome> {
    let max_attempts = config.attempts();
    let mut attempt = 1;

    loop {
        match store.merge_clusters(roots).await {
            Ok(outcome) => {
                if outcome.degenerate {
                    tracing::warn!(
                        survivor = %outcome.survivor.id,
                        roots = ?roots,
                        "No live primary among merge candidates; promoted the oldest row"
                    );
                }
                tracing::info!(
                    survivor = %outcome.survivor.id,
                    demoted = ?outcome.demoted,
                    repointed = outcome.repointed,
                    attempt,
                    "Merged contact clusters"
                );
                return Ok(outcome);
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "Merge transaction conflicted, retrying"
                );
                let backoff = config.merge_retry_backoff * attempt;
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
                attempt += 1;
            }
            Err(ReconcileError::TransactionFailure { source, .. }) => {
                tracing::error!(attempt, error = %source, "Merge transaction failed");
                return Err(ReconcileError::TransactionFailure {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => return Err(err),
        }
    }
}
