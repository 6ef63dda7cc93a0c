//! Reconcile Engine - Identity Resolution
//!
//! Turns one `(email, phone)` observation into the consolidated view of the
//! identity it belongs to. A request flows through five stages:
//!
//! 1. [`matcher`] finds every live row sharing an identifier.
//! 2. [`cluster`] works out which primaries those rows implicate.
//! 3. [`merge`] collapses several implicated clusters into the oldest one.
//! 4. [`enrich`] records a new identifier combination as a secondary.
//! 5. [`response`] flattens the final cluster.
//!
//! A request that matches nothing takes the new-identity path instead and
//! inserts a fresh primary.

pub mod cluster;
pub mod config;
pub mod enrich;
pub mod matcher;
pub mod merge;
pub mod response;

pub use cluster::ResolvedPrimary;
pub use config::ResolverConfig;

use std::sync::Arc;

use reconcile_core::{
    ConsolidatedContact, Contact, Identifiers, InconsistencyError, ReconcileError,
    ReconcileResult,
};
use reconcile_storage::ContactStore;

/// Runs the identify pipeline against a contact store.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn ContactStore>,
    config: ResolverConfig,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn ContactStore>, config: ResolverConfig) -> Self {
        Self { store, config }
    }

    /// Resolver with default retry settings.
    pub fn with_store(store: Arc<dyn ContactStore>) -> Self {
        Self::new(store, ResolverConfig::default())
    }

    pub fn store(&self) -> &Arc<dyn ContactStore> {
        &self.store
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve one observation to its consolidated identity.
    ///
    /// When a concurrent merge demotes the resolved primary before its
    /// cluster is loaded or enriched, the pipeline is re-run from the match
    /// step, up to `max_resolution_passes` times.
    #[tracing::instrument(
        name = "identify",
        skip_all,
        fields(
            has_email = identifiers.email().is_some(),
            has_phone = identifiers.phone_number().is_some(),
        )
    )]
    pub async fn identify(&self, identifiers: &Identifiers) -> ReconcileResult<ConsolidatedContact> {
        let max_passes = self.config.passes();
        let mut pass = 1;

        loop {
            match self.resolve_once(identifiers).await? {
                Pass::Resolved(view) => return Ok(view),
                Pass::Stale(err) if pass < max_passes => {
                    tracing::warn!(pass, max_passes, error = %err, "Cluster moved during resolution, retrying");
                    pass += 1;
                }
                Pass::Stale(ReconcileError::TransactionFailure { source, .. }) => {
                    return Err(ReconcileError::TransactionFailure {
                        attempts: pass,
                        source,
                    });
                }
                Pass::Stale(err) => return Err(err),
            }
        }
    }

    async fn resolve_once(&self, identifiers: &Identifiers) -> ReconcileResult<Pass> {
        let store = self.store.as_ref();
        let matches = matcher::find_matches(store, identifiers).await?;

        if matches.is_empty() {
            let created = store.insert_primary(identifiers).await?;
            tracing::info!(contact_id = %created.id, "Created new primary contact");
            return Ok(Pass::Resolved(response::consolidate(
                &created,
                std::slice::from_ref(&created),
            )));
        }

        let resolved = match cluster::resolve_primary(store, &matches, &self.config).await {
            Ok(resolved) => resolved,
            Err(err) if is_stale(&err) => return Ok(Pass::Stale(err)),
            Err(err) => return Err(err),
        };

        let mut members = store.load_cluster(resolved.primary.id).await?;
        let primary = match current_primary(&resolved.primary, &members) {
            Ok(primary) => primary,
            Err(err) => return Ok(Pass::Stale(err)),
        };

        match enrich::enrich(store, &primary, &mut members, &matches, identifiers).await {
            Ok(_) => {}
            Err(err) if err.is_retryable() => return Ok(Pass::Stale(err)),
            Err(err) => return Err(err),
        }

        let view = response::consolidate(&primary, &members);
        tracing::debug!(
            primary_id = %view.primary_contact_id,
            secondaries = view.secondary_contact_ids.len(),
            merged = resolved.merge.is_some(),
            "Resolved identity"
        );
        Ok(Pass::Resolved(view))
    }
}

/// Outcome of one pipeline pass.
enum Pass {
    Resolved(ConsolidatedContact),
    /// The graph moved under this pass; holds the error to report if no
    /// pass succeeds.
    Stale(ReconcileError),
}

/// A resolved primary that was demoted or removed after it was read.
fn is_stale(err: &ReconcileError) -> bool {
    matches!(
        err,
        ReconcileError::InconsistentState(
            InconsistencyError::NotPrimary { .. } | InconsistencyError::PrimaryMissing { .. }
        )
    )
}

/// The freshly loaded primary row heading `members`.
fn current_primary(resolved: &Contact, members: &[Contact]) -> ReconcileResult<Contact> {
    match members.first() {
        Some(head) if head.id == resolved.id && head.is_primary() => Ok(head.clone()),
        Some(head) if head.id == resolved.id => {
            Err(InconsistencyError::NotPrimary { id: head.id }.into())
        }
        _ => Err(InconsistencyError::PrimaryMissing { id: resolved.id }.into()),
    }
}
