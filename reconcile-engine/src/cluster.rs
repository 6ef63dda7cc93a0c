//! Cluster Resolver: the set of primaries a request implicates and the one
//! that survives.

use std::collections::BTreeSet;

use reconcile_core::{
    ClusterIndex, Contact, ContactId, InconsistencyError, MergeOutcome, ReconcileResult,
};
use reconcile_storage::ContactStore;

use crate::config::ResolverConfig;
use crate::merge;

/// The primary that owns the request after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrimary {
    pub primary: Contact,
    /// Set when more than one cluster was implicated and had to be merged.
    pub merge: Option<MergeOutcome>,
}

/// Roots of every cluster touched by `matches`.
///
/// A match that is itself primary contributes its own id, a secondary
/// contributes its `linked_id`. Rows with neither are skipped. Fails when
/// nothing remains.
pub fn implicated_primaries(matches: &[Contact]) -> ReconcileResult<BTreeSet<ContactId>> {
    let index = ClusterIndex::build(matches);
    if !index.orphans().is_empty() {
        tracing::warn!(
            orphans = ?index.orphans(),
            "Matched contacts with no cluster root"
        );
    }

    let roots = index.roots();
    if roots.is_empty() {
        return Err(InconsistencyError::NoImplicatedPrimary {
            match_ids: matches.iter().map(|c| c.id).collect(),
        }
        .into());
    }
    Ok(roots)
}

/// Resolve the surviving primary for a non-empty match set, merging
/// clusters when several are implicated.
pub async fn resolve_primary(
    store: &dyn ContactStore,
    matches: &[Contact],
    config: &ResolverConfig,
) -> ReconcileResult<ResolvedPrimary> {
    let roots = implicated_primaries(matches)?;

    if roots.len() > 1 {
        let outcome = merge::execute_merge(store, &roots, config).await?;
        return Ok(ResolvedPrimary {
            primary: outcome.survivor.clone(),
            merge: Some(outcome),
        });
    }

    let root = roots
        .into_iter()
        .next()
        .ok_or(InconsistencyError::NoImplicatedPrimary { match_ids: Vec::new() })?;

    // The row is already in hand when a match is the primary itself.
    if let Some(direct) = matches.iter().find(|c| c.id == root && c.is_primary()) {
        return Ok(ResolvedPrimary {
            primary: direct.clone(),
            merge: None,
        });
    }

    let primary = store
        .get_live(root)
        .await?
        .ok_or(InconsistencyError::PrimaryMissing { id: root })?;
    if !primary.is_primary() {
        return Err(InconsistencyError::NotPrimary { id: root }.into());
    }

    Ok(ResolvedPrimary {
        primary,
        merge: None,
    })
}
