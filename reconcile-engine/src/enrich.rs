//! Enrichment Writer: record a new identifier combination as a secondary.

use reconcile_core::{Contact, Identifiers, ReconcileResult};
use reconcile_storage::ContactStore;

/// Whether the request brings a combination the cluster has not seen.
///
/// A row is only written when no cluster member already carries the exact
/// `(email, phone)` pair and the request actually connects to the matched
/// rows through at least one shared identifier.
pub fn needs_enrichment(cluster: &[Contact], matches: &[Contact], identifiers: &Identifiers) -> bool {
    let (email, phone) = (identifiers.email(), identifiers.phone_number());

    if cluster.iter().any(|c| c.has_pair(email, phone)) {
        return false;
    }
    matches.iter().any(|c| c.shares_identifier(email, phone))
}

/// Insert a secondary under `primary` when the request warrants one.
///
/// The new row is appended to `cluster`. Returns `None` when nothing was
/// written, including the case where a concurrent request wrote the same
/// pair first.
pub async fn enrich(
    store: &dyn ContactStore,
    primary: &Contact,
    cluster: &mut Vec<Contact>,
    matches: &[Contact],
    identifiers: &Identifiers,
) -> ReconcileResult<Option<Contact>> {
    if !needs_enrichment(cluster, matches, identifiers) {
        return Ok(None);
    }

    match store.insert_secondary(primary.id, identifiers).await? {
        Some(created) => {
            tracing::info!(
                contact_id = %created.id,
                primary_id = %primary.id,
                "Recorded new identifier combination"
            );
            cluster.push(created.clone());
            Ok(Some(created))
        }
        None => {
            tracing::debug!(primary_id = %primary.id, "Identifier pair already recorded");
            Ok(None)
        }
    }
}
