//! Async contact store trait.
//!
//! Every read and write the resolution engine performs goes through this
//! trait. Implementations must honor the live-row filter (`deleted_at IS
//! NULL`) on every query and must run `merge_clusters` as one atomic
//! transaction.

use ::async_trait::async_trait;
use reconcile_core::{Contact, ContactId, Identifiers, MergeOutcome, ReconcileResult};
use std::collections::BTreeSet;

#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Live rows whose email equals the request email (if any) or whose phone
    /// equals the request phone (if any), oldest first.
    async fn find_matches(&self, identifiers: &Identifiers) -> ReconcileResult<Vec<Contact>>;

    /// Get a live row by id.
    async fn get_live(&self, id: ContactId) -> ReconcileResult<Option<Contact>>;

    /// The primary row plus every live row linked to it.
    ///
    /// The primary comes first, the rest are oldest first.
    async fn load_cluster(&self, primary: ContactId) -> ReconcileResult<Vec<Contact>>;

    /// Insert a brand-new primary carrying the request identifiers.
    async fn insert_primary(&self, identifiers: &Identifiers) -> ReconcileResult<Contact>;

    /// Insert a secondary of `primary` carrying the request identifiers.
    ///
    /// The primary row is locked while the cluster is re-checked for the
    /// exact (email, phone) pair; returns `None` when the pair already
    /// exists. Fails with a retryable conflict when `primary` is no longer a
    /// live primary.
    async fn insert_secondary(
        &self,
        primary: ContactId,
        identifiers: &Identifiers,
    ) -> ReconcileResult<Option<Contact>>;

    /// Collapse the clusters rooted at `roots` into one, atomically.
    ///
    /// Candidate rows are locked, expanded to the current roots of any that
    /// were demoted concurrently, planned with `reconcile_core::plan_merge`
    /// and mutated in a single transaction.
    async fn merge_clusters(&self, roots: &BTreeSet<ContactId>) -> ReconcileResult<MergeOutcome>;

    /// Cheap connectivity probe.
    async fn health_check(&self) -> ReconcileResult<()>;
}
