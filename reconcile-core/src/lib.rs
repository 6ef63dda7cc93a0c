//! Reconcile Core - Contact Types
//!
//! Pure data structures and pure functions shared by every other crate:
//! the `Contact` row, normalized request identifiers, the per-request
//! cluster adjacency index, merge planning, and the error taxonomy.
//! Nothing in this crate performs I/O.

pub mod cluster_index;
pub mod consolidated;
pub mod contact;
pub mod error;
pub mod identifiers;
pub mod merge;

pub use cluster_index::ClusterIndex;
pub use consolidated::ConsolidatedContact;
pub use contact::{
    oldest_first, Contact, ContactId, LinkPrecedence, LinkPrecedenceParseError, NewContact,
    Timestamp,
};
pub use error::{
    InconsistencyError, ReconcileError, ReconcileResult, StorageError, StorageResult,
    ValidationError,
};
pub use identifiers::Identifiers;
pub use merge::{plan_merge, MergeOutcome, MergePlan, MergeStep};
