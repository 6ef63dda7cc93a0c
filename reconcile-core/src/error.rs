//! Error types for reconciliation operations

use crate::ContactId;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    /// Serialization failure or deadlock; the transaction may be retried.
    #[error("Transaction conflict: {reason}")]
    Conflict { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Query failed: {reason}")]
    Query { reason: String },

    /// No pooled connection became free before the wait timeout.
    #[error("Connection pool exhausted: {reason}")]
    PoolExhausted { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

/// Request validation errors, raised before the engine runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Either email or phoneNumber (or both) must be present in the request body")]
    MissingIdentifiers,

    #[error("At least one of email or phoneNumber must have a non-empty value")]
    EmptyIdentifiers,
}

/// The contact graph cannot be traced to a consistent primary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InconsistencyError {
    #[error("Matched contacts {match_ids:?} cannot be traced to any primary")]
    NoImplicatedPrimary { match_ids: Vec<ContactId> },

    #[error("Primary contact {id} not found or deleted")]
    PrimaryMissing { id: ContactId },

    #[error("Contact {id} is referenced as a primary but is not one")]
    NotPrimary { id: ContactId },

    #[error("No live merge candidates among {ids:?}")]
    EmptyMergeCandidates { ids: Vec<ContactId> },
}

/// Master error type for identity resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Inconsistent state: {0}")]
    InconsistentState(#[from] InconsistencyError),

    #[error("Transaction failed after {attempts} attempt(s): {source}")]
    TransactionFailure { attempts: u32, source: StorageError },

    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl ReconcileError {
    /// Whether re-running the failed transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::TransactionFailure { source, .. } if source.is_retryable())
    }
}

impl From<StorageError> for ReconcileError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable { reason } => ReconcileError::StoreUnavailable { reason },
            StorageError::Conflict { .. } | StorageError::TransactionFailed { .. } => {
                ReconcileError::TransactionFailure {
                    attempts: 1,
                    source: err,
                }
            }
            other => ReconcileError::Storage(other),
        }
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

// =============================================================================
// TESTS
// =============================================================================
