//! Error types shared across the engine and its collaborators.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{ProductId, Session, SessionId, SessionStatus, TapId, ZoneId};

/// Reasons an observation is rejected before it reaches session storage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Sealed unit counts cannot be negative.
    #[error("backup units must be >= 0, got {0}")]
    NegativeBackupUnits(i64),

    /// Open-container fraction outside 0..=1 or not a number.
    #[error("partial fraction must be within [0, 1], got {0}")]
    FractionOutOfRange(f64),

    /// Tapped keg fill comes from the level sensor only.
    #[error("volume-sold products cannot carry a manual partial fraction ({0})")]
    ManualKegFill(f64),

    /// Taps only make sense for keg products.
    #[error("unit-sold products cannot list taps")]
    TapsOnUnitProduct,

    /// The same tap was listed twice.
    #[error("tap {0} listed more than once")]
    DuplicateTap(TapId),

    /// Product resolver returned a nonsensical container size.
    #[error("container size must be positive, got {0} ml")]
    InvalidContainerSize(f64),
}

/// Errors from the external stock store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store could not be reached or the write failed; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A compare-and-swap precondition failed; the whole batch was rejected.
    #[error("stock for {product_id} changed concurrently (expected {expected:?}, found {actual:?})")]
    Conflict {
        /// Product whose record moved
        product_id: ProductId,
        /// `last_modified_at` the write was planned against
        expected: Option<DateTime<Utc>>,
        /// `last_modified_at` currently stored
        actual: Option<DateTime<Utc>>,
    },
}

/// Errors from the keg level sensor integration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// The sensor has no reading for the tap.
    #[error("no keg level reading for tap {0}")]
    Unavailable(TapId),
}

/// Errors from the product resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// Product is unknown.
    #[error("product not found: {0}")]
    NotFound(ProductId),

    /// Lookup backend failed.
    #[error("product lookup failed: {0}")]
    Unavailable(String),
}

/// Errors from the session repository.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    /// Another session is already in progress for the actor and mode.
    #[error("session {} already in progress", .0.id)]
    ActiveSessionExists(Box<Session>),

    /// Session id is unknown.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Status compare-and-swap failed.
    #[error("session {session_id} is {actual}, expected {expected}")]
    StatusMismatch {
        /// Target session
        session_id: SessionId,
        /// Status the caller expected
        expected: SessionStatus,
        /// Status actually stored
        actual: SessionStatus,
    },

    /// Backend failure.
    #[error("repository error: {0}")]
    Backend(String),
}

/// Caller-facing errors from the inventory engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A session is already in progress for this actor and mode.
    #[error("actor already has session {} in progress", .existing.id)]
    SessionConflict {
        /// The session that blocks the new one
        existing: Box<Session>,
    },

    /// Session id is unknown.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Zone has not been registered.
    #[error("zone not found: {0}")]
    ZoneNotFound(ZoneId),

    /// Operation requires an in-progress session.
    #[error("session {session_id} is {status}, not in progress")]
    SessionNotActive {
        /// Target session
        session_id: SessionId,
        /// Its current status
        status: SessionStatus,
    },

    /// Observation failed validation; session untouched.
    #[error("invalid observation: {0}")]
    InvalidObservation(#[from] ValidationError),

    /// Product could not be resolved.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// A collaborator was unreachable; the operation can be retried.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Stock kept moving under reconciliation past the retry budget.
    #[error("reconciliation gave up after {attempts} conflicting attempts")]
    ReconciliationExhausted {
        /// Number of planning attempts made
        attempts: usize,
    },

    /// Session repository failure.
    #[error("repository error: {0}")]
    Repository(String),
}

impl EngineError {
    /// Returns `true` when retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::ReconciliationExhausted { .. } | Self::Repository(_)
        )
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::ActiveSessionExists(existing) => Self::SessionConflict { existing },
            RepositoryError::SessionNotFound(id) => Self::SessionNotFound(id),
            RepositoryError::StatusMismatch {
                session_id, actual, ..
            } => Self::SessionNotActive {
                session_id,
                status: actual,
            },
            RepositoryError::Backend(msg) => Self::Repository(msg),
        }
    }
}

impl From<ResolverError> for EngineError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::NotFound(id) => Self::ProductNotFound(id),
            ResolverError::Unavailable(msg) => Self::StoreUnavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mismatch_maps_to_session_not_active() {
        let id = SessionId::new();
        let err: EngineError = RepositoryError::StatusMismatch {
            session_id: id,
            expected: SessionStatus::InProgress,
            actual: SessionStatus::Cancelled,
        }
        .into();
        assert_eq!(
            err,
            EngineError::SessionNotActive {
                session_id: id,
                status: SessionStatus::Cancelled
            }
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn validation_error_display() {
        let err = EngineError::from(ValidationError::FractionOutOfRange(1.5));
        assert!(err.to_string().contains("1.5"));
    }
}
