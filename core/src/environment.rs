//! Collaborator traits injected into the engine.
//!
//! All external dependencies are abstracted behind traits so the engine can run
//! against production backends or the in-memory doubles in
//! `taproom-inventory-testing`.
//!
//! # Dyn Compatibility
//!
//! Async operations return `Pin<Box<dyn Future>>` instead of using `async fn`
//! so the collaborators can be held as `Arc<dyn Trait>`.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::error::{ObserverError, RepositoryError, ResolverError, StoreError};
use crate::reconcile::{CompletionReport, ReconciliationReport};
use crate::types::{
    ActorId, Count, KegRecord, ModeTag, ProductId, ProductType, RecordOutcome, Session, SessionId,
    SessionStatus, StockRecord, StockUpdate, TapId, Zone, ZoneId,
};

/// Boxed future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The shared stock record, also written by receiving and sales sync.
///
/// # Optimistic Concurrency
///
/// Every [`StockUpdate`] carries the `last_modified_at` it was planned
/// against. `apply_stock_batch` must apply all updates or none; if any
/// precondition fails the whole batch is rejected with
/// [`StoreError::Conflict`].
///
/// # Batch Identity
///
/// A batch is tagged with the session it reconciles. The store records the
/// tag atomically with the writes and ignores a batch whose tag it has
/// already applied, so a completion retried after its batch landed cannot
/// correct stock twice.
pub trait Store: Send + Sync {
    /// Current stock for a unit-sold product, `None` if it has no record yet.
    fn get_stock(&self, product_id: &ProductId)
    -> BoxFuture<'_, Result<Option<StockRecord>, StoreError>>;

    /// Atomically apply a batch of compare-and-swap writes.
    ///
    /// Returns `Ok(())` without writing if `batch_id` was already applied.
    fn apply_stock_batch(
        &self,
        batch_id: SessionId,
        updates: Vec<StockUpdate>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Returns `true` if a batch tagged `batch_id` has been applied.
    fn batch_applied(&self, batch_id: SessionId) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Keg records for a volume-sold product.
    fn get_keg_records(
        &self,
        product_id: &ProductId,
    ) -> BoxFuture<'_, Result<Vec<KegRecord>, StoreError>>;
}

/// Resolves a product's accounting model. Never mutated by the engine.
pub trait ProductResolver: Send + Sync {
    /// Product classification and container size.
    fn get_product_type(
        &self,
        product_id: &ProductId,
    ) -> BoxFuture<'_, Result<ProductType, ResolverError>>;
}

/// Keg level sensor integration. Never mutated by the engine.
pub trait KegLevelObserver: Send + Sync {
    /// Fraction remaining in the keg on a tap, 0..=1.
    fn current_fill_fraction(&self, tap_id: &TapId) -> BoxFuture<'_, Result<f64, ObserverError>>;
}

/// Persistence for sessions and counts owned by the engine.
///
/// Sessions and counts are append-only apart from status transitions.
/// Implementations enforce the invariants atomically:
///
/// - at most one in-progress session per `(actor, mode)`;
/// - counts are written only while their session is in progress;
/// - one current count per `(session, product)`, ordered by `observed_at`;
/// - an idempotency key is applied at most once per session.
pub trait SessionRepository: Send + Sync {
    /// Register a counting zone.
    fn register_zone(&self, zone: Zone) -> BoxFuture<'_, Result<(), RepositoryError>>;

    /// Look up a zone.
    fn zone(&self, zone_id: &ZoneId) -> BoxFuture<'_, Result<Option<Zone>, RepositoryError>>;

    /// Insert a new in-progress session.
    ///
    /// Fails with [`RepositoryError::ActiveSessionExists`] if the actor already
    /// has one in progress for the same mode.
    fn create_session(&self, session: Session) -> BoxFuture<'_, Result<(), RepositoryError>>;

    /// Load a session.
    fn session(&self, id: SessionId) -> BoxFuture<'_, Result<Option<Session>, RepositoryError>>;

    /// The in-progress session for an actor and mode, if any.
    fn active_session(
        &self,
        actor_id: &ActorId,
        mode: ModeTag,
    ) -> BoxFuture<'_, Result<Option<Session>, RepositoryError>>;

    /// Move a session from `from` to `to`, stamping `completed_at`.
    ///
    /// Fails with [`RepositoryError::StatusMismatch`] if the stored status is
    /// not `from`.
    fn transition(
        &self,
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        at: DateTime<Utc>,
        report: Option<CompletionReport>,
    ) -> BoxFuture<'_, Result<Session, RepositoryError>>;

    /// Record the reconciliation about to be sent to the store, replacing any
    /// earlier plan for the session.
    fn stage_reconciliation(
        &self,
        id: SessionId,
        report: ReconciliationReport,
    ) -> BoxFuture<'_, Result<(), RepositoryError>>;

    /// Last reconciliation staged for a session.
    fn staged_reconciliation(
        &self,
        id: SessionId,
    ) -> BoxFuture<'_, Result<Option<ReconciliationReport>, RepositoryError>>;

    /// Completion report stored for a completed session.
    fn completion_report(
        &self,
        id: SessionId,
    ) -> BoxFuture<'_, Result<Option<CompletionReport>, RepositoryError>>;

    /// Insert or supersede the count for `(session, product)`.
    fn upsert_count(&self, count: Count) -> BoxFuture<'_, Result<RecordOutcome, RepositoryError>>;

    /// Current counts of a session.
    fn counts(&self, session_id: SessionId) -> BoxFuture<'_, Result<Vec<Count>, RepositoryError>>;

    /// Superseded counts of a session, oldest first.
    fn count_history(
        &self,
        session_id: SessionId,
    ) -> BoxFuture<'_, Result<Vec<Count>, RepositoryError>>;
}
