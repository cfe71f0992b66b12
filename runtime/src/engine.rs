//! The inventory counting engine.
//!
//! [`InventoryEngine`] is the caller-facing entry point: it runs the session
//! lifecycle, records counts into session-scoped storage and, on completion,
//! reconciles them into live stock with optimistic concurrency.
//!
//! # Concurrency
//!
//! Lifecycle and count operations for one session are serialised through a
//! per-session async lock, so a `cancel` can never interleave with the
//! reconciliation batch of a `complete`, and no count can slip in after
//! completion has read the session's counts. Different sessions run
//! independently; conflicts between them, and with receiving or sales sync,
//! are caught by the `last_modified_at` compare-and-swap on each stock write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use taproom_inventory_core::accounting::{self, ProductAccounting, TapFill, recorded_keg_level};
use taproom_inventory_core::environment::{
    Clock, KegLevelObserver, ProductResolver, SessionRepository, Store,
};
use taproom_inventory_core::reconcile::{
    self, CompletionReport, ReconciliationReport, SkippedTap,
};
use taproom_inventory_core::session::{LifecycleCommand, Transition, decide, ensure_active};
use taproom_inventory_core::variance::{self, VarianceItem};
use taproom_inventory_core::{
    ActorId, Count, EngineError, IdempotencyKey, KegRecord, ModeTag, Observation, ProductId,
    ProductType, RecordOutcome, Session, SessionId, SessionStatus, StockLevel, StockRecord,
    StoreError, TapId, Zone, ZoneId,
};
use tokio::sync::OwnedMutexGuard;

use crate::config::EngineConfig;
use crate::retry::{RetryPolicy, retry_with_predicate};

/// Collaborators the engine depends on.
///
/// Everything external is injected here so the engine runs unchanged against
/// production backends or in-memory doubles.
#[derive(Clone)]
pub struct InventoryEnvironment {
    /// Shared stock and keg records
    pub store: Arc<dyn Store>,
    /// Product classification
    pub products: Arc<dyn ProductResolver>,
    /// Keg level sensors
    pub keg_levels: Arc<dyn KegLevelObserver>,
    /// Sessions and counts
    pub sessions: Arc<dyn SessionRepository>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InventoryEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryEnvironment").finish_non_exhaustive()
    }
}

/// A count submission.
///
/// Online submissions usually leave `idempotency_key` empty; offline replays
/// always carry the key generated when the entry was queued.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordCount {
    /// Target session
    pub session_id: SessionId,
    /// Counted product
    pub product_id: ProductId,
    /// What the operator entered
    pub observation: Observation,
    /// When the operator made the observation
    pub observed_at: DateTime<Utc>,
    /// Client-generated key making retries and replays no-ops
    pub idempotency_key: Option<IdempotencyKey>,
}

impl RecordCount {
    /// Submission without an idempotency key
    #[must_use]
    pub const fn new(
        session_id: SessionId,
        product_id: ProductId,
        observation: Observation,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            product_id,
            observation,
            observed_at,
            idempotency_key: None,
        }
    }

    /// Attach an idempotency key
    #[must_use]
    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

/// Taproom inventory counting engine.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use taproom_inventory_core::{ActorId, ModeTag, Observation, ProductId, Zone, ZoneId};
/// use taproom_inventory_runtime::{EngineConfig, InventoryEngine, InventoryEnvironment};
/// use taproom_inventory_testing::{
///     InMemorySessionRepository, InMemoryStore, ScriptedKegObserver, StaticProductResolver,
///     test_clock,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let clock = Arc::new(test_clock());
/// let engine = InventoryEngine::new(
///     InventoryEnvironment {
///         store: Arc::new(InMemoryStore::new(clock.clone())),
///         products: Arc::new(StaticProductResolver::new().with_bottle("house-gin", 750.0)),
///         keg_levels: Arc::new(ScriptedKegObserver::new()),
///         sessions: Arc::new(InMemorySessionRepository::new()),
///         clock,
///     },
///     EngineConfig::default(),
/// );
///
/// engine.register_zone(Zone::new("back-bar", "Back Bar")).await?;
/// let session = engine
///     .start_session(ActorId::new("sam"), ZoneId::new("back-bar"), ModeTag::Production)
///     .await?;
/// engine
///     .record_count(session.id, ProductId::new("house-gin"), Observation::units(10, 0.5))
///     .await?;
/// let report = engine.complete_session(session.id).await?;
/// assert_eq!(report.reconciliation.products.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct InventoryEngine {
    env: InventoryEnvironment,
    config: EngineConfig,
    retry: RetryPolicy,
    session_locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for InventoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InventoryEngine {
    /// Create an engine over the given collaborators
    #[must_use]
    pub fn new(env: InventoryEnvironment, config: EngineConfig) -> Self {
        let retry = config.store_retry.policy();
        Self {
            env,
            config,
            retry,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the store retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Make a zone available for counting. Registering an existing zone is a no-op.
    ///
    /// # Errors
    ///
    /// [`EngineError::Repository`] if the repository fails.
    pub async fn register_zone(&self, zone: Zone) -> Result<(), EngineError> {
        tracing::debug!(zone_id = %zone.id, "Registering zone");
        self.env.sessions.register_zone(zone).await?;
        Ok(())
    }

    /// Start a counting session.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ZoneNotFound`] for an unknown zone
    /// - [`EngineError::SessionConflict`] if the actor already has a session
    ///   in progress in this mode; the error carries that session
    #[tracing::instrument(skip(self), fields(session_id))]
    pub async fn start_session(
        &self,
        actor_id: ActorId,
        zone_id: ZoneId,
        mode: ModeTag,
    ) -> Result<Session, EngineError> {
        if self.env.sessions.zone(&zone_id).await?.is_none() {
            return Err(EngineError::ZoneNotFound(zone_id));
        }

        let session = Session::start(actor_id, zone_id, mode, self.env.clock.now());
        if let Err(err) = self.env.sessions.create_session(session.clone()).await {
            let err = EngineError::from(err);
            if let EngineError::SessionConflict { existing } = &err {
                tracing::info!(existing = %existing.id, "Actor already has a session in progress");
            }
            return Err(err);
        }

        tracing::Span::current().record("session_id", tracing::field::display(session.id));
        tracing::info!(started_at = %session.started_at, "Session started");
        metrics::counter!("inventory.sessions.started", "mode" => mode.as_str()).increment(1);
        Ok(session)
    }

    /// Record an observation made now.
    ///
    /// # Errors
    ///
    /// See [`submit_count`](Self::submit_count).
    pub async fn record_count(
        &self,
        session_id: SessionId,
        product_id: ProductId,
        observation: Observation,
    ) -> Result<RecordOutcome, EngineError> {
        let observed_at = self.env.clock.now();
        self.submit_count(RecordCount::new(session_id, product_id, observation, observed_at))
            .await
    }

    /// Record a count into session-scoped storage.
    ///
    /// Live stock is never touched here. The count replaces any earlier count
    /// for the same product unless it is older, and a submission whose
    /// idempotency key was already applied is a no-op.
    ///
    /// The expected level is snapshotted when a product is first counted in
    /// the session; later counts of the same product keep that baseline so the
    /// correction applied at completion stays relative to it.
    ///
    /// # Errors
    ///
    /// - [`EngineError::SessionNotFound`] / [`EngineError::SessionNotActive`]
    /// - [`EngineError::ProductNotFound`]
    /// - [`EngineError::InvalidObservation`]; the session is untouched
    /// - [`EngineError::StoreUnavailable`] if the expected level cannot be read
    #[tracing::instrument(
        skip(self, request),
        fields(session_id = %request.session_id, product_id = %request.product_id)
    )]
    pub async fn submit_count(&self, request: RecordCount) -> Result<RecordOutcome, EngineError> {
        let (_guard, session) = self.lock_session(request.session_id).await?;
        ensure_active(&session)?;

        let product = self.env.products.get_product_type(&request.product_id).await?;
        accounting::validate(&request.observation, &product)?;

        let fills = self.read_tap_fills(&request.observation, &product).await;
        let accounting = accounting::translate(&request.observation, &product, &fills)?;

        let expected = self
            .expected_level(session.id, &request.product_id, &product)
            .await?;

        let outcome = self
            .env
            .sessions
            .upsert_count(Count {
                session_id: session.id,
                product_id: request.product_id,
                observation: request.observation,
                accounting,
                expected,
                observed_at: request.observed_at,
                idempotency_key: request.idempotency_key,
                version: 0,
            })
            .await?;

        match &outcome {
            RecordOutcome::Inserted(count) | RecordOutcome::Replaced(count) => {
                tracing::debug!(
                    version = count.version,
                    observed = count.observed_units(),
                    expected = count.expected_units(),
                    "Count recorded"
                );
                metrics::counter!("inventory.counts.recorded").increment(1);
            },
            RecordOutcome::Duplicate(_) => {
                tracing::debug!("Idempotency key already applied");
                metrics::counter!("inventory.counts.duplicate").increment(1);
            },
            RecordOutcome::Outdated(current) => {
                tracing::debug!(current_observed_at = %current.observed_at, "Newer count already recorded");
            },
        }
        Ok(outcome)
    }

    /// Variance of the session's current counts, for review before completing.
    ///
    /// # Errors
    ///
    /// [`EngineError::SessionNotFound`] or a repository failure.
    pub async fn preview_variance(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<VarianceItem>, EngineError> {
        self.load_session(session_id).await?;
        let counts = self.env.sessions.counts(session_id).await?;
        Ok(variance::report(&counts, &self.config.variance))
    }

    /// Complete a session and reconcile its counts into live stock.
    ///
    /// All stock writes land in one atomic batch. If the batch conflicts with
    /// a concurrent writer the plan is rebuilt from fresh reads, up to
    /// `max_cas_attempts` times. Completing an already completed session
    /// returns the report persisted the first time.
    ///
    /// The planned reconciliation is staged with the session before its batch
    /// is sent, and the batch is tagged with the session id. If the batch
    /// landed but the session could not be marked completed, a retry finds
    /// the batch already applied and finishes with the staged report instead
    /// of correcting stock a second time.
    ///
    /// # Errors
    ///
    /// - [`EngineError::SessionNotActive`] if the session was cancelled
    /// - [`EngineError::StoreUnavailable`] or
    ///   [`EngineError::ReconciliationExhausted`]; nothing was written and the
    ///   session is still in progress, so completion can be retried
    /// - [`EngineError::Repository`]; completion can be retried, and stock
    ///   already written is not written again
    #[tracing::instrument(skip(self))]
    pub async fn complete_session(
        &self,
        session_id: SessionId,
    ) -> Result<CompletionReport, EngineError> {
        let (_guard, session) = self.lock_session(session_id).await?;
        if let Transition::AlreadyDone(_) = decide(&session, LifecycleCommand::Complete)? {
            tracing::debug!("Session already completed");
            return self
                .env
                .sessions
                .completion_report(session_id)
                .await?
                .ok_or_else(|| {
                    EngineError::Repository(format!("completed session {session_id} has no report"))
                });
        }

        let counts = self.env.sessions.counts(session_id).await?;
        let variance = variance::report(&counts, &self.config.variance);
        let reconciliation = self.reconcile(&session, &counts).await?;

        let report = CompletionReport {
            session: session.clone(),
            variance,
            reconciliation,
        };
        let completed = self
            .env
            .sessions
            .transition(
                session_id,
                SessionStatus::InProgress,
                SessionStatus::Completed,
                self.env.clock.now(),
                Some(report.clone()),
            )
            .await?;
        self.release_session_lock(session_id);

        tracing::info!(
            counts = counts.len(),
            worst_variance = ?variance::worst(&report.variance),
            conflicts = report.reconciliation.conflicts().count(),
            needs_review = report.reconciliation.needs_review(),
            "Session completed"
        );
        metrics::counter!("inventory.sessions.completed", "mode" => session.mode.as_str())
            .increment(1);

        Ok(CompletionReport {
            session: completed,
            ..report
        })
    }

    /// Cancel a session. Its counts are kept for audit and never applied.
    ///
    /// Cancelling an already cancelled session returns it unchanged.
    ///
    /// # Errors
    ///
    /// [`EngineError::SessionNotActive`] if the session was completed.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_session(&self, session_id: SessionId) -> Result<Session, EngineError> {
        let (_guard, session) = self.lock_session(session_id).await?;
        if let Transition::AlreadyDone(_) = decide(&session, LifecycleCommand::Cancel)? {
            tracing::debug!("Session already cancelled");
            return Ok(session);
        }

        let cancelled = self
            .env
            .sessions
            .transition(
                session_id,
                SessionStatus::InProgress,
                SessionStatus::Cancelled,
                self.env.clock.now(),
                None,
            )
            .await?;
        self.release_session_lock(session_id);

        tracing::info!("Session cancelled");
        metrics::counter!("inventory.sessions.cancelled", "mode" => session.mode.as_str())
            .increment(1);
        Ok(cancelled)
    }

    /// Look up a session.
    ///
    /// # Errors
    ///
    /// [`EngineError::SessionNotFound`] or a repository failure.
    pub async fn session(&self, session_id: SessionId) -> Result<Session, EngineError> {
        self.load_session(session_id).await
    }

    /// The actor's in-progress session in `mode`, if any.
    ///
    /// # Errors
    ///
    /// Repository failure.
    pub async fn active_session(
        &self,
        actor_id: &ActorId,
        mode: ModeTag,
    ) -> Result<Option<Session>, EngineError> {
        Ok(self.env.sessions.active_session(actor_id, mode).await?)
    }

    /// Current count per product, ordered by product.
    ///
    /// # Errors
    ///
    /// Repository failure.
    pub async fn counts(&self, session_id: SessionId) -> Result<Vec<Count>, EngineError> {
        Ok(self.env.sessions.counts(session_id).await?)
    }

    /// Counts that were superseded within the session, oldest first.
    ///
    /// # Errors
    ///
    /// Repository failure.
    pub async fn count_history(&self, session_id: SessionId) -> Result<Vec<Count>, EngineError> {
        Ok(self.env.sessions.count_history(session_id).await?)
    }

    /// Report persisted when the session completed.
    ///
    /// # Errors
    ///
    /// Repository failure.
    pub async fn completion_report(
        &self,
        session_id: SessionId,
    ) -> Result<Option<CompletionReport>, EngineError> {
        Ok(self.env.sessions.completion_report(session_id).await?)
    }

    async fn load_session(&self, session_id: SessionId) -> Result<Session, EngineError> {
        self.env
            .sessions
            .session(session_id)
            .await?
            .ok_or(EngineError::SessionNotFound(session_id))
    }

    /// Load a session and, while it is in progress, hold its lock.
    ///
    /// Unknown and terminal sessions never get a lock entry: terminal
    /// sessions cannot change again, so callers only need the loaded state.
    async fn lock_session(
        &self,
        session_id: SessionId,
    ) -> Result<(Option<OwnedMutexGuard<()>>, Session), EngineError> {
        let session = self.load_session(session_id).await?;
        if session.status.is_terminal() {
            return Ok((None, session));
        }

        let guard = self.session_lock(session_id).lock_owned().await;
        let session = self.load_session(session_id).await?;
        if session.status.is_terminal() {
            // Finished while we waited.
            self.release_session_lock(session_id);
            return Ok((None, session));
        }
        Ok((Some(guard), session))
    }

    fn session_lock(&self, session_id: SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .session_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(session_id).or_default())
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.session_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // Terminal sessions never change again, so their lock is no longer needed.
    fn release_session_lock(&self, session_id: SessionId) {
        self.session_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session_id);
    }

    async fn read_tap_fills(
        &self,
        observation: &Observation,
        product: &ProductType,
    ) -> HashMap<TapId, TapFill> {
        let mut fills = HashMap::new();
        if !product.is_sold_by_volume {
            return fills;
        }
        for tap_id in &observation.tapped {
            let fill = match self.env.keg_levels.current_fill_fraction(tap_id).await {
                Ok(fraction) => TapFill::Observed(fraction),
                Err(err) => {
                    tracing::warn!(tap_id = %tap_id, error = %err, "Keg level unavailable, tap marked not observed");
                    TapFill::NotObserved
                },
            };
            fills.insert(tap_id.clone(), fill);
        }
        fills
    }

    async fn expected_level(
        &self,
        session_id: SessionId,
        product_id: &ProductId,
        product: &ProductType,
    ) -> Result<Option<StockLevel>, EngineError> {
        let counts = self.env.sessions.counts(session_id).await?;
        if let Some(existing) = counts.iter().find(|count| &count.product_id == product_id) {
            return Ok(existing.expected);
        }

        if product.is_sold_by_volume {
            let records = self.read_kegs(product_id).await?;
            return Ok(recorded_keg_level(&records));
        }
        Ok(self.read_stock(product_id).await?.map(|record| record.level))
    }

    async fn read_stock(&self, product_id: &ProductId) -> Result<Option<StockRecord>, EngineError> {
        retry_with_predicate(
            &self.retry,
            || self.env.store.get_stock(product_id),
            is_transient,
        )
        .await
        .map_err(store_unavailable)
    }

    async fn read_kegs(&self, product_id: &ProductId) -> Result<Vec<KegRecord>, EngineError> {
        retry_with_predicate(
            &self.retry,
            || self.env.store.get_keg_records(product_id),
            is_transient,
        )
        .await
        .map_err(store_unavailable)
    }

    async fn reconcile(
        &self,
        session: &Session,
        counts: &[Count],
    ) -> Result<ReconciliationReport, EngineError> {
        if let Some(staged) = self.env.sessions.staged_reconciliation(session.id).await? {
            let applied = retry_with_predicate(
                &self.retry,
                || self.env.store.batch_applied(session.id),
                is_transient,
            )
            .await
            .map_err(store_unavailable)?;
            if applied {
                tracing::info!(
                    attempts = staged.attempts,
                    "Stock batch already applied by an earlier attempt, keeping its plan"
                );
                return Ok(staged);
            }
        }

        let max_attempts = self.config.max_cas_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let mut report = self.plan(session, counts).await?;
            report.attempts = attempts;

            let updates = report.updates();
            if updates.is_empty() {
                return Ok(report);
            }

            self.env
                .sessions
                .stage_reconciliation(session.id, report.clone())
                .await?;
            let result = retry_with_predicate(
                &self.retry,
                || self.env.store.apply_stock_batch(session.id, updates.clone()),
                is_transient,
            )
            .await;

            match result {
                Ok(()) => {
                    tracing::info!(writes = updates.len(), attempts, "Stock batch applied");
                    return Ok(report);
                },
                Err(StoreError::Conflict { product_id, .. }) => {
                    metrics::counter!("inventory.reconcile.cas_retries").increment(1);
                    tracing::warn!(
                        product_id = %product_id,
                        attempts,
                        "Stock changed while reconciling, re-planning"
                    );
                    if attempts >= max_attempts {
                        return Err(EngineError::ReconciliationExhausted { attempts });
                    }
                },
                Err(err) => return Err(store_unavailable(err)),
            }
        }
    }

    async fn plan(
        &self,
        session: &Session,
        counts: &[Count],
    ) -> Result<ReconciliationReport, EngineError> {
        let mut report = ReconciliationReport::default();

        for count in counts {
            match &count.accounting {
                ProductAccounting::Bottle(bottle) => {
                    let current = self.read_stock(&count.product_id).await?;
                    let plan =
                        reconcile::plan_units(session.started_at, count, bottle, current.as_ref());
                    if plan.reconciled_with_conflict {
                        metrics::counter!("inventory.reconcile.conflicts").increment(1);
                        tracing::warn!(
                            product_id = %plan.product_id,
                            previous = ?plan.previous,
                            new_level = ?plan.new_level,
                            "Stock modified during the session, applying correction as a delta"
                        );
                    }
                    if plan.clamped {
                        tracing::warn!(product_id = %plan.product_id, "Corrected stock went negative, clamped to zero");
                    }
                    report.products.push(plan);
                },
                ProductAccounting::Keg(kegs) => {
                    let records = self.read_kegs(&count.product_id).await?;
                    if let Some(mismatch) = reconcile::check_kegs(&count.product_id, kegs, &records)
                    {
                        tracing::warn!(
                            product_id = %mismatch.product_id,
                            counted = mismatch.counted,
                            recorded = mismatch.recorded,
                            "On-deck keg headcount does not match keg records"
                        );
                        report.keg_mismatches.push(mismatch);
                    }
                    report
                        .skipped_taps
                        .extend(kegs.unobserved_taps().into_iter().map(|tap_id| SkippedTap {
                            product_id: count.product_id.clone(),
                            tap_id,
                        }));
                },
            }
        }
        Ok(report)
    }
}

const fn is_transient(err: &StoreError) -> bool {
    matches!(err, StoreError::Unavailable(_))
}

fn store_unavailable(err: StoreError) -> EngineError {
    match err {
        StoreError::Unavailable(message) => EngineError::StoreUnavailable(message),
        other => EngineError::StoreUnavailable(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use taproom_inventory_testing::{
        InMemorySessionRepository, InMemoryStore, ScriptedKegObserver, StaticProductResolver,
        test_clock,
    };

    async fn engine() -> InventoryEngine {
        let clock = Arc::new(test_clock());
        let engine = InventoryEngine::new(
            InventoryEnvironment {
                store: Arc::new(InMemoryStore::new(clock.clone())),
                products: Arc::new(StaticProductResolver::new().with_bottle("gin", 750.0)),
                keg_levels: Arc::new(ScriptedKegObserver::new()),
                sessions: Arc::new(InMemorySessionRepository::new()),
                clock,
            },
            EngineConfig::default(),
        );
        engine.register_zone(Zone::new("bar", "Bar")).await.unwrap();
        engine
    }

    #[tokio::test]
    async fn unknown_and_finished_sessions_leave_no_lock_behind() {
        let engine = engine().await;
        let gin = || ProductId::new("gin");

        let unknown = engine
            .record_count(SessionId::new(), gin(), Observation::units(1, 0.0))
            .await;
        assert!(matches!(unknown, Err(EngineError::SessionNotFound(_))));
        assert_eq!(engine.tracked_locks(), 0);

        let session = engine
            .start_session(ActorId::new("sam"), ZoneId::new("bar"), ModeTag::Production)
            .await
            .unwrap();
        engine
            .record_count(session.id, gin(), Observation::units(1, 0.0))
            .await
            .unwrap();
        assert_eq!(engine.tracked_locks(), 1);

        engine.cancel_session(session.id).await.unwrap();
        assert_eq!(engine.tracked_locks(), 0);

        let stale = engine
            .record_count(session.id, gin(), Observation::units(2, 0.0))
            .await;
        assert!(matches!(stale, Err(EngineError::SessionNotActive { .. })));
        engine.cancel_session(session.id).await.unwrap();
        assert!(engine.complete_session(session.id).await.is_err());
        assert_eq!(engine.tracked_locks(), 0);
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(is_transient(&StoreError::Unavailable("down".into())));
        assert!(!is_transient(&StoreError::Conflict {
            product_id: ProductId::new("x"),
            expected: None,
            actual: None,
        }));
    }
}
