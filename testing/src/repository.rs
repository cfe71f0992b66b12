//! In-memory session repository.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use taproom_inventory_core::environment::{BoxFuture, SessionRepository};
use taproom_inventory_core::reconcile::{CompletionReport, ReconciliationReport};
use taproom_inventory_core::{
    ActorId, Count, IdempotencyKey, ModeTag, ProductId, RecordOutcome, RepositoryError, Session,
    SessionId, SessionStatus, Zone, ZoneId,
};

#[derive(Debug, Default)]
struct RepositoryState {
    zones: HashMap<ZoneId, Zone>,
    sessions: HashMap<SessionId, Session>,
    counts: HashMap<SessionId, BTreeMap<ProductId, Count>>,
    history: HashMap<SessionId, Vec<Count>>,
    seen_keys: HashMap<SessionId, HashSet<IdempotencyKey>>,
    reports: HashMap<SessionId, CompletionReport>,
    staged: HashMap<SessionId, ReconciliationReport>,
    failing_transitions: usize,
}

/// `HashMap`-backed [`SessionRepository`].
///
/// Every method takes a single write lock, so each invariant check and the
/// write it guards happen atomically.
#[derive(Clone, Debug, Default)]
pub struct InMemorySessionRepository {
    state: Arc<RwLock<RepositoryState>>,
}

impl InMemorySessionRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions stored, in any status
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.read().sessions.len()
    }

    /// Number of in-progress sessions for an actor and mode
    #[must_use]
    pub fn in_progress_count(&self, actor_id: &ActorId, mode: ModeTag) -> usize {
        self.read()
            .sessions
            .values()
            .filter(|s| s.is_active() && &s.actor_id == actor_id && s.mode == mode)
            .count()
    }

    /// Make the next `n` status transitions fail with
    /// [`RepositoryError::Backend`], leaving the session untouched
    pub fn fail_next_transitions(&self, n: usize) {
        self.write().failing_transitions = n;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RepositoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RepositoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn do_upsert(&self, mut count: Count) -> Result<RecordOutcome, RepositoryError> {
        let mut state = self.write();
        let session = state
            .sessions
            .get(&count.session_id)
            .ok_or(RepositoryError::SessionNotFound(count.session_id))?;
        if !session.is_active() {
            return Err(RepositoryError::StatusMismatch {
                session_id: session.id,
                expected: SessionStatus::InProgress,
                actual: session.status,
            });
        }

        let session_id = count.session_id;
        if let Some(key) = count.idempotency_key {
            let fresh = state.seen_keys.entry(session_id).or_default().insert(key);
            if !fresh {
                let current = state
                    .counts
                    .get(&session_id)
                    .and_then(|counts| counts.get(&count.product_id))
                    .cloned()
                    .unwrap_or(count);
                return Ok(RecordOutcome::Duplicate(current));
            }
        }

        let counts = state.counts.entry(session_id).or_default();
        let previous = match counts.get(&count.product_id) {
            Some(existing) if existing.observed_at > count.observed_at => {
                return Ok(RecordOutcome::Outdated(existing.clone()));
            },
            Some(existing) => Some(existing.clone()),
            None => None,
        };

        count.version = previous.as_ref().map_or(1, |p| p.version + 1);
        counts.insert(count.product_id.clone(), count.clone());
        match previous {
            Some(previous) => {
                state.history.entry(session_id).or_default().push(previous);
                Ok(RecordOutcome::Replaced(count))
            },
            None => Ok(RecordOutcome::Inserted(count)),
        }
    }

    fn do_transition(
        &self,
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        at: DateTime<Utc>,
        report: Option<CompletionReport>,
    ) -> Result<Session, RepositoryError> {
        let mut state = self.write();
        if state.failing_transitions > 0 {
            state.failing_transitions -= 1;
            return Err(RepositoryError::Backend(
                "injected transition failure".to_string(),
            ));
        }
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or(RepositoryError::SessionNotFound(id))?;
        if session.status != from {
            return Err(RepositoryError::StatusMismatch {
                session_id: id,
                expected: from,
                actual: session.status,
            });
        }
        session.status = to;
        if to.is_terminal() {
            session.completed_at = Some(at);
        }
        let session = session.clone();
        if let Some(mut report) = report {
            report.session = session.clone();
            state.reports.insert(id, report);
        }
        Ok(session)
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn register_zone(&self, zone: Zone) -> BoxFuture<'_, Result<(), RepositoryError>> {
        self.write().zones.entry(zone.id.clone()).or_insert(zone);
        Box::pin(async { Ok(()) })
    }

    fn zone(&self, zone_id: &ZoneId) -> BoxFuture<'_, Result<Option<Zone>, RepositoryError>> {
        let zone = self.read().zones.get(zone_id).cloned();
        Box::pin(async move { Ok(zone) })
    }

    fn create_session(&self, session: Session) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let result = {
            let mut state = self.write();
            let existing = state
                .sessions
                .values()
                .find(|s| s.is_active() && s.actor_id == session.actor_id && s.mode == session.mode)
                .cloned();
            match existing {
                Some(existing) => Err(RepositoryError::ActiveSessionExists(Box::new(existing))),
                None => {
                    state.sessions.insert(session.id, session);
                    Ok(())
                },
            }
        };
        Box::pin(async move { result })
    }

    fn session(&self, id: SessionId) -> BoxFuture<'_, Result<Option<Session>, RepositoryError>> {
        let session = self.read().sessions.get(&id).cloned();
        Box::pin(async move { Ok(session) })
    }

    fn active_session(
        &self,
        actor_id: &ActorId,
        mode: ModeTag,
    ) -> BoxFuture<'_, Result<Option<Session>, RepositoryError>> {
        let session = self
            .read()
            .sessions
            .values()
            .find(|s| s.is_active() && &s.actor_id == actor_id && s.mode == mode)
            .cloned();
        Box::pin(async move { Ok(session) })
    }

    fn transition(
        &self,
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        at: DateTime<Utc>,
        report: Option<CompletionReport>,
    ) -> BoxFuture<'_, Result<Session, RepositoryError>> {
        let result = self.do_transition(id, from, to, at, report);
        Box::pin(async move { result })
    }

    fn stage_reconciliation(
        &self,
        id: SessionId,
        report: ReconciliationReport,
    ) -> BoxFuture<'_, Result<(), RepositoryError>> {
        self.write().staged.insert(id, report);
        Box::pin(async { Ok(()) })
    }

    fn staged_reconciliation(
        &self,
        id: SessionId,
    ) -> BoxFuture<'_, Result<Option<ReconciliationReport>, RepositoryError>> {
        let report = self.read().staged.get(&id).cloned();
        Box::pin(async move { Ok(report) })
    }

    fn completion_report(
        &self,
        id: SessionId,
    ) -> BoxFuture<'_, Result<Option<CompletionReport>, RepositoryError>> {
        let report = self.read().reports.get(&id).cloned();
        Box::pin(async move { Ok(report) })
    }

    fn upsert_count(&self, count: Count) -> BoxFuture<'_, Result<RecordOutcome, RepositoryError>> {
        let result = self.do_upsert(count);
        Box::pin(async move { result })
    }

    fn counts(&self, session_id: SessionId) -> BoxFuture<'_, Result<Vec<Count>, RepositoryError>> {
        let counts = self
            .read()
            .counts
            .get(&session_id)
            .map(|counts| counts.values().cloned().collect())
            .unwrap_or_default();
        Box::pin(async move { Ok(counts) })
    }

    fn count_history(
        &self,
        session_id: SessionId,
    ) -> BoxFuture<'_, Result<Vec<Count>, RepositoryError>> {
        let history = self
            .read()
            .history
            .get(&session_id)
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { Ok(history) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap as Map;
    use taproom_inventory_core::accounting::translate;
    use taproom_inventory_core::{Observation, ProductType};

    fn session() -> Session {
        Session::start(
            ActorId::new("sam"),
            ZoneId::new("back-bar"),
            ModeTag::Production,
            Utc::now(),
        )
    }

    fn count(session_id: SessionId, units: i64, at: DateTime<Utc>) -> Count {
        let product = ProductType {
            is_sold_by_volume: false,
            container_size_ml: 750.0,
        };
        let observation = Observation::units(units, 0.0);
        let accounting = translate(&observation, &product, &Map::new()).unwrap_or_else(|e| {
            unreachable!("valid observation rejected: {e}")
        });
        Count {
            session_id,
            product_id: ProductId::new("gin"),
            observation,
            accounting,
            expected: None,
            observed_at: at,
            idempotency_key: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn second_active_session_for_same_actor_and_mode_is_rejected() {
        let repo = InMemorySessionRepository::new();
        repo.create_session(session()).await.unwrap();
        let err = repo.create_session(session()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ActiveSessionExists(_)));

        let mut simulation = session();
        simulation.mode = ModeTag::Simulation;
        assert!(repo.create_session(simulation).await.is_ok());
    }

    #[tokio::test]
    async fn later_write_supersedes_and_keeps_history() {
        let repo = InMemorySessionRepository::new();
        let s = session();
        let t = s.started_at;
        repo.create_session(s.clone()).await.unwrap();

        let first = repo.upsert_count(count(s.id, 3, t)).await.unwrap();
        assert!(matches!(first, RecordOutcome::Inserted(_)));
        let second = repo
            .upsert_count(count(s.id, 4, t + Duration::seconds(5)))
            .await
            .unwrap();
        assert!(matches!(&second, RecordOutcome::Replaced(c) if c.version == 2));

        let stale = repo.upsert_count(count(s.id, 9, t)).await.unwrap();
        assert!(matches!(&stale, RecordOutcome::Outdated(c) if c.observation.backup_units == 4));

        assert_eq!(repo.counts(s.id).await.unwrap().len(), 1);
        assert_eq!(repo.count_history(s.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn counts_are_frozen_after_terminal_transition() {
        let repo = InMemorySessionRepository::new();
        let s = session();
        repo.create_session(s.clone()).await.unwrap();
        repo.transition(
            s.id,
            SessionStatus::InProgress,
            SessionStatus::Cancelled,
            Utc::now(),
            None,
        )
        .await
        .unwrap();

        let err = repo
            .upsert_count(count(s.id, 1, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::StatusMismatch { .. }));
        assert!(repo.counts(s.id).await.unwrap().is_empty());
    }
}
