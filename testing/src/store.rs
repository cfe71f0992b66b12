//! In-memory stock store with compare-and-swap batches.
//!
//! Besides implementing [`Store`], it plays the part of the *other* writers
//! (receiving, POS sales sync) so tests can mutate stock mid-session and
//! inject outages or interleaved writes right before a batch lands.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use taproom_inventory_core::environment::{BoxFuture, Clock, Store};
use taproom_inventory_core::{
    KegRecord, ProductId, SessionId, StockLevel, StockRecord, StockUpdate, StoreError,
};

#[derive(Debug, Default)]
struct StoreState {
    stock: HashMap<ProductId, StockRecord>,
    kegs: HashMap<ProductId, Vec<KegRecord>>,
    failing_batches: usize,
    reads_unavailable: bool,
    interleaved: VecDeque<(ProductId, i64)>,
    applied_batches: HashSet<SessionId>,
    batches_applied: usize,
    batches_attempted: usize,
}

/// In-memory [`Store`] for fast, deterministic tests.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use taproom_inventory_core::{ProductId, StockLevel};
/// use taproom_inventory_testing::{InMemoryStore, test_clock};
///
/// let store = InMemoryStore::new(Arc::new(test_clock()));
/// store.set_stock(&ProductId::new("lager"), StockLevel::new(12, 0.0));
/// store.receive(&ProductId::new("lager"), 6);
/// assert_eq!(store.level(&ProductId::new("lager")), Some(StockLevel::new(18, 0.0)));
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

impl InMemoryStore {
    /// Create an empty store stamping writes with `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            clock,
        }
    }

    /// Overwrite a product's stock, stamped now
    pub fn set_stock(&self, product_id: &ProductId, level: StockLevel) {
        let now = self.clock.now();
        let mut state = self.write();
        let last_modified_at = Self::stamp(&state, product_id, now);
        state.stock.insert(
            product_id.clone(),
            StockRecord {
                level,
                last_modified_at,
            },
        );
    }

    /// Add sealed units as receiving would, stamped now
    pub fn receive(&self, product_id: &ProductId, units: i64) {
        let now = self.clock.now();
        Self::adjust(&mut self.write(), product_id, units, now);
    }

    /// Remove sealed units as sales sync would, stamped now
    pub fn sell(&self, product_id: &ProductId, units: i64) {
        self.receive(product_id, -units);
    }

    /// Add a keg record
    pub fn add_keg(&self, keg: KegRecord) {
        self.write()
            .kegs
            .entry(keg.product_id.clone())
            .or_default()
            .push(keg);
    }

    /// Make the next `n` batch writes fail with [`StoreError::Unavailable`]
    pub fn fail_next_batches(&self, n: usize) {
        self.write().failing_batches = n;
    }

    /// Make reads fail with [`StoreError::Unavailable`]
    pub fn set_reads_unavailable(&self, unavailable: bool) {
        self.write().reads_unavailable = unavailable;
    }

    /// Queue a receipt that lands right before the next batch is checked.
    ///
    /// One queued receipt is applied per batch attempt, which forces the
    /// compare-and-swap to fail and the engine to re-plan.
    pub fn interleave_receipt_before_batch(&self, product_id: &ProductId, units: i64) {
        self.write()
            .interleaved
            .push_back((product_id.clone(), units));
    }

    /// Current record for a product
    #[must_use]
    pub fn record(&self, product_id: &ProductId) -> Option<StockRecord> {
        self.read().stock.get(product_id).copied()
    }

    /// Current level for a product
    #[must_use]
    pub fn level(&self, product_id: &ProductId) -> Option<StockLevel> {
        self.record(product_id).map(|record| record.level)
    }

    /// Number of batches committed
    #[must_use]
    pub fn batches_applied(&self) -> usize {
        self.read().batches_applied
    }

    /// Number of batch calls, including failed and conflicting ones
    #[must_use]
    pub fn batches_attempted(&self) -> usize {
        self.read().batches_attempted
    }

    // Every write moves `last_modified_at` forward, even when the clock has not.
    fn stamp(state: &StoreState, product_id: &ProductId, now: DateTime<Utc>) -> DateTime<Utc> {
        match state.stock.get(product_id) {
            Some(record) if record.last_modified_at >= now => {
                record.last_modified_at + Duration::milliseconds(1)
            },
            _ => now,
        }
    }

    fn adjust(state: &mut StoreState, product_id: &ProductId, units: i64, now: DateTime<Utc>) {
        let last_modified_at = Self::stamp(state, product_id, now);
        let record = state
            .stock
            .entry(product_id.clone())
            .or_insert(StockRecord {
                level: StockLevel::default(),
                last_modified_at,
            });
        record.level.backup_count = (record.level.backup_count + units).max(0);
        record.last_modified_at = last_modified_at;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_batch(&self, batch_id: SessionId, updates: &[StockUpdate]) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.write();
        state.batches_attempted += 1;

        if state.failing_batches > 0 {
            state.failing_batches -= 1;
            return Err(StoreError::Unavailable("injected batch failure".to_string()));
        }
        if state.applied_batches.contains(&batch_id) {
            return Ok(());
        }

        if let Some((product_id, units)) = state.interleaved.pop_front() {
            Self::adjust(&mut state, &product_id, units, now);
        }

        for update in updates {
            let actual = state
                .stock
                .get(&update.product_id)
                .map(|record| record.last_modified_at);
            if actual != update.write.expected_last_modified {
                return Err(StoreError::Conflict {
                    product_id: update.product_id.clone(),
                    expected: update.write.expected_last_modified,
                    actual,
                });
            }
        }

        for update in updates {
            let last_modified_at = Self::stamp(&state, &update.product_id, now);
            state.stock.insert(
                update.product_id.clone(),
                StockRecord {
                    level: update.write.new_level,
                    last_modified_at,
                },
            );
        }
        state.applied_batches.insert(batch_id);
        state.batches_applied += 1;
        Ok(())
    }
}

impl Store for InMemoryStore {
    fn get_stock(
        &self,
        product_id: &ProductId,
    ) -> BoxFuture<'_, Result<Option<StockRecord>, StoreError>> {
        let result = {
            let state = self.read();
            if state.reads_unavailable {
                Err(StoreError::Unavailable("reads disabled".to_string()))
            } else {
                Ok(state.stock.get(product_id).copied())
            }
        };
        Box::pin(async move { result })
    }

    fn apply_stock_batch(
        &self,
        batch_id: SessionId,
        updates: Vec<StockUpdate>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move { self.apply_batch(batch_id, &updates) })
    }

    fn batch_applied(&self, batch_id: SessionId) -> BoxFuture<'_, Result<bool, StoreError>> {
        let result = {
            let state = self.read();
            if state.reads_unavailable {
                Err(StoreError::Unavailable("reads disabled".to_string()))
            } else {
                Ok(state.applied_batches.contains(&batch_id))
            }
        };
        Box::pin(async move { result })
    }

    fn get_keg_records(
        &self,
        product_id: &ProductId,
    ) -> BoxFuture<'_, Result<Vec<KegRecord>, StoreError>> {
        let result = {
            let state = self.read();
            if state.reads_unavailable {
                Err(StoreError::Unavailable("reads disabled".to_string()))
            } else {
                Ok(state.kegs.get(product_id).cloned().unwrap_or_default())
            }
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::mocks::ManualClock;
    use taproom_inventory_core::StockWrite;

    fn update(product: &ProductId, level: StockLevel, expected: Option<StockRecord>) -> StockUpdate {
        StockUpdate {
            product_id: product.clone(),
            write: StockWrite {
                new_level: level,
                expected_last_modified: expected.map(|r| r.last_modified_at),
            },
        }
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing_on_conflict() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryStore::new(clock.clone());
        let a = ProductId::new("a");
        let b = ProductId::new("b");
        store.set_stock(&a, StockLevel::new(1, 0.0));
        store.set_stock(&b, StockLevel::new(1, 0.0));
        let stale_b = store.record(&b);
        clock.advance(Duration::minutes(1));
        store.receive(&b, 3);

        let result = store
            .apply_stock_batch(SessionId::new(), vec![
                update(&a, StockLevel::new(9, 0.0), store.record(&a)),
                update(&b, StockLevel::new(9, 0.0), stale_b),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert_eq!(store.level(&a), Some(StockLevel::new(1, 0.0)));
        assert_eq!(store.level(&b), Some(StockLevel::new(4, 0.0)));
        assert_eq!(store.batches_applied(), 0);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = InMemoryStore::new(Arc::new(ManualClock::default()));
        let a = ProductId::new("a");
        let batch = SessionId::new();
        store.fail_next_batches(1);
        let first = store
            .apply_stock_batch(batch, vec![update(&a, StockLevel::new(2, 0.0), None)])
            .await;
        assert!(matches!(first, Err(StoreError::Unavailable(_))));
        let second = store
            .apply_stock_batch(batch, vec![update(&a, StockLevel::new(2, 0.0), None)])
            .await;
        assert!(second.is_ok());
        assert_eq!(store.batches_attempted(), 2);
    }

    #[tokio::test]
    async fn a_batch_is_applied_at_most_once() {
        let store = InMemoryStore::new(Arc::new(ManualClock::default()));
        let a = ProductId::new("a");
        let batch = SessionId::new();
        store
            .apply_stock_batch(batch, vec![update(&a, StockLevel::new(5, 0.0), None)])
            .await
            .unwrap();
        assert!(store.batch_applied(batch).await.unwrap());

        // Replayed with a stale precondition: ignored rather than rejected.
        let replay = store
            .apply_stock_batch(batch, vec![update(&a, StockLevel::new(6, 0.0), None)])
            .await;
        assert!(replay.is_ok());
        assert_eq!(store.level(&a), Some(StockLevel::new(5, 0.0)));
        assert_eq!(store.batches_applied(), 1);
        assert!(!store.batch_applied(SessionId::new()).await.unwrap());
    }
}
