//! Reconciliation planning.
//!
//! Given a session's counts and the stock as it looks *now*, decide what to
//! write back. The source of truth may have moved since the session started
//! (deliveries received, sales synced), so a blind overwrite would erase those
//! changes. Instead:
//!
//! - stock untouched since `started_at`: write the observed level directly;
//! - stock modified after `started_at`: apply the operator's correction
//!   (`observed - expected`) on top of the current level and flag the product.
//!
//! Keg products are never written. Their on-deck headcount is compared with
//! the receiving-created keg records and mismatches are reported.
//!
//! Planning is pure; the runtime performs the reads and the atomic batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounting::{BottleObservation, KegObservation, on_deck_headcount};
use crate::types::{
    Count, KegRecord, ProductId, Session, StockLevel, StockRecord, StockUpdate, StockWrite, TapId,
};
use crate::variance::VarianceItem;

const EPSILON: f64 = 1e-9;

/// Planned write-back for one unit-sold product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductReconciliation {
    /// Product
    pub product_id: ProductId,
    /// Level the operator counted
    pub observed: StockLevel,
    /// Level expected when the count was taken
    pub expected: Option<StockLevel>,
    /// Level in the store right before the write
    pub previous: Option<StockLevel>,
    /// Level written
    pub new_level: StockLevel,
    /// Stock moved after the session started; delta applied instead of overwrite
    pub reconciled_with_conflict: bool,
    /// Result went negative and was clamped to zero
    pub clamped: bool,
    /// Compare-and-swap precondition for the write
    pub expected_last_modified: Option<DateTime<Utc>>,
}

impl ProductReconciliation {
    /// The store write for this plan
    #[must_use]
    pub fn to_update(&self) -> StockUpdate {
        StockUpdate {
            product_id: self.product_id.clone(),
            write: StockWrite {
                new_level: self.new_level,
                expected_last_modified: self.expected_last_modified,
            },
        }
    }
}

/// On-deck keg headcount disagreeing with keg records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KegHeadcountMismatch {
    /// Product
    pub product_id: ProductId,
    /// Kegs the operator saw on deck
    pub counted: i64,
    /// On-deck keg records in the system
    pub recorded: i64,
}

/// A tapped keg whose level could not be read during the count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTap {
    /// Product
    pub product_id: ProductId,
    /// Tap needing manual entry
    pub tap_id: TapId,
}

/// Outcome of reconciling a session into stock.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Unit-sold products written back
    pub products: Vec<ProductReconciliation>,
    /// Keg headcount discrepancies, flagged not corrected
    pub keg_mismatches: Vec<KegHeadcountMismatch>,
    /// Taps without a sensor reading
    pub skipped_taps: Vec<SkippedTap>,
    /// Planning attempts needed before the batch committed
    pub attempts: usize,
}

impl ReconciliationReport {
    /// Products reconciled with the delta rule
    pub fn conflicts(&self) -> impl Iterator<Item = &ProductReconciliation> {
        self.products
            .iter()
            .filter(|product| product.reconciled_with_conflict)
    }

    /// Returns `true` if anything needs manager review
    #[must_use]
    pub fn needs_review(&self) -> bool {
        self.conflicts().next().is_some()
            || !self.keg_mismatches.is_empty()
            || !self.skipped_taps.is_empty()
            || self.products.iter().any(|product| product.clamped)
    }

    /// Store writes for the whole batch
    #[must_use]
    pub fn updates(&self) -> Vec<StockUpdate> {
        self.products
            .iter()
            .map(ProductReconciliation::to_update)
            .collect()
    }
}

/// Everything the caller sees when a session completes.
///
/// Persisted with the session so a retried completion returns the same report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    /// The session in its terminal state
    pub session: Session,
    /// Variance at completion time
    pub variance: Vec<VarianceItem>,
    /// What was written back
    pub reconciliation: ReconciliationReport,
}

/// Plan the write-back for one unit-sold product.
#[must_use]
pub fn plan_units(
    session_started_at: DateTime<Utc>,
    count: &Count,
    bottle: &BottleObservation,
    current: Option<&StockRecord>,
) -> ProductReconciliation {
    let observed = bottle.level();
    let conflict = current.is_some_and(|record| record.last_modified_at > session_started_at);

    let (new_level, clamped) = match current {
        Some(record) if conflict => {
            let expected = count.expected.unwrap_or_default();
            let backup =
                record.level.backup_count + (observed.backup_count - expected.backup_count);
            let open = record.level.open_fraction + (observed.open_fraction - expected.open_fraction);
            normalize(backup, open)
        },
        _ => (observed, false),
    };

    ProductReconciliation {
        product_id: count.product_id.clone(),
        observed,
        expected: count.expected,
        previous: current.map(|record| record.level),
        new_level,
        reconciled_with_conflict: conflict,
        clamped,
        expected_last_modified: current.map(|record| record.last_modified_at),
    }
}

/// Compare the on-deck headcount with the keg records.
///
/// Returns `None` when they agree.
#[must_use]
pub fn check_kegs(
    product_id: &ProductId,
    kegs: &KegObservation,
    records: &[KegRecord],
) -> Option<KegHeadcountMismatch> {
    let recorded = on_deck_headcount(records);
    (recorded != kegs.on_deck_count).then(|| KegHeadcountMismatch {
        product_id: product_id.clone(),
        counted: kegs.on_deck_count,
        recorded,
    })
}

/// Fold an open fraction outside 0..1 back into whole units.
///
/// Returns the level and whether it had to be clamped at zero.
#[allow(clippy::cast_possible_truncation)] // fractions here are a handful of units at most
fn normalize(backup: i64, open: f64) -> (StockLevel, bool) {
    let mut backup = backup;
    let mut open = open;

    if open < -EPSILON {
        let borrow = (-open).ceil();
        backup -= borrow as i64;
        open += borrow;
    }
    if open >= 1.0 - EPSILON {
        let carry = (open + EPSILON).floor();
        backup += carry as i64;
        open -= carry;
    }
    if open.abs() < EPSILON {
        open = 0.0;
    }

    if backup < 0 {
        return (StockLevel::default(), true);
    }
    (StockLevel::new(backup, open.clamp(0.0, 1.0)), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::{ProductAccounting, TapFill, TappedKeg};
    use crate::types::{KegId, KegStatus, Observation, SessionId};
    use chrono::Duration;

    fn count(expected: Option<StockLevel>, observed: StockLevel, at: DateTime<Utc>) -> (Count, BottleObservation) {
        let bottle = BottleObservation {
            sealed_units: observed.backup_count,
            open_volume_ml: observed.open_fraction * 750.0,
            open_fraction: observed.open_fraction,
            container_size_ml: 750.0,
        };
        let count = Count {
            session_id: SessionId::new(),
            product_id: ProductId::new("x"),
            observation: Observation::units(observed.backup_count, observed.open_fraction),
            accounting: ProductAccounting::Bottle(bottle),
            expected,
            observed_at: at,
            idempotency_key: None,
            version: 1,
        };
        (count, bottle)
    }

    #[test]
    fn untouched_stock_is_overwritten_with_observation() {
        let t0 = Utc::now();
        let record = StockRecord {
            level: StockLevel::new(12, 0.0),
            last_modified_at: t0 - Duration::hours(1),
        };
        let (count, bottle) = count(Some(StockLevel::new(12, 0.0)), StockLevel::new(10, 0.5), t0);
        let plan = plan_units(t0, &count, &bottle, Some(&record));
        assert!(!plan.reconciled_with_conflict);
        assert_eq!(plan.new_level, StockLevel::new(10, 0.5));
        assert_eq!(plan.expected_last_modified, Some(record.last_modified_at));
    }

    #[test]
    fn concurrent_delivery_is_preserved() {
        let t0 = Utc::now();
        let record = StockRecord {
            level: StockLevel::new(10, 0.0),
            last_modified_at: t0 + Duration::minutes(5),
        };
        let (count, bottle) = count(
            Some(StockLevel::new(4, 0.0)),
            StockLevel::new(5, 0.0),
            t0 + Duration::minutes(10),
        );
        let plan = plan_units(t0, &count, &bottle, Some(&record));
        assert!(plan.reconciled_with_conflict);
        assert_eq!(plan.new_level, StockLevel::new(11, 0.0));
    }

    #[test]
    fn open_fraction_delta_borrows_from_sealed_units() {
        assert_eq!(normalize(5, -0.25), (StockLevel::new(4, 0.75), false));
        assert_eq!(normalize(5, 1.5), (StockLevel::new(6, 0.5), false));
        assert_eq!(normalize(0, -0.5), (StockLevel::default(), true));
    }

    #[test]
    fn missing_record_is_written_directly() {
        let t0 = Utc::now();
        let (count, bottle) = count(None, StockLevel::new(3, 0.0), t0);
        let plan = plan_units(t0, &count, &bottle, None);
        assert!(!plan.reconciled_with_conflict);
        assert_eq!(plan.new_level, StockLevel::new(3, 0.0));
        assert_eq!(plan.expected_last_modified, None);
    }

    #[test]
    fn keg_headcount_mismatch_is_flagged() {
        let product = ProductId::new("ipa");
        let records = vec![KegRecord {
            id: KegId::new("k1"),
            product_id: product.clone(),
            status: KegStatus::OnDeck,
            tap_id: None,
            initial_volume_ml: 58_670.0,
            remaining_volume_ml: 58_670.0,
        }];
        let kegs = KegObservation {
            on_deck_count: 2,
            tapped: vec![TappedKeg {
                tap_id: TapId::new("tap-1"),
                fill: TapFill::Observed(0.65),
            }],
        };
        assert_eq!(
            check_kegs(&product, &kegs, &records),
            Some(KegHeadcountMismatch {
                product_id: product.clone(),
                counted: 2,
                recorded: 1,
            })
        );
        let agreeing = KegObservation {
            on_deck_count: 1,
            tapped: Vec::new(),
        };
        assert_eq!(check_kegs(&product, &agreeing, &records), None);
    }
}
