//! Variance reporting: expected versus counted, classified by severity.
//!
//! Pure and side-effect free. The report is shown to the operator before they
//! decide to complete the session or go back to counting.

use serde::{Deserialize, Serialize};

use crate::types::{Count, ProductId};

/// How far a count strayed from the expected quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Counted exactly what was expected
    None,
    /// Small discrepancy
    Minor,
    /// Worth a second look before completing
    Large,
}

/// Thresholds above which a discrepancy is [`Severity::Large`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarianceThresholds {
    /// Absolute difference in units
    pub absolute_units: f64,
    /// Difference relative to the expected quantity
    pub relative: f64,
}

impl Default for VarianceThresholds {
    fn default() -> Self {
        Self {
            absolute_units: 2.0,
            relative: 0.20,
        }
    }
}

/// Variance for one product. Derived, never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarianceItem {
    /// Counted product
    pub product_id: ProductId,
    /// Expected units at observation time
    pub expected: f64,
    /// Counted units
    pub counted: f64,
    /// `counted - expected`
    pub delta: f64,
    /// Classification
    pub severity: Severity,
}

/// Tolerance for float noise when comparing quantities.
const EPSILON: f64 = 1e-9;

/// Classify a single discrepancy.
#[must_use]
pub fn classify(expected: f64, counted: f64, thresholds: &VarianceThresholds) -> Severity {
    let delta = counted - expected;
    if delta.abs() <= EPSILON {
        return Severity::None;
    }
    if expected.abs() <= EPSILON {
        // Nothing was expected but something turned up (or vice versa).
        return Severity::Large;
    }
    if delta.abs() > thresholds.absolute_units || delta.abs() / expected.abs() > thresholds.relative
    {
        return Severity::Large;
    }
    Severity::Minor
}

/// Build the variance report for a session's counts.
///
/// Items come back in product order so the report is stable.
#[must_use]
pub fn report(counts: &[Count], thresholds: &VarianceThresholds) -> Vec<VarianceItem> {
    let mut items: Vec<VarianceItem> = counts
        .iter()
        .map(|count| {
            let expected = count.expected_units();
            let counted = count.observed_units();
            VarianceItem {
                product_id: count.product_id.clone(),
                expected,
                counted,
                delta: counted - expected,
                severity: classify(expected, counted, thresholds),
            }
        })
        .collect();
    items.sort_by(|a, b| a.product_id.cmp(&b.product_id));
    items
}

/// Highest severity in a report
#[must_use]
pub fn worst(items: &[VarianceItem]) -> Severity {
    items
        .iter()
        .map(|item| item.severity)
        .max()
        .unwrap_or(Severity::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t() -> VarianceThresholds {
        VarianceThresholds::default()
    }

    #[test]
    fn three_over_ten_is_large() {
        assert_eq!(classify(10.0, 13.0, &t()), Severity::Large);
    }

    #[test]
    fn one_over_ten_is_minor() {
        assert_eq!(classify(10.0, 11.0, &t()), Severity::Minor);
    }

    #[test]
    fn something_from_nothing_is_large() {
        assert_eq!(classify(0.0, 1.0, &t()), Severity::Large);
    }

    #[test]
    fn exact_match_is_none() {
        assert_eq!(classify(4.5, 4.5, &t()), Severity::None);
        assert_eq!(classify(0.0, 0.0, &t()), Severity::None);
    }

    #[test]
    fn relative_threshold_catches_small_stock() {
        // 1 unit off 4 is 25%, under the absolute limit but over the relative one
        assert_eq!(classify(4.0, 5.0, &t()), Severity::Large);
    }

    #[test]
    fn worst_of_empty_report_is_none() {
        assert_eq!(worst(&[]), Severity::None);
    }

    proptest! {
        #[test]
        fn severity_is_symmetric_in_sign(expected in 1.0f64..1_000.0, delta in -50.0f64..50.0) {
            let up = classify(expected, expected + delta.abs(), &t());
            let down = classify(expected, expected - delta.abs(), &t());
            prop_assert_eq!(up, down);
        }

        #[test]
        fn deltas_over_absolute_limit_are_always_large(expected in 0.0f64..1_000.0, extra in 2.01f64..100.0) {
            prop_assert_eq!(classify(expected, expected + extra, &t()), Severity::Large);
        }
    }
}
