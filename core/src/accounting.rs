//! Dual accounting: bottles and cans versus kegs.
//!
//! Unit-sold products are counted by hand: sealed units plus the fill of the
//! one open container. Volume-sold products are a set of kegs; on-deck kegs
//! are counted by hand while tapped kegs report their fill from the level
//! sensor and are never overridden manually.
//!
//! [`translate`] resolves an [`Observation`] into a [`ProductAccounting`]
//! exactly once, so downstream code matches on the variant instead of
//! re-checking `is_sold_by_volume`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{KegRecord, KegStatus, Observation, ProductType, StockLevel, TapId};

/// Observation translated for the product's accounting model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductAccounting {
    /// Bottle or can product
    Bottle(BottleObservation),
    /// Keg product
    Keg(KegObservation),
}

impl ProductAccounting {
    /// Observed quantity in units (bottles) or keg equivalents (kegs)
    #[must_use]
    pub fn observed_total(&self) -> f64 {
        match self {
            Self::Bottle(bottle) => bottle.level().total(),
            Self::Keg(keg) => keg.keg_equivalent(),
        }
    }
}

/// Manual count of a unit-sold product.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BottleObservation {
    /// Sealed units on the shelf
    pub sealed_units: i64,
    /// Liquid left in the open container, in millilitres
    pub open_volume_ml: f64,
    /// Same quantity as a fraction of one container
    pub open_fraction: f64,
    /// Container size used for the conversion
    pub container_size_ml: f64,
}

impl BottleObservation {
    /// The observation as a stock level
    #[must_use]
    pub const fn level(&self) -> StockLevel {
        StockLevel::new(self.sealed_units, self.open_fraction)
    }
}

/// Sensor reading for one tapped keg.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "fraction", rename_all = "snake_case")]
pub enum TapFill {
    /// Fraction remaining, 0..=1
    Observed(f64),
    /// Sensor had no reading; needs manual follow-up
    NotObserved,
}

/// One tap confirmed during the count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TappedKeg {
    /// The tap
    pub tap_id: TapId,
    /// Its fill reading
    pub fill: TapFill,
}

/// Count of a volume-sold product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KegObservation {
    /// Sealed kegs waiting to be tapped
    pub on_deck_count: i64,
    /// Taps confirmed for this product
    pub tapped: Vec<TappedKeg>,
}

impl KegObservation {
    /// On-deck headcount plus summed tapped fill.
    ///
    /// Unobserved taps contribute nothing. Never persisted as a single number.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn keg_equivalent(&self) -> f64 {
        let tapped: f64 = self
            .tapped
            .iter()
            .filter_map(|keg| match keg.fill {
                TapFill::Observed(fraction) => Some(fraction),
                TapFill::NotObserved => None,
            })
            .sum();
        self.on_deck_count as f64 + tapped
    }

    /// Taps whose fill could not be read
    #[must_use]
    pub fn unobserved_taps(&self) -> Vec<TapId> {
        self.tapped
            .iter()
            .filter(|keg| keg.fill == TapFill::NotObserved)
            .map(|keg| keg.tap_id.clone())
            .collect()
    }
}

/// Validate an observation against the product's accounting model.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate(observation: &Observation, product: &ProductType) -> Result<(), ValidationError> {
    if observation.backup_units < 0 {
        return Err(ValidationError::NegativeBackupUnits(observation.backup_units));
    }
    let fraction = observation.partial_fraction;
    if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
        return Err(ValidationError::FractionOutOfRange(fraction));
    }

    if product.is_sold_by_volume {
        if fraction != 0.0 {
            return Err(ValidationError::ManualKegFill(fraction));
        }
        let mut seen = HashSet::new();
        for tap in &observation.tapped {
            if !seen.insert(tap) {
                return Err(ValidationError::DuplicateTap(tap.clone()));
            }
        }
    } else {
        if !observation.tapped.is_empty() {
            return Err(ValidationError::TapsOnUnitProduct);
        }
        if !product.container_size_ml.is_finite() || product.container_size_ml <= 0.0 {
            return Err(ValidationError::InvalidContainerSize(product.container_size_ml));
        }
    }
    Ok(())
}

/// Translate a raw observation into its accounting representation.
///
/// `tap_fills` holds the sensor readings gathered for the observation's taps;
/// a tap missing from the map is treated as not observed. Readings are clamped
/// to 0..=1 and non-finite readings count as not observed.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the observation is invalid for the product.
pub fn translate(
    observation: &Observation,
    product: &ProductType,
    tap_fills: &HashMap<TapId, TapFill>,
) -> Result<ProductAccounting, ValidationError> {
    validate(observation, product)?;

    if product.is_sold_by_volume {
        let tapped = observation
            .tapped
            .iter()
            .map(|tap_id| {
                let fill = match tap_fills.get(tap_id) {
                    Some(TapFill::Observed(fraction)) if fraction.is_finite() => {
                        TapFill::Observed(fraction.clamp(0.0, 1.0))
                    },
                    _ => TapFill::NotObserved,
                };
                TappedKeg {
                    tap_id: tap_id.clone(),
                    fill,
                }
            })
            .collect();
        return Ok(ProductAccounting::Keg(KegObservation {
            on_deck_count: observation.backup_units,
            tapped,
        }));
    }

    let open_volume_ml = observation.partial_fraction * product.container_size_ml;
    Ok(ProductAccounting::Bottle(BottleObservation {
        sealed_units: observation.backup_units,
        open_volume_ml,
        open_fraction: open_volume_ml / product.container_size_ml,
        container_size_ml: product.container_size_ml,
    }))
}

/// Number of keg records currently on deck
#[must_use]
pub fn on_deck_headcount(records: &[KegRecord]) -> i64 {
    let count = records
        .iter()
        .filter(|keg| keg.status == KegStatus::OnDeck)
        .count();
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// The system's own keg level: on-deck records as whole kegs plus the fill of
/// tapped kegs. `None` when the product has no keg records at all.
#[must_use]
pub fn recorded_keg_level(records: &[KegRecord]) -> Option<StockLevel> {
    if records.is_empty() {
        return None;
    }
    let tapped: f64 = records
        .iter()
        .filter(|keg| keg.status == KegStatus::Tapped)
        .map(KegRecord::fill_fraction)
        .sum();
    Some(StockLevel::new(on_deck_headcount(records), tapped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KegId, ProductId};
    use proptest::prelude::*;

    const BOTTLE: ProductType = ProductType {
        is_sold_by_volume: false,
        container_size_ml: 750.0,
    };
    const KEG: ProductType = ProductType {
        is_sold_by_volume: true,
        container_size_ml: 58_670.0,
    };

    #[test]
    fn bottle_translation_keeps_fraction() {
        let accounting = translate(&Observation::units(10, 0.5), &BOTTLE, &HashMap::new());
        let Ok(ProductAccounting::Bottle(bottle)) = accounting else {
            panic!("expected bottle accounting, got {accounting:?}");
        };
        assert_eq!(bottle.sealed_units, 10);
        assert!((bottle.open_volume_ml - 375.0).abs() < 1e-9);
        assert!((bottle.open_fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn keg_equivalent_sums_on_deck_and_tapped() {
        let tap = TapId::new("tap-3");
        let fills = HashMap::from([(tap.clone(), TapFill::Observed(0.65))]);
        let accounting = translate(&Observation::kegs(1, vec![tap]), &KEG, &fills);
        let Ok(ProductAccounting::Keg(keg)) = accounting else {
            panic!("expected keg accounting, got {accounting:?}");
        };
        assert!((keg.keg_equivalent() - 1.65).abs() < 1e-9);
        assert!(keg.unobserved_taps().is_empty());
    }

    #[test]
    fn missing_sensor_reading_marks_tap_not_observed() {
        let tap = TapId::new("tap-1");
        let accounting = translate(&Observation::kegs(2, vec![tap.clone()]), &KEG, &HashMap::new());
        let Ok(ProductAccounting::Keg(keg)) = accounting else {
            panic!("expected keg accounting, got {accounting:?}");
        };
        assert_eq!(keg.unobserved_taps(), vec![tap]);
        assert!((keg.keg_equivalent() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_observations() {
        assert_eq!(
            validate(&Observation::units(-1, 0.0), &BOTTLE),
            Err(ValidationError::NegativeBackupUnits(-1))
        );
        assert!(matches!(
            validate(&Observation::units(1, 1.2), &BOTTLE),
            Err(ValidationError::FractionOutOfRange(_))
        ));
        assert!(matches!(
            validate(&Observation::units(1, f64::NAN), &BOTTLE),
            Err(ValidationError::FractionOutOfRange(_))
        ));
        assert_eq!(
            validate(&Observation::units(1, 0.3), &KEG),
            Err(ValidationError::ManualKegFill(0.3))
        );
        assert_eq!(
            validate(&Observation::kegs(0, vec![TapId::new("t")]), &BOTTLE),
            Err(ValidationError::TapsOnUnitProduct)
        );
        let tap = TapId::new("t");
        assert_eq!(
            validate(&Observation::kegs(0, vec![tap.clone(), tap.clone()]), &KEG),
            Err(ValidationError::DuplicateTap(tap))
        );
    }

    #[test]
    fn recorded_equivalent_ignores_kicked_kegs() {
        let keg = |id: &str, status, remaining| KegRecord {
            id: KegId::new(id),
            product_id: ProductId::new("ipa"),
            status,
            tap_id: None,
            initial_volume_ml: 100.0,
            remaining_volume_ml: remaining,
        };
        let records = vec![
            keg("a", KegStatus::OnDeck, 100.0),
            keg("b", KegStatus::Tapped, 40.0),
            keg("c", KegStatus::Kicked, 0.0),
        ];
        assert_eq!(on_deck_headcount(&records), 1);
        let level = recorded_keg_level(&records).unwrap_or_default();
        assert_eq!(level.backup_count, 1);
        assert!((level.total() - 1.4).abs() < 1e-9);
    }

    #[test]
    fn no_keg_records_means_no_recorded_level() {
        assert_eq!(recorded_keg_level(&[]), None);
    }

    proptest! {
        #[test]
        fn valid_bottle_total_matches_inputs(units in 0i64..10_000, fraction in 0.0f64..=1.0) {
            let accounting = translate(&Observation::units(units, fraction), &BOTTLE, &HashMap::new());
            prop_assert!(accounting.is_ok());
            if let Ok(accounting) = accounting {
                #[allow(clippy::cast_precision_loss)]
                let expected = units as f64 + fraction;
                prop_assert!((accounting.observed_total() - expected).abs() < 1e-6);
            }
        }
    }
}
