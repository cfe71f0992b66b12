//! Product resolver and keg level sensor doubles.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use taproom_inventory_core::environment::{BoxFuture, KegLevelObserver, ProductResolver};
use taproom_inventory_core::{ObserverError, ProductId, ProductType, ResolverError, TapId};

/// Product resolver backed by a fixed table.
///
/// # Example
///
/// ```
/// use taproom_inventory_testing::StaticProductResolver;
///
/// let resolver = StaticProductResolver::new()
///     .with_bottle("house-gin", 750.0)
///     .with_keg("pilsner", 58_670.0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct StaticProductResolver {
    products: HashMap<ProductId, ProductType>,
}

impl StaticProductResolver {
    /// Create an empty resolver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit-sold product
    #[must_use]
    pub fn with_bottle(mut self, product_id: &str, container_size_ml: f64) -> Self {
        self.products.insert(
            ProductId::new(product_id),
            ProductType {
                is_sold_by_volume: false,
                container_size_ml,
            },
        );
        self
    }

    /// Add a volume-sold product
    #[must_use]
    pub fn with_keg(mut self, product_id: &str, keg_size_ml: f64) -> Self {
        self.products.insert(
            ProductId::new(product_id),
            ProductType {
                is_sold_by_volume: true,
                container_size_ml: keg_size_ml,
            },
        );
        self
    }
}

impl ProductResolver for StaticProductResolver {
    fn get_product_type(
        &self,
        product_id: &ProductId,
    ) -> BoxFuture<'_, Result<ProductType, ResolverError>> {
        let result = self
            .products
            .get(product_id)
            .copied()
            .ok_or_else(|| ResolverError::NotFound(product_id.clone()));
        Box::pin(async move { result })
    }
}

/// Keg level sensor returning scripted readings.
///
/// Taps without a reading report [`ObserverError::Unavailable`].
#[derive(Clone, Debug, Default)]
pub struct ScriptedKegObserver {
    readings: Arc<RwLock<HashMap<TapId, f64>>>,
}

impl ScriptedKegObserver {
    /// Create a sensor with no readings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fill reading for a tap
    pub fn set_fill(&self, tap_id: &TapId, fraction: f64) {
        self.readings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tap_id.clone(), fraction);
    }

    /// Drop the reading for a tap, simulating a sensor outage
    pub fn clear_reading(&self, tap_id: &TapId) {
        self.readings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tap_id);
    }
}

impl KegLevelObserver for ScriptedKegObserver {
    fn current_fill_fraction(&self, tap_id: &TapId) -> BoxFuture<'_, Result<f64, ObserverError>> {
        let result = self
            .readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tap_id)
            .copied()
            .ok_or_else(|| ObserverError::Unavailable(tap_id.clone()));
        Box::pin(async move { result })
    }
}
