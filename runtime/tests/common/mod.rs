//! Shared fixtures for engine integration tests.

#![allow(dead_code)] // each test binary uses a different subset

use std::sync::Arc;

use chrono::Duration;
use taproom_inventory_core::environment::Clock;
use taproom_inventory_core::{
    ActorId, KegId, KegRecord, KegStatus, ModeTag, ProductId, Session, TapId, Zone, ZoneId,
};
use taproom_inventory_runtime::{EngineConfig, InventoryEngine, InventoryEnvironment, RetryPolicy};
use taproom_inventory_testing::{
    InMemorySessionRepository, InMemoryStore, ManualClock, ScriptedKegObserver,
    StaticProductResolver,
};

pub const GIN: &str = "house-gin";
pub const LAGER: &str = "lager-cans";
pub const PILSNER: &str = "pilsner";
pub const BACK_BAR: &str = "back-bar";
pub const WALK_IN: &str = "walk-in";

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: InMemoryStore,
    pub sessions: InMemorySessionRepository,
    pub kegs: ScriptedKegObserver,
    pub engine: Arc<InventoryEngine>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryStore::new(clock.clone());
        let sessions = InMemorySessionRepository::new();
        let kegs = ScriptedKegObserver::new();
        let products = StaticProductResolver::new()
            .with_bottle(GIN, 750.0)
            .with_bottle(LAGER, 355.0)
            .with_keg(PILSNER, 58_670.0);

        let engine = InventoryEngine::new(
            InventoryEnvironment {
                store: Arc::new(store.clone()),
                products: Arc::new(products),
                keg_levels: Arc::new(kegs.clone()),
                sessions: Arc::new(sessions.clone()),
                clock: clock.clone(),
            },
            config,
        )
        .with_retry_policy(RetryPolicy::immediate(3));

        engine
            .register_zone(Zone::new(BACK_BAR, "Back Bar"))
            .await
            .unwrap();
        engine
            .register_zone(Zone::new(WALK_IN, "Walk-in Cooler"))
            .await
            .unwrap();

        Self {
            clock,
            store,
            sessions,
            kegs,
            engine: Arc::new(engine),
        }
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(Duration::minutes(minutes));
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub async fn start(&self, actor: &str) -> Session {
        self.start_in(actor, BACK_BAR).await
    }

    pub async fn start_in(&self, actor: &str, zone: &str) -> Session {
        self.engine
            .start_session(ActorId::new(actor), ZoneId::new(zone), ModeTag::Production)
            .await
            .unwrap()
    }

    pub fn add_keg(&self, id: &str, status: KegStatus, tap: Option<&str>, remaining_ml: f64) {
        self.store.add_keg(KegRecord {
            id: KegId::new(id),
            product_id: ProductId::new(PILSNER),
            status,
            tap_id: tap.map(TapId::new),
            initial_volume_ml: 58_670.0,
            remaining_volume_ml: remaining_ml,
        });
    }
}

pub fn product(id: &str) -> ProductId {
    ProductId::new(id)
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
