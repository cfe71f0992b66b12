//! Back-bar count walkthrough
//!
//! Runs four counting scenarios against in-memory collaborators:
//!
//! 1. A clean count overwrites untouched stock
//! 2. Keg accounting combines on-deck headcount with sensor fill
//! 3. Counts taken offline are replayed once connectivity returns
//! 4. A delivery received mid-session survives reconciliation
//!
//! # Running
//!
//! ```bash
//! cargo run -p back-bar-count
//! RUST_LOG=debug cargo run -p back-bar-count
//! ```
//!
//! Engine settings come from `INVENTORY_*` environment variables (a `.env`
//! file is honoured). The Prometheus text exposition is printed at the end.

#![allow(missing_docs)]

use std::sync::Arc;

use chrono::Duration;
use taproom_inventory_core::{
    ActorId, KegId, KegRecord, KegStatus, ModeTag, Observation, ProductId, StockLevel, TapId,
    Zone, ZoneId,
};
use taproom_inventory_runtime::metrics::install_prometheus;
use taproom_inventory_runtime::{
    Connectivity, DeadLetterQueue, EngineConfig, InventoryEngine, InventoryEnvironment,
    OfflineLog, SyncCoordinator,
};
use taproom_inventory_testing::{
    InMemorySessionRepository, InMemoryStore, ManualClock, ScriptedKegObserver,
    StaticProductResolver,
};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const GIN: &str = "house-gin";
const LAGER: &str = "lager-cans";
const PILSNER: &str = "pilsner";
const KEG_ML: f64 = 58_670.0;

struct Bar {
    clock: Arc<ManualClock>,
    store: InMemoryStore,
    engine: Arc<InventoryEngine>,
}

impl Bar {
    async fn open(config: EngineConfig) -> anyhow::Result<Self> {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryStore::new(clock.clone());
        let kegs = ScriptedKegObserver::new();
        kegs.set_fill(&TapId::new("tap-3"), 0.65);

        store.set_stock(&ProductId::new(GIN), StockLevel::new(8, 0.0));
        store.set_stock(&ProductId::new(LAGER), StockLevel::new(4, 0.0));
        for (id, status, tap, remaining) in [
            ("pils-1", KegStatus::OnDeck, None, KEG_ML),
            ("pils-2", KegStatus::Tapped, Some("tap-3"), 0.65 * KEG_ML),
        ] {
            store.add_keg(KegRecord {
                id: KegId::new(id),
                product_id: ProductId::new(PILSNER),
                status,
                tap_id: tap.map(TapId::new),
                initial_volume_ml: KEG_ML,
                remaining_volume_ml: remaining,
            });
        }

        let engine = InventoryEngine::new(
            InventoryEnvironment {
                store: Arc::new(store.clone()),
                products: Arc::new(
                    StaticProductResolver::new()
                        .with_bottle(GIN, 750.0)
                        .with_bottle(LAGER, 355.0)
                        .with_keg(PILSNER, KEG_ML),
                ),
                keg_levels: Arc::new(kegs),
                sessions: Arc::new(InMemorySessionRepository::new()),
                clock: clock.clone(),
            },
            config,
        );
        engine.register_zone(Zone::new("back-bar", "Back Bar")).await?;
        clock.advance(Duration::minutes(1));

        Ok(Self {
            clock,
            store,
            engine: Arc::new(engine),
        })
    }

    fn minutes(&self, n: i64) {
        self.clock.advance(Duration::minutes(n));
    }

    async fn start(&self, actor: &str) -> anyhow::Result<taproom_inventory_core::Session> {
        Ok(self
            .engine
            .start_session(ActorId::new(actor), ZoneId::new("back-bar"), ModeTag::Production)
            .await?)
    }
}

async fn clean_count(bar: &Bar) -> anyhow::Result<()> {
    let session = bar.start("sam").await?;
    bar.minutes(3);
    bar.engine
        .record_count(session.id, ProductId::new(GIN), Observation::units(10, 0.5))
        .await?;

    let report = bar.engine.complete_session(session.id).await?;
    tracing::info!(
        level = ?bar.store.level(&ProductId::new(GIN)),
        needs_review = report.reconciliation.needs_review(),
        "Clean count reconciled"
    );
    Ok(())
}

async fn keg_count(bar: &Bar) -> anyhow::Result<()> {
    let session = bar.start("sam").await?;
    bar.engine
        .record_count(
            session.id,
            ProductId::new(PILSNER),
            Observation::kegs(1, vec![TapId::new("tap-3")]),
        )
        .await?;

    for item in bar.engine.preview_variance(session.id).await? {
        tracing::info!(
            product_id = %item.product_id,
            expected = item.expected,
            counted = item.counted,
            severity = ?item.severity,
            "Keg variance"
        );
    }
    let report = bar.engine.complete_session(session.id).await?;
    tracing::info!(
        mismatches = report.reconciliation.keg_mismatches.len(),
        "Keg count complete, no stock written"
    );
    Ok(())
}

async fn offline_count(bar: &Bar, config: &EngineConfig) -> anyhow::Result<()> {
    let session = bar.start("alex").await?;
    let (connectivity, rx) = watch::channel(Connectivity::Offline);
    let coordinator = SyncCoordinator::new(
        bar.engine.clone(),
        OfflineLog::open(&config.offline_log_path)?,
        rx,
        DeadLetterQueue::new(config.dead_letter_max),
        bar.clock.clone(),
    );

    for (product, units) in [(GIN, 9), (LAGER, 3), (GIN, 8)] {
        bar.minutes(1);
        coordinator
            .record(session.id, ProductId::new(product), Observation::units(units, 0.0))
            .await?;
    }
    tracing::info!(pending = coordinator.pending().len(), "Counted while offline");

    connectivity.send(Connectivity::Online)?;
    let summary = coordinator.flush().await?;
    tracing::info!(
        synced = summary.synced,
        duplicates = summary.duplicates,
        "Back online, offline log replayed"
    );

    bar.engine.complete_session(session.id).await?;
    Ok(())
}

async fn delivery_mid_count(bar: &Bar) -> anyhow::Result<()> {
    bar.store.set_stock(&ProductId::new(LAGER), StockLevel::new(4, 0.0));
    bar.minutes(1);
    let session = bar.start("sam").await?;

    bar.minutes(1);
    bar.engine
        .record_count(session.id, ProductId::new(LAGER), Observation::units(4, 0.0))
        .await?;
    bar.minutes(4);
    bar.store.receive(&ProductId::new(LAGER), 6);
    tracing::info!("Receiving logged a delivery of 6 while the count was open");
    bar.minutes(5);
    bar.engine
        .record_count(session.id, ProductId::new(LAGER), Observation::units(5, 0.0))
        .await?;

    bar.minutes(5);
    let report = bar.engine.complete_session(session.id).await?;
    for product in report.reconciliation.conflicts() {
        tracing::warn!(
            product_id = %product.product_id,
            previous = ?product.previous,
            new_level = ?product.new_level,
            "Reconciled with conflict"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,taproom_inventory_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = EngineConfig::from_env();
    let metrics = install_prometheus()?;
    tracing::info!(?config, "Starting back-bar count");

    let bar = Bar::open(config.clone()).await?;
    clean_count(&bar).await?;
    keg_count(&bar).await?;
    offline_count(&bar, &config).await?;
    delivery_mid_count(&bar).await?;

    println!("{}", metrics.render());
    Ok(())
}
