//! # Taproom Inventory Runtime
//!
//! Async orchestration of taproom inventory counts on top of
//! `taproom-inventory-core`.
//!
//! ## Components
//!
//! - [`InventoryEngine`]: session lifecycle, count recording, variance preview
//!   and reconciliation into live stock
//! - [`SyncCoordinator`] and [`OfflineLog`]: offline capture with idempotent,
//!   ordered replay
//! - [`DeadLetterQueue`]: bounded list of entries needing manual resolution
//! - [`retry`]: exponential backoff for transient store failures
//! - [`EngineConfig`]: environment-driven configuration
//!
//! Collaborators are injected through [`InventoryEnvironment`]; the in-memory
//! doubles in `taproom-inventory-testing` make the whole engine runnable in
//! tests and demos.

/// Environment-driven configuration
pub mod config;

/// Bounded dead-letter list
pub mod dead_letter;

/// The inventory engine
pub mod engine;

/// Metric descriptions and Prometheus export
pub mod metrics;

/// Offline capture and replay
pub mod offline;

/// Retry logic with exponential backoff
pub mod retry;

pub use config::{EngineConfig, StoreRetryConfig};
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use engine::{InventoryEngine, InventoryEnvironment, RecordCount};
pub use offline::{
    Connectivity, CountSubmitter, FlushSummary, OfflineEntry, OfflineLog, OfflineLogError,
    Recorded, SyncCoordinator, SyncError,
};
pub use retry::RetryPolicy;
