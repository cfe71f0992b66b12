//! # Taproom Inventory Core
//!
//! Domain types and pure logic for physical inventory counts in a taproom.
//!
//! A count runs as a [`Session`](types::Session) over one zone. Operators
//! record one [`Count`](types::Count) per product; bottles and cans are counted
//! by hand while tapped kegs report their level through a sensor. When the
//! session completes, the counts are reconciled into the shared stock record,
//! which receiving and POS sales sync may have changed in the meantime.
//!
//! ## Modules
//!
//! - [`types`]: identifiers, sessions, counts, stock and keg records
//! - [`session`]: lifecycle state machine
//! - [`accounting`]: dual accounting for unit-sold versus volume-sold products
//! - [`variance`]: expected versus counted, with severity
//! - [`reconcile`]: delta-preserving write-back planning
//! - [`environment`]: collaborator traits (`Store`, `ProductResolver`,
//!   `KegLevelObserver`, `SessionRepository`, `Clock`)
//! - [`error`]: error types
//!
//! Nothing in this crate performs I/O. The async orchestration lives in
//! `taproom-inventory-runtime`.
//!
//! ## Example
//!
//! ```
//! use taproom_inventory_core::variance::{classify, Severity, VarianceThresholds};
//!
//! let thresholds = VarianceThresholds::default();
//! assert_eq!(classify(10.0, 13.0, &thresholds), Severity::Large);
//! assert_eq!(classify(10.0, 11.0, &thresholds), Severity::Minor);
//! ```

pub mod accounting;
pub mod environment;
pub mod error;
pub mod reconcile;
pub mod session;
pub mod types;
pub mod variance;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{
    EngineError, ObserverError, RepositoryError, ResolverError, StoreError, ValidationError,
};
pub use types::{
    ActorId, Count, IdempotencyKey, KegId, KegRecord, KegStatus, ModeTag, Observation, ProductId,
    ProductType, RecordOutcome, Session, SessionId, SessionStatus, StockLevel, StockRecord,
    StockUpdate, StockWrite, TapId, Zone, ZoneId,
};
