//! Domain types for inventory counting.
//!
//! Everything here is plain data: identifiers, sessions, counts, and the stock
//! records owned by the external [`Store`](crate::environment::Store).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounting::ProductAccounting;

/// Unique identifier for a counting session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random `SessionId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `SessionId` from a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-generated key that makes an offline replay idempotent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// Creates a new random key
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a key from a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier from anything string-like
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// The operator running a count
    ActorId
);
string_id!(
    /// A physical counting area
    ZoneId
);
string_id!(
    /// A stocked product
    ProductId
);
string_id!(
    /// A draft tap line
    TapId
);
string_id!(
    /// A single physical keg
    KegId
);

/// Partition key keeping test data isolated from real stock.
///
/// Threaded explicitly through every call instead of living in a global flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeTag {
    /// Real inventory
    Production,
    /// Training and test data
    Simulation,
}

impl ModeTag {
    /// Stable string form used in logs and metrics labels
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Simulation => "simulation",
        }
    }
}

impl std::fmt::Display for ModeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical counting area such as "Back Bar" or "Walk-in".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Identifier
    pub id: ZoneId,
    /// Display name
    pub name: String,
    /// Optional free-form description
    pub description: Option<String>,
}

impl Zone {
    /// Creates a zone without a description
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ZoneId::new(id),
            name: name.into(),
            description: None,
        }
    }
}

/// Lifecycle status of a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting counts
    InProgress,
    /// Reconciled into stock; terminal
    Completed,
    /// Abandoned without touching stock; terminal
    Cancelled,
}

impl SessionStatus {
    /// Returns `true` for `Completed` and `Cancelled`
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Stable string form
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One counting pass over a zone by one actor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Identifier
    pub id: SessionId,
    /// Who is counting
    pub actor_id: ActorId,
    /// Where they are counting
    pub zone_id: ZoneId,
    /// Production or simulation partition
    pub mode: ModeTag,
    /// Current lifecycle status
    pub status: SessionStatus,
    /// When the session was started
    pub started_at: DateTime<Utc>,
    /// When the session reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a new in-progress session
    #[must_use]
    pub fn start(
        actor_id: ActorId,
        zone_id: ZoneId,
        mode: ModeTag,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            actor_id,
            zone_id,
            mode,
            status: SessionStatus::InProgress,
            started_at,
            completed_at: None,
        }
    }

    /// Returns `true` while the session accepts counts
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::InProgress
    }
}

/// The raw observation an operator enters for one product.
///
/// For unit-sold products `backup_units` is the sealed count and
/// `partial_fraction` the fill of the open container. For volume-sold products
/// `backup_units` is the on-deck keg headcount and `tapped` lists the taps
/// confirmed to be pouring this product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Sealed units, or on-deck kegs
    pub backup_units: i64,
    /// Fraction of one open container, 0..=1
    pub partial_fraction: f64,
    /// Taps confirmed for this product (kegs only)
    #[serde(default)]
    pub tapped: Vec<TapId>,
}

impl Observation {
    /// Observation for a bottle or can product
    #[must_use]
    pub const fn units(backup_units: i64, partial_fraction: f64) -> Self {
        Self {
            backup_units,
            partial_fraction,
            tapped: Vec::new(),
        }
    }

    /// Observation for a keg product
    #[must_use]
    pub const fn kegs(on_deck: i64, tapped: Vec<TapId>) -> Self {
        Self {
            backup_units: on_deck,
            partial_fraction: 0.0,
            tapped,
        }
    }
}

/// Stock level split into sealed units and the open container.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct StockLevel {
    /// Sealed, unopened units
    pub backup_count: i64,
    /// Fraction of one unit currently open
    pub open_fraction: f64,
}

impl StockLevel {
    /// Creates a level from its parts
    #[must_use]
    pub const fn new(backup_count: i64, open_fraction: f64) -> Self {
        Self {
            backup_count,
            open_fraction,
        }
    }

    /// Continuous total in units
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // stock counts are far below 2^53
    pub fn total(&self) -> f64 {
        self.backup_count as f64 + self.open_fraction
    }
}

/// Stock record for a unit-sold product, owned by the external store.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    /// Current level
    pub level: StockLevel,
    /// Last time any subsystem wrote this record
    pub last_modified_at: DateTime<Utc>,
}

/// Keg lifecycle status. Transitions are driven outside this engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KegStatus {
    /// Full and sealed, waiting to be tapped
    OnDeck,
    /// Connected to a tap
    Tapped,
    /// Empty
    Kicked,
}

/// A single physical keg.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KegRecord {
    /// Identifier
    pub id: KegId,
    /// Product in the keg
    pub product_id: ProductId,
    /// Lifecycle status
    pub status: KegStatus,
    /// Tap the keg is connected to, when tapped
    pub tap_id: Option<TapId>,
    /// Volume when full, in millilitres
    pub initial_volume_ml: f64,
    /// Volume remaining, in millilitres
    pub remaining_volume_ml: f64,
}

impl KegRecord {
    /// Remaining fraction of the keg, clamped to 0..=1
    #[must_use]
    pub fn fill_fraction(&self) -> f64 {
        if self.initial_volume_ml <= 0.0 {
            return 0.0;
        }
        (self.remaining_volume_ml / self.initial_volume_ml).clamp(0.0, 1.0)
    }
}

/// Product classification resolved by the external product resolver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductType {
    /// Sold by volume from kegs rather than by the unit
    pub is_sold_by_volume: bool,
    /// Size of one container in millilitres
    pub container_size_ml: f64,
}

/// One current observation of one product within a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Count {
    /// Owning session
    pub session_id: SessionId,
    /// Counted product
    pub product_id: ProductId,
    /// What the operator entered
    pub observation: Observation,
    /// Observation translated for the product's accounting model
    pub accounting: ProductAccounting,
    /// Stock snapshot when observed; `None` if the product had no stock record
    pub expected: Option<StockLevel>,
    /// When the observation was made
    pub observed_at: DateTime<Utc>,
    /// Set when the count arrived through offline replay
    pub idempotency_key: Option<IdempotencyKey>,
    /// Increments each time the count for this product is superseded
    pub version: u32,
}

impl Count {
    /// Expected quantity in units (zero when no stock record existed)
    #[must_use]
    pub fn expected_units(&self) -> f64 {
        self.expected.map_or(0.0, |level| level.total())
    }

    /// Observed quantity in units
    #[must_use]
    pub fn observed_units(&self) -> f64 {
        self.accounting.observed_total()
    }
}

/// What happened when a count was submitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// First count for the product in this session
    Inserted(Count),
    /// Replaced an earlier count for the product
    Replaced(Count),
    /// The idempotency key was already applied; nothing changed
    Duplicate(Count),
    /// A newer observation already exists; nothing changed
    Outdated(Count),
}

impl RecordOutcome {
    /// The count now current for the product
    #[must_use]
    pub const fn count(&self) -> &Count {
        match self {
            Self::Inserted(count)
            | Self::Replaced(count)
            | Self::Duplicate(count)
            | Self::Outdated(count) => count,
        }
    }

    /// Returns `true` if the submission changed session state
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Inserted(_) | Self::Replaced(_))
    }
}

/// A single compare-and-swap write against a stock record.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockWrite {
    /// Level to write
    pub new_level: StockLevel,
    /// `last_modified_at` the write was planned against; `None` if no record existed
    pub expected_last_modified: Option<DateTime<Utc>>,
}

/// One entry of an atomic stock batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockUpdate {
    /// Target product
    pub product_id: ProductId,
    /// The write
    pub write: StockWrite,
}
