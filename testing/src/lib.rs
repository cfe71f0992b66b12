//! # Taproom Inventory Testing
//!
//! In-memory collaborators for exercising the inventory engine without a
//! database, a product catalogue, or a keg sensor.
//!
//! This crate provides:
//! - [`InMemoryStore`]: stock and keg records with compare-and-swap batches,
//!   plus hooks for simulating receiving, sales, outages and interleaved writes
//! - [`InMemorySessionRepository`]: sessions and counts
//! - [`StaticProductResolver`] and [`ScriptedKegObserver`]
//! - [`FixedClock`] and [`ManualClock`] for deterministic time
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use taproom_inventory_testing::{InMemoryStore, ManualClock};
//! use taproom_inventory_core::environment::Clock;
//!
//! let clock = Arc::new(ManualClock::default());
//! let _store = InMemoryStore::new(clock.clone());
//! let t0 = clock.now();
//! clock.advance(chrono::Duration::minutes(5));
//! assert!(clock.now() > t0);
//! ```

pub mod collaborators;
pub mod repository;
pub mod store;

/// Deterministic clocks.
pub mod mocks {
    use std::sync::{Mutex, PoisonError};

    use chrono::{DateTime, Duration, Utc};
    use taproom_inventory_core::environment::Clock;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use taproom_inventory_testing::mocks::FixedClock;
    /// use taproom_inventory_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Starts at 2025-01-01 00:00:00 UTC by default.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock at the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(epoch())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }
}

// Re-export commonly used items
pub use collaborators::{ScriptedKegObserver, StaticProductResolver};
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use repository::InMemorySessionRepository;
pub use store::InMemoryStore;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use taproom_inventory_core::environment::Clock;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::minutes(15));
        assert_eq!(clock.now() - start, Duration::minutes(15));
    }
}
