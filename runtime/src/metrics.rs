//! Metric descriptions and Prometheus export.
//!
//! The engine emits through the `metrics` facade; nothing is recorded until
//! the host installs a recorder. [`install_prometheus`] installs the
//! Prometheus recorder and returns a handle for rendering the text format.
//!
//! # Example
//!
//! ```rust,no_run
//! use taproom_inventory_runtime::metrics::install_prometheus;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_prometheus()?;
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install the recorder, usually because one is already installed
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Install the Prometheus recorder globally and describe the engine's metrics.
///
/// # Errors
///
/// [`MetricsError::Install`] if a recorder is already installed.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    describe_metrics();
    tracing::debug!("Prometheus recorder installed");
    Ok(handle)
}

/// Register descriptions for every metric the engine emits.
pub fn describe_metrics() {
    describe_counter!("inventory.sessions.started", "Counting sessions started");
    describe_counter!("inventory.sessions.completed", "Counting sessions completed");
    describe_counter!("inventory.sessions.cancelled", "Counting sessions cancelled");

    describe_counter!("inventory.counts.recorded", "Counts inserted or replaced");
    describe_counter!(
        "inventory.counts.duplicate",
        "Count submissions ignored because their idempotency key was already applied"
    );

    describe_counter!(
        "inventory.reconcile.conflicts",
        "Products whose stock changed during the session and were reconciled by delta"
    );
    describe_counter!(
        "inventory.reconcile.cas_retries",
        "Stock batches rejected by compare-and-swap and re-planned"
    );

    describe_counter!("inventory.offline.queued", "Counts queued in the offline log");
    describe_counter!("inventory.offline.synced", "Offline counts applied on replay");
    describe_counter!(
        "inventory.offline.dead_lettered",
        "Offline counts set aside because they can never be applied"
    );

    describe_gauge!("inventory.dead_letter.size", "Entries in the dead-letter list");
    describe_counter!(
        "inventory.dead_letter.dropped",
        "Dead-letter entries dropped because the list was full"
    );
}
