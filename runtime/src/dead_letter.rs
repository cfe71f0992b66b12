//! Bounded dead-letter list for work that cannot be applied automatically.
//!
//! Offline count entries whose session was completed or cancelled before they
//! reached the server end up here, so the operator can see what was not
//! applied instead of losing it silently. The list is an in-memory view; the
//! offline log keeps each dead letter durable until it is resolved.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An entry that failed and was set aside
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter<T> {
    /// The failed payload
    pub payload: T,
    /// Why it failed
    pub reason: String,
    /// When it was set aside
    pub failed_at: DateTime<Utc>,
}

/// Dead letter queue for entries that need manual resolution
///
/// - Bounded; the oldest entry is dropped when full
/// - FIFO ordering
/// - Cheap to clone; clones share the same storage
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use taproom_inventory_runtime::DeadLetterQueue;
///
/// let dlq = DeadLetterQueue::new(100);
/// dlq.push("entry-1".to_string(), "session cancelled".to_string(), Utc::now());
/// assert_eq!(dlq.len(), 1);
/// assert_eq!(dlq.drain()[0].payload, "entry-1");
/// ```
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    queue: Arc<Mutex<VecDeque<DeadLetter<T>>>>,
    max_size: usize,
}

impl<T> DeadLetterQueue<T> {
    /// Create a new dead letter queue holding at most `max_size` entries
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            max_size: max_size.max(1),
        }
    }

    /// Set an entry aside, dropping the oldest one if the queue is full
    pub fn push(&self, payload: T, reason: String, failed_at: DateTime<Utc>) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);

        if queue.len() >= self.max_size {
            queue.pop_front();
            metrics::counter!("inventory.dead_letter.dropped").increment(1);
            tracing::warn!(max_size = self.max_size, "Dead letter list full, dropping oldest entry");
        }

        tracing::warn!(reason = %reason, size = queue.len() + 1, "Entry moved to dead letter list");
        queue.push_back(DeadLetter {
            payload,
            reason,
            failed_at,
        });

        #[allow(clippy::cast_precision_loss)] // bounded by max_size
        let size = queue.len() as f64;
        metrics::gauge!("inventory.dead_letter.size").set(size);
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if nothing has been set aside
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return all entries, oldest first
    pub fn drain(&self) -> Vec<DeadLetter<T>> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let entries: Vec<_> = queue.drain(..).collect();
        metrics::gauge!("inventory.dead_letter.size").set(0.0);
        tracing::info!(count = entries.len(), "Drained dead letter list");
        entries
    }

    /// Keep only the entries for which `keep` returns `true`
    pub fn retain(&self, keep: impl FnMut(&DeadLetter<T>) -> bool) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.retain(keep);

        #[allow(clippy::cast_precision_loss)] // bounded by max_size
        let size = queue.len() as f64;
        metrics::gauge!("inventory.dead_letter.size").set(size);
    }

    /// Copy of all entries, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeadLetter<T>>
    where
        T: Clone,
    {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Maximum number of entries kept
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<T> Clone for DeadLetterQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            max_size: self.max_size,
        }
    }
}

impl<T> Default for DeadLetterQueue<T> {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_entry_is_dropped_when_full() {
        let dlq = DeadLetterQueue::new(2);
        let now = Utc::now();
        dlq.push(1, "a".to_string(), now);
        dlq.push(2, "b".to_string(), now);
        dlq.push(3, "c".to_string(), now);

        let payloads: Vec<_> = dlq.snapshot().into_iter().map(|d| d.payload).collect();
        assert_eq!(payloads, vec![2, 3]);
    }

    #[test]
    fn clones_share_storage() {
        let dlq = DeadLetterQueue::new(10);
        let other = dlq.clone();
        other.push("x", "stale".to_string(), Utc::now());
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq.drain().len(), 1);
        assert!(other.is_empty());
    }

    #[test]
    fn retain_removes_resolved_entries() {
        let dlq = DeadLetterQueue::new(10);
        let now = Utc::now();
        for n in 1..=3 {
            dlq.push(n, "stale".to_string(), now);
        }
        dlq.retain(|letter| letter.payload != 2);

        let payloads: Vec<_> = dlq.snapshot().into_iter().map(|d| d.payload).collect();
        assert_eq!(payloads, vec![1, 3]);
    }
}
