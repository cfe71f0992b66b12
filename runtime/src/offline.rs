//! Offline count capture and replay.
//!
//! While the client is disconnected, counts are appended to a local,
//! append-only JSON-lines log. Each entry gets a monotonic sequence number and
//! a client-generated idempotency key. On reconnect the [`SyncCoordinator`]
//! replays pending entries in sequence order through the same submission path
//! used online; the server treats a repeated key as a no-op.
//!
//! The log is the durability boundary. An entry leaves the replay queue only
//! after the server accepted it (an `acked` record) or it was set aside for
//! the operator (a `dead_lettered` record), so a crash mid-flush neither loses
//! nor duplicates anything: unresolved entries are replayed and the server
//! deduplicates them by key. Dead letters stay in the log, payload included,
//! until the operator resolves them (a `resolved` record).
//!
//! ```text
//! {"record":"queued","sequence":0,"idempotency_key":"…","session_id":"…",…}
//! {"record":"acked","sequence":0}
//! {"record":"dead_lettered","sequence":1,"reason":"…","failed_at":"…"}
//! {"record":"resolved","sequence":1}
//! ```

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taproom_inventory_core::environment::{BoxFuture, Clock};
use taproom_inventory_core::{
    EngineError, IdempotencyKey, Observation, ProductId, RecordOutcome, SessionId, SessionStatus,
};
use thiserror::Error;
use tokio::sync::watch;

use crate::dead_letter::{DeadLetter, DeadLetterQueue};
use crate::engine::{InventoryEngine, RecordCount};

/// A count captured while disconnected
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfflineEntry {
    /// Local position in the log; replay order
    pub sequence: u64,
    /// Key the server uses to deduplicate replays
    pub idempotency_key: IdempotencyKey,
    /// Target session
    pub session_id: SessionId,
    /// Counted product
    pub product_id: ProductId,
    /// What the operator entered
    pub observation: Observation,
    /// When the operator made the observation
    pub observed_at: DateTime<Utc>,
}

impl OfflineEntry {
    /// The submission replaying this entry
    #[must_use]
    pub fn to_request(&self) -> RecordCount {
        RecordCount::new(
            self.session_id,
            self.product_id.clone(),
            self.observation.clone(),
            self.observed_at,
        )
        .with_idempotency_key(self.idempotency_key)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum LogRecord {
    Queued(OfflineEntry),
    Acked {
        sequence: u64,
    },
    DeadLettered {
        sequence: u64,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    Resolved {
        sequence: u64,
    },
    Checkpoint {
        next_sequence: u64,
    },
}

/// What replaying the log's records yields.
#[derive(Debug, Default)]
struct LogState {
    pending: BTreeMap<u64, OfflineEntry>,
    dead_letters: BTreeMap<u64, DeadLetter<OfflineEntry>>,
    next_sequence: u64,
}

impl LogState {
    fn apply(&mut self, record: LogRecord) {
        match record {
            LogRecord::Queued(entry) => {
                self.next_sequence = self.next_sequence.max(entry.sequence + 1);
                self.pending.insert(entry.sequence, entry);
            },
            LogRecord::Acked { sequence } => {
                self.pending.remove(&sequence);
            },
            LogRecord::DeadLettered {
                sequence,
                reason,
                failed_at,
            } => {
                if let Some(payload) = self.pending.remove(&sequence) {
                    self.dead_letters.insert(
                        sequence,
                        DeadLetter {
                            payload,
                            reason,
                            failed_at,
                        },
                    );
                }
            },
            LogRecord::Resolved { sequence } => {
                self.dead_letters.remove(&sequence);
            },
            LogRecord::Checkpoint { next_sequence } => {
                self.next_sequence = self.next_sequence.max(next_sequence);
            },
        }
    }
}

/// Errors from the offline log
#[derive(Error, Debug)]
pub enum OfflineLogError {
    /// Filesystem failure
    #[error("offline log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded
    #[error("offline log encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A complete record in the middle of the log is unreadable
    #[error("offline log corrupt at line {line}")]
    Corrupt {
        /// One-based line number
        line: usize,
    },
}

/// File-backed append-only log of offline counts.
#[derive(Debug)]
pub struct OfflineLog {
    path: PathBuf,
    file: File,
    state: LogState,
}

impl OfflineLog {
    /// Open or create the log at `path`, recovering pending entries and
    /// unresolved dead letters.
    ///
    /// A torn final record, left by a crash mid-append, is truncated.
    ///
    /// # Errors
    ///
    /// [`OfflineLogError::Corrupt`] if a record other than the last one is
    /// unreadable, or any I/O failure.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OfflineLogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let mut state = LogState::default();
        let mut valid_len = 0;
        let lines: Vec<&[u8]> = bytes.split_inclusive(|b| *b == b'\n').collect();

        for (index, line) in lines.iter().enumerate() {
            let is_last = index + 1 == lines.len();
            let complete = line.ends_with(b"\n");
            match serde_json::from_slice::<LogRecord>(line) {
                Ok(record) if complete => {
                    state.apply(record);
                    valid_len += line.len();
                },
                _ if is_last => {
                    tracing::warn!(
                        path = %path.display(),
                        dropped_bytes = line.len(),
                        "Truncating torn record at end of offline log"
                    );
                },
                _ => return Err(OfflineLogError::Corrupt { line: index + 1 }),
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        if (valid_len as u64) < file.metadata()?.len() {
            file.set_len(valid_len as u64)?;
            file.sync_data()?;
        }

        tracing::debug!(
            path = %path.display(),
            pending = state.pending.len(),
            dead_letters = state.dead_letters.len(),
            next_sequence = state.next_sequence,
            "Offline log opened"
        );
        Ok(Self { path, file, state })
    }

    /// Queue a count and make it durable.
    ///
    /// `idempotency_key` is the key the count was, or will be, submitted
    /// under; a count that already reached the server keeps its key so the
    /// replay is recognised as a duplicate.
    ///
    /// # Errors
    ///
    /// Any I/O failure; the entry is then not queued.
    pub fn append(
        &mut self,
        session_id: SessionId,
        product_id: ProductId,
        observation: Observation,
        observed_at: DateTime<Utc>,
        idempotency_key: IdempotencyKey,
    ) -> Result<OfflineEntry, OfflineLogError> {
        let entry = OfflineEntry {
            sequence: self.state.next_sequence,
            idempotency_key,
            session_id,
            product_id,
            observation,
            observed_at,
        };
        self.record(LogRecord::Queued(entry.clone()))?;
        Ok(entry)
    }

    /// Mark an entry accepted by the server.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    pub fn acknowledge(&mut self, sequence: u64) -> Result<(), OfflineLogError> {
        if self.state.pending.contains_key(&sequence) {
            self.record(LogRecord::Acked { sequence })?;
        }
        Ok(())
    }

    /// Set a pending entry aside for manual resolution.
    ///
    /// The entry stays in the log until [`resolve`](Self::resolve) is called
    /// for it. Returns the dead letter, or `None` if `sequence` is not pending.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    pub fn dead_letter(
        &mut self,
        sequence: u64,
        reason: &str,
        failed_at: DateTime<Utc>,
    ) -> Result<Option<DeadLetter<OfflineEntry>>, OfflineLogError> {
        if !self.state.pending.contains_key(&sequence) {
            return Ok(None);
        }
        self.record(LogRecord::DeadLettered {
            sequence,
            reason: reason.to_string(),
            failed_at,
        })?;
        Ok(self.state.dead_letters.get(&sequence).cloned())
    }

    /// Drop a dead letter the operator has dealt with.
    ///
    /// Returns the resolved dead letter, or `None` if there was none for
    /// `sequence`.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    pub fn resolve(
        &mut self,
        sequence: u64,
    ) -> Result<Option<DeadLetter<OfflineEntry>>, OfflineLogError> {
        let Some(letter) = self.state.dead_letters.get(&sequence).cloned() else {
            return Ok(None);
        };
        self.record(LogRecord::Resolved { sequence })?;
        Ok(Some(letter))
    }

    /// Entries waiting for replay, in replay order
    #[must_use]
    pub fn pending(&self) -> Vec<OfflineEntry> {
        self.state.pending.values().cloned().collect()
    }

    /// Dead letters not yet resolved, oldest entry first
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter<OfflineEntry>> {
        self.state.dead_letters.values().cloned().collect()
    }

    /// Number of entries waiting for replay
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.pending.len()
    }

    /// Returns `true` when nothing is waiting for replay
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.pending.is_empty()
    }

    /// Location of the log file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the log to hold only pending entries and unresolved dead
    /// letters.
    ///
    /// The new file is written beside the old one and renamed over it, so a
    /// crash leaves either the old or the new log intact.
    ///
    /// # Errors
    ///
    /// Any I/O failure; the existing log is then left untouched.
    pub fn compact(&mut self) -> Result<(), OfflineLogError> {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".compact");
        let tmp_path = PathBuf::from(tmp_name);

        {
            let mut tmp = File::create(&tmp_path)?;
            let checkpoint = LogRecord::Checkpoint {
                next_sequence: self.state.next_sequence,
            };
            tmp.write_all(&encode(&checkpoint)?)?;
            for (sequence, letter) in &self.state.dead_letters {
                tmp.write_all(&encode(&LogRecord::Queued(letter.payload.clone()))?)?;
                tmp.write_all(&encode(&LogRecord::DeadLettered {
                    sequence: *sequence,
                    reason: letter.reason.clone(),
                    failed_at: letter.failed_at,
                })?)?;
            }
            for entry in self.state.pending.values() {
                tmp.write_all(&encode(&LogRecord::Queued(entry.clone()))?)?;
            }
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)?;
        tracing::debug!(
            pending = self.state.pending.len(),
            dead_letters = self.state.dead_letters.len(),
            "Offline log compacted"
        );
        Ok(())
    }

    // Durable first, then visible in memory.
    fn record(&mut self, record: LogRecord) -> Result<(), OfflineLogError> {
        self.file.write_all(&encode(&record)?)?;
        self.file.sync_data()?;
        self.state.apply(record);
        Ok(())
    }
}

fn encode(record: &LogRecord) -> Result<Vec<u8>, OfflineLogError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}

/// Server-side entry point offline entries are replayed through.
pub trait CountSubmitter: Send + Sync {
    /// Submit one count
    fn submit(&self, request: RecordCount) -> BoxFuture<'_, Result<RecordOutcome, EngineError>>;
}

impl CountSubmitter for InventoryEngine {
    fn submit(&self, request: RecordCount) -> BoxFuture<'_, Result<RecordOutcome, EngineError>> {
        Box::pin(self.submit_count(request))
    }
}

/// Connectivity as reported by the client platform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    /// Server reachable
    Online,
    /// Server unreachable
    Offline,
}

/// Errors from offline capture and replay
#[derive(Error, Debug)]
pub enum SyncError {
    /// A queued entry targets a session that is no longer in progress
    #[error("entry {sequence} targets session {session_id}, which is {status}")]
    StaleSession {
        /// Sequence of the entry
        sequence: u64,
        /// Target session
        session_id: SessionId,
        /// Status found at replay time
        status: SessionStatus,
    },

    /// The server rejected an online submission
    #[error(transparent)]
    Rejected(#[from] EngineError),

    /// The local log failed
    #[error(transparent)]
    Log(#[from] OfflineLogError),
}

/// What happened to a count handed to [`SyncCoordinator::record`]
#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    /// Applied directly on the server
    Submitted(RecordOutcome),
    /// Queued locally for replay
    Queued(OfflineEntry),
}

/// Result of one flush
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Entries the server applied
    pub synced: usize,
    /// Entries the server had already applied
    pub duplicates: usize,
    /// Entries set aside for the operator
    pub dead_lettered: usize,
    /// Entries still pending after the flush
    pub remaining: usize,
}

/// Routes counts online or into the offline log and replays the log on
/// reconnect.
pub struct SyncCoordinator {
    submitter: Arc<dyn CountSubmitter>,
    log: Mutex<OfflineLog>,
    flush_lock: tokio::sync::Mutex<()>,
    connectivity: watch::Receiver<Connectivity>,
    dead_letters: DeadLetterQueue<OfflineEntry>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("connectivity", &*self.connectivity.borrow())
            .field("dead_letters", &self.dead_letters.len())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Create a coordinator over an opened log.
    ///
    /// Dead letters left unresolved in the log are loaded into `dead_letters`.
    #[must_use]
    pub fn new(
        submitter: Arc<dyn CountSubmitter>,
        log: OfflineLog,
        connectivity: watch::Receiver<Connectivity>,
        dead_letters: DeadLetterQueue<OfflineEntry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        for letter in log.dead_letters() {
            dead_letters.push(letter.payload, letter.reason, letter.failed_at);
        }
        Self {
            submitter,
            log: Mutex::new(log),
            flush_lock: tokio::sync::Mutex::new(()),
            connectivity,
            dead_letters,
            clock,
        }
    }

    /// Returns `true` if the last connectivity signal was online
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow() == Connectivity::Online
    }

    /// Entries waiting for replay
    #[must_use]
    pub fn pending(&self) -> Vec<OfflineEntry> {
        self.log().pending()
    }

    /// Most recent entries set aside for the operator.
    ///
    /// The list is bounded; the log keeps every unresolved dead letter, see
    /// [`unresolved_dead_letters`](Self::unresolved_dead_letters).
    #[must_use]
    pub const fn dead_letters(&self) -> &DeadLetterQueue<OfflineEntry> {
        &self.dead_letters
    }

    /// Every dead letter the operator has not resolved yet
    #[must_use]
    pub fn unresolved_dead_letters(&self) -> Vec<DeadLetter<OfflineEntry>> {
        self.log().dead_letters()
    }

    /// Mark a dead letter as dealt with, removing it from the log and the list.
    ///
    /// # Errors
    ///
    /// [`SyncError::Log`] if the local log failed.
    pub fn resolve_dead_letter(
        &self,
        sequence: u64,
    ) -> Result<Option<DeadLetter<OfflineEntry>>, SyncError> {
        let resolved = self.log().resolve(sequence)?;
        if resolved.is_some() {
            self.dead_letters
                .retain(|letter| letter.payload.sequence != sequence);
            tracing::info!(sequence, "Dead letter resolved");
        }
        Ok(resolved)
    }

    /// Record a count made now.
    ///
    /// Online, the count is submitted directly, falling back to the log if
    /// the server is unreachable. Offline, or while older entries are still
    /// pending, it is appended to the log so replay order is preserved.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Rejected`] if the server refused the count outright
    /// - [`SyncError::Log`] if the local log failed
    pub async fn record(
        &self,
        session_id: SessionId,
        product_id: ProductId,
        observation: Observation,
    ) -> Result<Recorded, SyncError> {
        let observed_at = self.clock.now();
        let idempotency_key = IdempotencyKey::new();
        let backlog = !self.log().is_empty();

        if self.is_online() && !backlog {
            let request = RecordCount::new(
                session_id,
                product_id.clone(),
                observation.clone(),
                observed_at,
            )
            .with_idempotency_key(idempotency_key);
            match self.submitter.submit(request).await {
                Ok(outcome) => return Ok(Recorded::Submitted(outcome)),
                Err(err) if err.is_transient() => {
                    tracing::warn!(error = %err, "Submission failed, queuing count offline");
                },
                Err(err) => return Err(err.into()),
            }
        }

        let entry = self.log().append(
            session_id,
            product_id,
            observation,
            observed_at,
            idempotency_key,
        )?;
        tracing::info!(sequence = entry.sequence, "Count queued offline");
        metrics::counter!("inventory.offline.queued").increment(1);

        if self.is_online() {
            self.flush().await?;
        }
        Ok(Recorded::Queued(entry))
    }

    /// Replay pending entries in order.
    ///
    /// Accepted entries are acknowledged, entries the server can never accept
    /// are dead-lettered, and the flush stops at the first transient failure
    /// so later entries are not applied ahead of it. Concurrent flushes are
    /// serialised.
    ///
    /// # Errors
    ///
    /// [`SyncError::Log`] if the local log failed.
    pub async fn flush(&self) -> Result<FlushSummary, SyncError> {
        let _flush = self.flush_lock.lock().await;
        let mut summary = FlushSummary::default();

        for entry in self.pending() {
            match self.submitter.submit(entry.to_request()).await {
                Ok(outcome) => {
                    self.log().acknowledge(entry.sequence)?;
                    if outcome.is_applied() {
                        summary.synced += 1;
                        metrics::counter!("inventory.offline.synced").increment(1);
                    } else {
                        summary.duplicates += 1;
                    }
                    tracing::debug!(sequence = entry.sequence, "Offline entry synced");
                },
                Err(err) if err.is_transient() => {
                    tracing::warn!(
                        sequence = entry.sequence,
                        error = %err,
                        "Replay interrupted, keeping remaining entries queued"
                    );
                    break;
                },
                Err(err) => {
                    let reason = match err {
                        EngineError::SessionNotActive { session_id, status } => {
                            SyncError::StaleSession {
                                sequence: entry.sequence,
                                session_id,
                                status,
                            }
                            .to_string()
                        },
                        other => other.to_string(),
                    };
                    let letter = self
                        .log()
                        .dead_letter(entry.sequence, &reason, self.clock.now())?;
                    if let Some(letter) = letter {
                        self.dead_letters
                            .push(letter.payload, letter.reason, letter.failed_at);
                    }
                    summary.dead_lettered += 1;
                    metrics::counter!("inventory.offline.dead_lettered").increment(1);
                },
            }
        }

        {
            let mut log = self.log();
            summary.remaining = log.len();
            if log.is_empty() {
                log.compact()?;
            }
        }

        if summary.synced + summary.duplicates + summary.dead_lettered > 0 {
            tracing::info!(
                synced = summary.synced,
                duplicates = summary.duplicates,
                dead_lettered = summary.dead_lettered,
                remaining = summary.remaining,
                "Offline log flushed"
            );
        }
        Ok(summary)
    }

    /// Flush whenever connectivity comes back, until the signal's sender is dropped.
    ///
    /// # Errors
    ///
    /// [`SyncError::Log`] if the local log failed.
    pub async fn run(&self) -> Result<(), SyncError> {
        let mut connectivity = self.connectivity.clone();
        loop {
            let state = *connectivity.borrow_and_update();
            if state == Connectivity::Online {
                self.flush().await?;
            }
            if connectivity.changed().await.is_err() {
                tracing::debug!("Connectivity signal closed, stopping sync");
                return Ok(());
            }
        }
    }

    fn log(&self) -> std::sync::MutexGuard<'_, OfflineLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn append(log: &mut OfflineLog, product: &str) -> OfflineEntry {
        log.append(
            SessionId::new(),
            ProductId::new(product),
            Observation::units(3, 0.25),
            Utc::now(),
            IdempotencyKey::new(),
        )
        .unwrap()
    }

    #[test]
    fn pending_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offline.log");

        let mut log = OfflineLog::open(&path).unwrap();
        let first = append(&mut log, "gin");
        let second = append(&mut log, "rum");
        log.acknowledge(first.sequence).unwrap();
        drop(log);

        let mut log = OfflineLog::open(&path).unwrap();
        assert_eq!(log.pending(), vec![second]);
        let third = append(&mut log, "vodka");
        assert_eq!(third.sequence, 2);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offline.log");

        let mut log = OfflineLog::open(&path).unwrap();
        let entry = append(&mut log, "gin");
        drop(log);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"record":"acked","seq"#).unwrap();
        drop(file);

        let log = OfflineLog::open(&path).unwrap();
        assert_eq!(log.pending(), vec![entry]);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with('\n'));
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn corrupt_record_in_the_middle_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offline.log");

        let mut log = OfflineLog::open(&path).unwrap();
        append(&mut log, "gin");
        drop(log);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"garbage\n{\"record\":\"acked\",\"sequence\":0}\n")
            .unwrap();
        drop(file);
        let log = OfflineLog::open(&path);
        assert!(matches!(log, Err(OfflineLogError::Corrupt { line: 2 })));
    }

    #[test]
    fn compaction_keeps_pending_and_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offline.log");

        let mut log = OfflineLog::open(&path).unwrap();
        let first = append(&mut log, "gin");
        let second = append(&mut log, "rum");
        log.acknowledge(first.sequence).unwrap();
        log.compact().unwrap();
        log.acknowledge(second.sequence).unwrap();
        log.compact().unwrap();
        drop(log);

        let mut log = OfflineLog::open(&path).unwrap();
        assert!(log.is_empty());
        assert_eq!(append(&mut log, "vodka").sequence, 2);
    }

    #[test]
    fn dead_letters_survive_compaction_until_resolved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offline.log");

        let mut log = OfflineLog::open(&path).unwrap();
        let stale = append(&mut log, "gin");
        let failed_at = Utc::now();
        let letter = log
            .dead_letter(stale.sequence, "session cancelled", failed_at)
            .unwrap()
            .unwrap();
        assert_eq!(letter.payload, stale);
        assert!(log.is_empty());
        log.compact().unwrap();
        drop(log);

        let mut log = OfflineLog::open(&path).unwrap();
        assert!(log.is_empty());
        let letters = log.dead_letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].payload, stale);
        assert_eq!(letters[0].reason, "session cancelled");
        assert_eq!(letters[0].failed_at, failed_at);

        assert!(log.resolve(stale.sequence).unwrap().is_some());
        assert!(log.resolve(stale.sequence).unwrap().is_none());
        log.compact().unwrap();
        drop(log);

        let mut log = OfflineLog::open(&path).unwrap();
        assert!(log.dead_letters().is_empty());
        assert_eq!(append(&mut log, "rum").sequence, 1);
    }
}
