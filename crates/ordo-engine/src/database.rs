//! The committed store, the active-transaction table and the commit path.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::transaction::Transaction;

/// Outcome reported to the status callback of `end_transaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Committed,
    Aborted,
}

/// A committed record. Deletes keep a versioned tombstone so a re-insert of
/// the key cannot alias an older observed version.
#[derive(Debug, Clone)]
pub(crate) struct CommittedRecord {
    pub(crate) version: u64,
    pub(crate) value: Option<Vec<u8>>,
}

/// State shared between a transaction handle and the engine's conflict
/// detector: the abort flag the detector raises, plus the read footprint a
/// committer inspects when deciding which active transactions lost.
#[derive(Debug, Default)]
pub(crate) struct TxShared {
    pub(crate) aborted: AtomicBool,
    /// key -> first observed committed version (0 = observed absent).
    reads: Mutex<HashMap<Vec<u8>, u64>>,
}

impl TxShared {
    /// Record an observed version. First observation wins; a later re-read
    /// must not mask the version the transaction actually acted on.
    pub(crate) fn record_read(&self, key: &[u8], version: u64) {
        self.reads
            .lock()
            .entry(key.to_vec())
            .or_insert(version);
    }

    fn reads_snapshot(&self) -> Vec<(Vec<u8>, u64)> {
        self.reads
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    fn reads_any_of(&self, keys: &[Vec<u8>]) -> bool {
        let reads = self.reads.lock();
        keys.iter().any(|k| reads.contains_key(k))
    }
}

/// The process-wide engine instance.
///
/// Constructed once at gateway start and shared by capability
/// (`Arc<Database>`); methods are callable from any number of worker threads
/// concurrently, but a given [`Transaction`] handle belongs to one thread.
#[derive(Debug)]
pub struct Database {
    config: EngineConfig,
    store: RwLock<BTreeMap<Vec<u8>, CommittedRecord>>,
    active: Mutex<HashMap<u64, Arc<TxShared>>>,
    /// Serializes validation + install; doubles as the fence point.
    commit_lock: Mutex<()>,
    next_tx_seq: AtomicU64,
    next_version: AtomicU64,
}

impl Database {
    /// Build the engine with the given fixed configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            store: RwLock::new(BTreeMap::new()),
            active: Mutex::new(HashMap::new()),
            commit_lock: Mutex::new(()),
            next_tx_seq: AtomicU64::new(1),
            next_version: AtomicU64::new(1),
        }
    }

    /// The configuration this engine was constructed with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a transaction. The returned handle must stay on one thread at a
    /// time and must eventually reach [`Database::end_transaction`] (dropping
    /// it without ending counts as an abort).
    #[must_use]
    pub fn begin_transaction(self: &Arc<Self>) -> Transaction {
        let seq = self.next_tx_seq.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(TxShared::default());
        self.active.lock().insert(seq, Arc::clone(&shared));
        trace!(seq, "engine transaction started");
        Transaction::new(Arc::clone(self), seq, shared)
    }

    /// Commit-or-abort `tx`. Returns `true` iff the transaction committed.
    ///
    /// Validation and write installation run under the global commit lock:
    /// every read-set entry must still carry the version the transaction
    /// observed. On success the write set is installed with fresh versions
    /// and, when configured, every still-active transaction that read one of
    /// the installed keys is marked aborted.
    pub fn end_transaction(
        &self,
        mut tx: Transaction,
        status_callback: impl FnOnce(TxStatus),
    ) -> bool {
        tx.mark_ended();
        let seq = tx.seq();
        let shared = tx.shared();
        let writes = tx.take_writes();

        let commit_guard = self.commit_lock.lock();

        let committed = if shared.aborted.load(Ordering::Acquire) {
            false
        } else {
            self.validate_reads(&shared)
        };

        let installed: Vec<Vec<u8>> = if committed {
            self.install_writes(writes)
        } else {
            Vec::new()
        };

        self.active.lock().remove(&seq);

        if self.config.eager_abort && !installed.is_empty() {
            self.abort_conflicting_readers(seq, &installed);
        }
        drop(commit_guard);

        debug!(seq, committed, "engine transaction ended");
        status_callback(if committed {
            TxStatus::Committed
        } else {
            TxStatus::Aborted
        });
        committed
    }

    /// Global barrier: serializes against the commit lock, so every commit
    /// that completed before the fence returns is visible afterwards.
    pub fn fence(&self) {
        drop(self.commit_lock.lock());
    }

    fn validate_reads(&self, shared: &TxShared) -> bool {
        let store = self.store.read();
        for (key, observed) in shared.reads_snapshot() {
            let current = store.get(&key).map_or(0, |rec| rec.version);
            if current != observed {
                trace!(
                    key_len = key.len(),
                    observed,
                    current,
                    "read validation failed"
                );
                return false;
            }
        }
        true
    }

    fn install_writes(&self, writes: BTreeMap<Vec<u8>, Vec<u8>>) -> Vec<Vec<u8>> {
        if writes.is_empty() {
            return Vec::new();
        }
        let mut store = self.store.write();
        let mut installed = Vec::with_capacity(writes.len());
        for (key, value) in writes {
            let version = self.next_version.fetch_add(1, Ordering::Relaxed);
            let value = if value.is_empty() { None } else { Some(value) };
            store.insert(key.clone(), CommittedRecord { version, value });
            installed.push(key);
        }
        installed
    }

    fn abort_conflicting_readers(&self, committer_seq: u64, installed: &[Vec<u8>]) {
        let active = self.active.lock();
        for (&seq, shared) in active.iter() {
            if seq == committer_seq {
                continue;
            }
            if shared.reads_any_of(installed) {
                shared.aborted.store(true, Ordering::Release);
                debug!(loser = seq, winner = committer_seq, "conflicting reader aborted");
            }
        }
    }

    /// Version and value of a committed key. Version 0 means "absent".
    pub(crate) fn committed(&self, key: &[u8]) -> (u64, Option<Vec<u8>>) {
        let store = self.store.read();
        match store.get(key) {
            Some(rec) => (rec.version, rec.value.clone()),
            None => (0, None),
        }
    }

    /// Visit committed records in `[start, end)` (`end = None` is unbounded)
    /// in ascending key order. The visitor sees tombstones as `None` values
    /// and returns `true` to stop.
    pub(crate) fn scan_committed(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        mut visitor: impl FnMut(&[u8], u64, Option<&[u8]>) -> bool,
    ) {
        let store = self.store.read();
        let upper = match end {
            Some(e) => Bound::Excluded(e),
            None => Bound::Unbounded,
        };
        for (key, rec) in store.range::<[u8], _>((Bound::Included(start), upper)) {
            if visitor(key, rec.version, rec.value.as_deref()) {
                break;
            }
        }
    }

    /// Deregister an abandoned transaction (handle dropped without end).
    pub(crate) fn deregister(&self, seq: u64) {
        self.active.lock().remove(&seq);
    }

    #[cfg(test)]
    pub(crate) fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}
