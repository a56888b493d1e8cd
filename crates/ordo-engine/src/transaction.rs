//! The transaction handle: private read/write sets over the committed store.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::debug;

use crate::database::{Database, TxShared};

/// An in-progress transaction.
///
/// The handle owns its write set and a pin table for values handed out by
/// [`Transaction::read`]: a returned slice stays valid (same bytes, same
/// address) for as long as the handle lives, matching the lifetime the
/// engine promises for read results. Handles are `Send` but must only be
/// used by one thread at a time.
#[derive(Debug)]
pub struct Transaction {
    db: Arc<Database>,
    seq: u64,
    shared: Arc<TxShared>,
    /// Pending writes; an empty value is a delete.
    writes: BTreeMap<Vec<u8>, Vec<u8>>,
    /// First-read results, pinned for pointer stability and repeatability.
    pins: HashMap<Vec<u8>, Option<Box<[u8]>>>,
    ended: bool,
}

impl Transaction {
    pub(crate) fn new(db: Arc<Database>, seq: u64, shared: Arc<TxShared>) -> Self {
        Self {
            db,
            seq,
            shared,
            writes: BTreeMap::new(),
            pins: HashMap::new(),
            ended: false,
        }
    }

    /// Read `key`. Own pending writes win; otherwise the first committed
    /// observation is pinned and every later read of the same key returns
    /// the pinned bytes (repeatable within the transaction).
    pub fn read(&mut self, key: &[u8]) -> Option<&[u8]> {
        if let Some(pending) = self.writes.get(key) {
            if pending.is_empty() {
                return None;
            }
            return Some(pending.as_slice());
        }
        if !self.pins.contains_key(key) {
            let (version, value) = self.db.committed(key);
            self.shared.record_read(key, version);
            self.pins.insert(key.to_vec(), value.map(Vec::into_boxed_slice));
        }
        self.pins.get(key).and_then(|pin| pin.as_deref())
    }

    /// Buffer a write. An empty `value` deletes the key at commit.
    pub fn write(&mut self, key: &[u8], value: &[u8]) {
        self.writes.insert(key.to_vec(), value.to_vec());
    }

    /// Visit keys in `[start, end)` in ascending order, merging the
    /// committed store with this transaction's own writes (pending writes
    /// shadow committed values, pending deletes hide them). The visitor
    /// returns `true` to stop. Committed keys visited by the scan join the
    /// read set.
    pub fn scan(
        &mut self,
        start: &[u8],
        end: Option<&[u8]>,
        mut visitor: impl FnMut(&[u8], &[u8]) -> bool,
    ) {
        // Snapshot the committed range first, recording observed versions.
        let mut committed: Vec<(Vec<u8>, Option<Vec<u8>>)> = Vec::new();
        {
            let shared = &self.shared;
            self.db.scan_committed(start, end, |key, version, value| {
                shared.record_read(key, version);
                committed.push((key.to_vec(), value.map(<[u8]>::to_vec)));
                false
            });
        }

        let upper = match end {
            Some(e) => Bound::Excluded(e),
            None => Bound::Unbounded,
        };
        let pending: Vec<(&[u8], &[u8])> = self
            .writes
            .range::<[u8], _>((Bound::Included(start), upper))
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();

        // Two-pointer merge; a pending write shadows the committed entry
        // under the same key, an empty pending value hides it.
        let mut merged: Vec<(&[u8], &[u8])> = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < committed.len() || j < pending.len() {
            let take_committed = match (committed.get(i), pending.get(j)) {
                (Some((ck, _)), Some((pk, _))) => ck.as_slice() < *pk,
                (Some(_), None) => true,
                _ => false,
            };
            if take_committed {
                let (ck, cv) = &committed[i];
                i += 1;
                if let Some(v) = cv.as_deref() {
                    merged.push((ck.as_slice(), v));
                }
            } else {
                let (pk, pv) = pending[j];
                j += 1;
                if committed.get(i).is_some_and(|(ck, _)| ck.as_slice() == pk) {
                    i += 1;
                }
                if !pv.is_empty() {
                    merged.push((pk, pv));
                }
            }
        }

        for (key, value) in merged {
            if visitor(key, value) {
                break;
            }
        }
    }

    /// Mark this transaction aborted. Idempotent; the commit path refuses
    /// an aborted transaction.
    pub fn abort(&self) {
        self.shared.aborted.store(true, Ordering::Release);
    }

    /// Whether the conflict detector (or an explicit [`Transaction::abort`])
    /// has doomed this transaction.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_ended(&mut self) {
        self.ended = true;
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn shared(&self) -> Arc<TxShared> {
        Arc::clone(&self.shared)
    }

    pub(crate) fn take_writes(&mut self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        std::mem::take(&mut self.writes)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.ended {
            self.shared.aborted.store(true, Ordering::Release);
            self.db.deregister(self.seq);
            debug!(seq = self.seq, "transaction dropped without end; treated as aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::EngineConfig;
    use crate::database::Database;

    fn db() -> Arc<Database> {
        Arc::new(Database::new(EngineConfig::default()))
    }

    fn collect_scan(
        tx: &mut crate::Transaction,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        tx.scan(start, end, |k, v| {
            out.push((k.to_vec(), v.to_vec()));
            false
        });
        out
    }

    #[test]
    fn read_your_own_write() {
        let db = db();
        let mut tx = db.begin_transaction();
        assert_eq!(tx.read(b"k"), None);
        tx.write(b"k", b"v");
        assert_eq!(tx.read(b"k"), Some(&b"v"[..]));
        tx.write(b"k", b"");
        assert_eq!(tx.read(b"k"), None);
        assert!(db.end_transaction(tx, |_| ()));
    }

    #[test]
    fn reads_are_repeatable_under_concurrent_commit() {
        let db = db();
        let mut setup = db.begin_transaction();
        setup.write(b"k", b"old");
        assert!(db.end_transaction(setup, |_| ()));

        let mut reader = db.begin_transaction();
        assert_eq!(reader.read(b"k"), Some(&b"old"[..]));

        let mut writer = db.begin_transaction();
        writer.write(b"k", b"new");
        assert!(db.end_transaction(writer, |_| ()));

        // Pinned first observation, not the later committed value.
        assert_eq!(reader.read(b"k"), Some(&b"old"[..]));
        assert!(!db.end_transaction(reader, |_| ()));
    }

    #[test]
    fn scan_merges_pending_writes() {
        let db = db();
        let mut setup = db.begin_transaction();
        setup.write(b"a", b"1");
        setup.write(b"c", b"3");
        setup.write(b"e", b"5");
        assert!(db.end_transaction(setup, |_| ()));

        let mut tx = db.begin_transaction();
        tx.write(b"b", b"2"); // insert between committed keys
        tx.write(b"c", b"3x"); // shadow a committed value
        tx.write(b"e", b""); // delete a committed key

        let got = collect_scan(&mut tx, b"a", None);
        assert_eq!(
            got,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"3x".to_vec()),
            ]
        );
        assert!(db.end_transaction(tx, |_| ()));
    }

    #[test]
    fn scan_respects_bounds_and_stop() {
        let db = db();
        let mut setup = db.begin_transaction();
        for k in [b"a1", b"a2", b"a3", b"b1"] {
            setup.write(k, b"v");
        }
        assert!(db.end_transaction(setup, |_| ()));

        let mut tx = db.begin_transaction();
        // Exclusive end bound.
        let got = collect_scan(&mut tx, b"a1", Some(b"a3"));
        assert_eq!(
            got.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![b"a1".to_vec(), b"a2".to_vec()]
        );

        // Early stop after the first key.
        let mut seen = 0;
        tx.scan(b"a1", None, |_, _| {
            seen += 1;
            true
        });
        assert_eq!(seen, 1);
        assert!(db.end_transaction(tx, |_| ()));
    }

    #[test]
    fn scan_observations_validate_at_commit() {
        let db = db();
        let mut setup = db.begin_transaction();
        setup.write(b"a1", b"v");
        assert!(db.end_transaction(setup, |_| ()));

        let mut scanner = db.begin_transaction();
        let got = collect_scan(&mut scanner, b"a", None);
        assert_eq!(got.len(), 1);

        let mut writer = db.begin_transaction();
        writer.write(b"a1", b"changed");
        assert!(db.end_transaction(writer, |_| ()));

        assert!(!db.end_transaction(scanner, |_| ()));
    }
}
