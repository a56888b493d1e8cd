//! Per-connection map from transaction id to live engine transaction.

use std::collections::HashMap;
use std::sync::Arc;

use ordo_engine::Transaction;
use ordo_types::{TransactionId, TransactionIdAllocator};
use parking_lot::Mutex;

/// Transaction registry, scoped to one connection.
///
/// Every worker of the connection inserts and looks up its own id here, so
/// the map is internally synchronized; the lock is held only for the
/// duration of one engine call (each id is only ever touched by its own
/// worker thread, so there is no contention on a single entry).
///
/// Id allocation delegates to the process-wide counter: registries are
/// per-connection but ids are globally unique.
#[derive(Debug)]
pub struct TransactionRegistry {
    ids: Arc<TransactionIdAllocator>,
    map: Mutex<HashMap<i64, Transaction>>,
}

impl TransactionRegistry {
    #[must_use]
    pub fn new(ids: Arc<TransactionIdAllocator>) -> Self {
        Self {
            ids,
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh, globally unique id.
    pub fn generate_id(&self) -> TransactionId {
        self.ids.allocate()
    }

    /// Register a live engine transaction under `id`.
    pub fn store(&self, id: TransactionId, tx: Transaction) {
        self.map.lock().insert(id.get(), tx);
    }

    /// Run `f` against the transaction registered under `id`, if any.
    pub fn with_transaction<R>(&self, id: i64, f: impl FnOnce(&mut Transaction) -> R) -> Option<R> {
        self.map.lock().get_mut(&id).map(f)
    }

    /// Take the transaction registered under `id` out of the registry.
    #[must_use]
    pub fn remove(&self, id: i64) -> Option<Transaction> {
        self.map.lock().remove(&id)
    }

    /// Number of live transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}
