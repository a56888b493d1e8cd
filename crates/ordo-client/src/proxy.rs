//! The handler-facing transaction proxy.
//!
//! When the engine ran in-process, a read handed back a pointer into its
//! version store that stayed valid until transaction end. Across RPC the
//! server's bytes die with the response, so the proxy re-creates that
//! contract with a statement-scoped cache: every value returned to the
//! handler lives in a boxed slice the proxy owns, at a stable address, until
//! the proxy is dropped at end-of-transaction.

use std::collections::HashMap;
use std::sync::Arc;

use ordo_types::TransactionId;
use ordo_error::{OrdoError, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::session::HostSession;
use crate::socket::GatewayClient;

/// Statement-scoped façade over one gateway transaction.
///
/// The client handle is shared (one socket per host process, many statement
/// proxies over its lifetime); the cache, the table prefix and the abort
/// flag are per-proxy.
pub struct TransactionProxy<S: HostSession> {
    client: Arc<Mutex<GatewayClient>>,
    session: S,
    table_prefix: Vec<u8>,
    tx_id: Option<TransactionId>,
    aborted: bool,
    /// Unprefixed key -> value bytes at a stable address.
    cache: HashMap<Vec<u8>, Box<[u8]>>,
}

impl<S: HostSession> TransactionProxy<S> {
    #[must_use]
    pub fn new(client: Arc<Mutex<GatewayClient>>, session: S) -> Self {
        Self {
            client,
            session,
            table_prefix: Vec::new(),
            tx_id: None,
            aborted: false,
            cache: HashMap::new(),
        }
    }

    /// Choose the table every subsequent key is prefixed with.
    pub fn choose_table(&mut self, name: &[u8]) {
        self.table_prefix = name.to_vec();
    }

    /// The chosen table prefix.
    #[must_use]
    pub fn table_name(&self) -> &[u8] {
        &self.table_prefix
    }

    #[must_use]
    pub fn is_not_started(&self) -> bool {
        self.tx_id.is_none()
    }

    /// Whether the engine (or a failed RPC) has doomed this transaction.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    fn table_is_not_chosen(&self) -> bool {
        if self.table_prefix.is_empty() {
            warn!("no table chosen; returning neutral result");
            return true;
        }
        false
    }

    fn prefixed(&self, key: &[u8]) -> Vec<u8> {
        let mut full = self.table_prefix.clone();
        full.extend_from_slice(key);
        full
    }

    /// Start the transaction and register it with the host session.
    pub fn begin(&mut self) -> Result<()> {
        if let Some(tx_id) = self.tx_id {
            return Err(OrdoError::AlreadyStarted { tx_id: tx_id.get() });
        }
        let tx_id = self.client.lock().tx_begin()?;
        let multi_statement = self.session.in_multi_statement_txn();
        self.session.register_participant(tx_id, multi_statement);
        self.tx_id = Some(tx_id);
        debug!(%tx_id, multi_statement, "transaction registered with host");
        Ok(())
    }

    /// Read `key` under the chosen table. The returned slice stays valid
    /// (same address) until the proxy is dropped. `None` means absent.
    pub fn read(&mut self, key: &[u8]) -> Option<&[u8]> {
        if self.table_is_not_chosen() {
            return None;
        }
        let Some(tx_id) = self.tx_id else {
            warn!("read before begin");
            return None;
        };
        if !self.cache.contains_key(key) {
            let full_key = self.prefixed(key);
            match self.client.lock().tx_read(tx_id, &full_key) {
                Ok(response) => {
                    self.aborted |= response.is_aborted;
                    match response.value {
                        Some(value) if response.found => {
                            self.cache.insert(key.to_vec(), value.into_boxed_slice());
                        }
                        _ => return None,
                    }
                }
                Err(e) => {
                    // A torn exchange leaves the abort status unknown;
                    // assume the worst.
                    warn!(%tx_id, error = %e, "read rpc failed; assuming aborted");
                    self.aborted = true;
                    return None;
                }
            }
        }
        self.cache.get(key).map(|cached| &**cached)
    }

    /// Write `key` under the chosen table.
    pub fn write(&mut self, key: &[u8], value: &[u8]) -> bool {
        if self.table_is_not_chosen() {
            return false;
        }
        let Some(tx_id) = self.tx_id else {
            warn!("write before begin");
            return false;
        };
        let full_key = self.prefixed(key);
        // The cached bytes no longer reflect this transaction's view.
        self.cache.remove(key);
        match self.client.lock().tx_write(tx_id, &full_key, value) {
            Ok(response) => {
                self.aborted |= response.is_aborted;
                response.success
            }
            Err(e) => {
                warn!(%tx_id, error = %e, "write rpc failed; assuming aborted");
                self.aborted = true;
                false
            }
        }
    }

    /// Delete `key` (a WRITE with an empty value). A key that already
    /// carries the table prefix is used as-is, for callers that pass fully
    /// qualified keys back in.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        if self.table_is_not_chosen() {
            return false;
        }
        let Some(tx_id) = self.tx_id else {
            warn!("delete before begin");
            return false;
        };
        let (full_key, bare_key) = if key.starts_with(&self.table_prefix) {
            (key.to_vec(), key[self.table_prefix.len()..].to_vec())
        } else {
            (self.prefixed(key), key.to_vec())
        };
        self.cache.remove(&bare_key);
        match self.client.lock().tx_write(tx_id, &full_key, &[]) {
            Ok(response) => {
                self.aborted |= response.is_aborted;
                response.success
            }
            Err(e) => {
                warn!(%tx_id, error = %e, "delete rpc failed; assuming aborted");
                self.aborted = true;
                false
            }
        }
    }

    /// All keys under the chosen table, prefix-stripped.
    pub fn get_all_keys(&mut self) -> Vec<Vec<u8>> {
        self.get_matching_keys(&[])
    }

    /// Keys under the chosen table starting with `first_key_part`,
    /// prefix-stripped. Scanned values are cached opportunistically so a
    /// follow-up `read` of a listed key costs no extra round trip.
    pub fn get_matching_keys(&mut self, first_key_part: &[u8]) -> Vec<Vec<u8>> {
        if self.table_is_not_chosen() {
            return Vec::new();
        }
        let Some(tx_id) = self.tx_id else {
            warn!("scan before begin");
            return Vec::new();
        };
        match self
            .client
            .lock()
            .tx_scan(tx_id, &self.table_prefix, first_key_part)
        {
            Ok(response) => {
                self.aborted |= response.is_aborted;
                let mut keys = Vec::with_capacity(response.key_values.len());
                for kv in response.key_values {
                    keys.push(kv.key.clone());
                    self.cache
                        .entry(kv.key)
                        .or_insert_with(|| kv.value.into_boxed_slice());
                }
                keys
            }
            Err(e) => {
                warn!(%tx_id, error = %e, "scan rpc failed; assuming aborted");
                self.aborted = true;
                Vec::new()
            }
        }
    }

    /// Ask the server to mark the transaction aborted.
    pub fn set_status_to_abort(&mut self) {
        let Some(tx_id) = self.tx_id else {
            warn!("abort before begin");
            return;
        };
        if let Err(e) = self.client.lock().tx_abort(tx_id) {
            warn!(%tx_id, error = %e, "abort rpc failed");
        }
        self.aborted = true;
    }

    /// Commit-or-abort and consume the proxy. Returns `true` iff the engine
    /// committed; on a non-commit the host session is marked for rollback.
    pub fn end(mut self, fence: bool) -> bool {
        let Some(tx_id) = self.tx_id else {
            warn!("end before begin");
            return false;
        };
        let committed = match self.client.lock().db_end(tx_id, fence) {
            Ok(response) => !response.is_aborted,
            Err(e) => {
                warn!(%tx_id, error = %e, "end rpc failed; assuming aborted");
                false
            }
        };
        if !committed {
            self.session.mark_rollback();
        }
        debug!(%tx_id, committed, fence, "transaction ended");
        committed
    }

    /// Global engine barrier.
    pub fn fence(&mut self) {
        if let Err(e) = self.client.lock().db_fence() {
            warn!(error = %e, "fence rpc failed");
        }
    }
}
