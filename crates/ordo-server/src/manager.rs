//! Per-connection routing of RPCs onto transaction workers.

use std::collections::HashMap;
use std::sync::Arc;

use ordo_engine::Database;
use ordo_types::OpCode;
use ordo_wire::records::{AbortRequest, BeginResponse, peek_transaction_id};
use tracing::{debug, error, warn};

use crate::dispatcher::RpcDispatcher;
use crate::profiler::RpcProfiler;
use crate::registry::TransactionRegistry;
use crate::worker::TransactionWorker;

/// Owns this connection's transaction workers.
///
/// Lives on the connection thread; only the message loop touches the worker
/// map. BEGIN creates a worker, END retires one, FENCE runs on a throw-away
/// worker so that engine calls always happen on a worker thread. Teardown
/// aborts every surviving transaction before the workers join.
pub struct WorkerManager {
    db: Arc<Database>,
    registry: Arc<TransactionRegistry>,
    profiler: Option<Arc<RpcProfiler>>,
    workers: HashMap<i64, TransactionWorker>,
}

impl WorkerManager {
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        registry: Arc<TransactionRegistry>,
        profiler: Option<Arc<RpcProfiler>>,
    ) -> Self {
        Self {
            db,
            registry,
            profiler,
            workers: HashMap::new(),
        }
    }

    fn dispatcher(&self) -> RpcDispatcher {
        RpcDispatcher::new(
            Arc::clone(&self.db),
            Arc::clone(&self.registry),
            self.profiler.clone(),
        )
    }

    /// Route one decoded frame to the right worker and return the response
    /// bytes. An empty response is the client-visible failure shape.
    pub fn route(&mut self, sender_id: u64, opcode: OpCode, payload: Vec<u8>) -> Vec<u8> {
        match opcode {
            OpCode::Begin => self.begin_on_new_worker(sender_id, payload),
            OpCode::Fence => {
                // Not bound to a transaction; a one-off worker keeps the
                // "engine calls run on worker threads" rule intact.
                let worker = TransactionWorker::spawn(self.dispatcher());
                let response = worker.enqueue_and_wait(sender_id, OpCode::Fence, payload);
                worker.shutdown();
                response
            }
            _ => {
                let Some(tx_id) = peek_transaction_id(&payload).filter(|&id| id > 0) else {
                    warn!(%opcode, "request without a usable transaction id");
                    return Vec::new();
                };
                self.dispatch_to_worker(sender_id, tx_id, opcode, payload)
            }
        }
    }

    /// Construct a worker, run BEGIN on it, and register it under the id the
    /// response carries.
    fn begin_on_new_worker(&mut self, sender_id: u64, payload: Vec<u8>) -> Vec<u8> {
        let worker = TransactionWorker::spawn(self.dispatcher());
        let response = worker.enqueue_and_wait(sender_id, OpCode::Begin, payload);
        match BeginResponse::decode(&response) {
            Ok(begin) if begin.transaction_id > 0 => {
                debug!(tx_id = begin.transaction_id, "worker registered");
                self.workers.insert(begin.transaction_id, worker);
            }
            Ok(begin) => {
                error!(tx_id = begin.transaction_id, "BEGIN produced an invalid id");
            }
            Err(e) => {
                error!(error = %e, "BEGIN response did not decode");
            }
        }
        response
    }

    fn dispatch_to_worker(
        &mut self,
        sender_id: u64,
        tx_id: i64,
        opcode: OpCode,
        payload: Vec<u8>,
    ) -> Vec<u8> {
        let Some(worker) = self.workers.get(&tx_id) else {
            warn!(tx_id, %opcode, "no worker for transaction");
            return Vec::new();
        };
        let response = worker.enqueue_and_wait(sender_id, opcode, payload);
        if opcode == OpCode::End {
            if let Some(worker) = self.workers.remove(&tx_id) {
                worker.shutdown();
                debug!(tx_id, "worker retired");
            }
        }
        response
    }

    /// Number of live workers (open transactions) on this connection.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        // Connection teardown: abort every surviving transaction so the
        // engine does not keep zombie transactions, then let each worker
        // drain and join.
        for (tx_id, worker) in self.workers.drain() {
            debug!(tx_id, "aborting transaction on connection teardown");
            let abort = AbortRequest {
                transaction_id: tx_id,
            }
            .encode();
            let _ = worker.enqueue_and_wait(0, OpCode::Abort, abort);
            worker.shutdown();
        }
    }
}
