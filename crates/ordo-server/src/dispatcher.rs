//! Per-opcode RPC execution against the engine.
//!
//! `dispatch` runs on the calling thread, which is the transaction worker's
//! thread; that is what keeps every engine call on a given transaction
//! confined to one thread. Decode failures and unknown ids are non-fatal:
//! they produce an empty or failure-shaped response, never a torn
//! connection.

use std::sync::Arc;
use std::time::Instant;

use ordo_engine::Database;
use ordo_types::OpCode;
use ordo_wire::records::{
    AbortRequest, AbortResponse, BeginRequest, BeginResponse, EndRequest, EndResponse,
    FenceRequest, FenceResponse, KeyValue, ReadRequest, ReadResponse, ScanRequest, ScanResponse,
    WriteRequest, WriteResponse,
};
use tracing::{debug, trace, warn};

use crate::profiler::RpcProfiler;
use crate::registry::TransactionRegistry;

/// Exclusive upper bound for a prefix scan: the lexicographic successor of
/// `start` (last non-0xFF byte incremented, tail stripped). `None` when
/// `start` is empty or all 0xFF, meaning the scan is unbounded above.
///
/// A `start ++ 0xFF` sentinel would wrongly exclude keys such as
/// `start ++ 0xFF ++ ...`; the successor bound covers the full prefix range.
#[must_use]
pub fn prefix_upper_bound(start: &[u8]) -> Option<Vec<u8>> {
    let mut bound = start.to_vec();
    while let Some(last) = bound.pop() {
        if last < 0xFF {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}

/// Decodes one request, performs the engine call, encodes the response.
///
/// Cheap to clone into each worker: three `Arc`s and an optional profiler
/// handle.
#[derive(Clone)]
pub struct RpcDispatcher {
    db: Arc<Database>,
    registry: Arc<TransactionRegistry>,
    profiler: Option<Arc<RpcProfiler>>,
}

impl RpcDispatcher {
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
        }
    }

    /// Execute one RPC on the current thread and return the response bytes.
    pub fn dispatch(&self, sender_id: u64, opcode: OpCode, payload: &[u8]) -> Vec<u8> {
        trace!(sender_id, %opcode, payload_len = payload.len(), "dispatching rpc");
        let started = Instant::now();
        let response = match opcode {
            OpCode::Begin => self.handle_begin(payload),
            OpCode::Abort => self.handle_abort(payload),
            OpCode::Read => self.handle_read(payload),
            OpCode::Write => self.handle_write(payload),
            OpCode::Scan => self.handle_scan(payload),
            OpCode::Fence => self.handle_fence(payload),
            OpCode::End => self.handle_end(payload),
        };
        if let Some(profiler) = &self.profiler {
            profiler.record(opcode, started.elapsed());
        }
        response
    }

    fn handle_begin(&self, payload: &[u8]) -> Vec<u8> {
        if let Err(e) = BeginRequest::decode(payload) {
            warn!(error = %e, "malformed BEGIN request");
            return Vec::new();
        }
        let tx = self.db.begin_transaction();
        let id = self.registry.generate_id();
        self.registry.store(id, tx);
        debug!(tx_id = %id, "transaction started");
        BeginResponse {
            transaction_id: id.get(),
        }
        .encode()
    }

    fn handle_abort(&self, payload: &[u8]) -> Vec<u8> {
        let req = match AbortRequest::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "malformed ABORT request");
                return Vec::new();
            }
        };
        match self
            .registry
            .with_transaction(req.transaction_id, |tx| tx.abort())
        {
            Some(()) => debug!(tx_id = req.transaction_id, "transaction aborted"),
            // Repeated aborts of a finished transaction are fine.
            None => warn!(tx_id = req.transaction_id, "abort of unknown transaction ignored"),
        }
        AbortResponse.encode()
    }

    fn handle_read(&self, payload: &[u8]) -> Vec<u8> {
        let req = match ReadRequest::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "malformed READ request");
                return Vec::new();
            }
        };
        let response = self
            .registry
            .with_transaction(req.transaction_id, |tx| {
                // Copy out of engine memory before the response is built.
                let value = tx.read(&req.key).map(<[u8]>::to_vec);
                ReadResponse {
                    found: value.is_some(),
                    value,
                    is_aborted: tx.is_aborted(),
                }
            })
            .unwrap_or_else(|| {
                warn!(tx_id = req.transaction_id, "read on unknown transaction");
                ReadResponse {
                    found: false,
                    value: None,
                    is_aborted: true,
                }
            });
        response.encode()
    }

    fn handle_write(&self, payload: &[u8]) -> Vec<u8> {
        let req = match WriteRequest::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "malformed WRITE request");
                return Vec::new();
            }
        };
        let response = self
            .registry
            .with_transaction(req.transaction_id, |tx| {
                tx.write(&req.key, &req.value);
                WriteResponse {
                    success: true,
                    is_aborted: tx.is_aborted(),
                }
            })
            .unwrap_or_else(|| {
                warn!(tx_id = req.transaction_id, "write on unknown transaction");
                WriteResponse {
                    success: false,
                    is_aborted: true,
                }
            });
        response.encode()
    }

    fn handle_scan(&self, payload: &[u8]) -> Vec<u8> {
        let req = match ScanRequest::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "malformed SCAN request");
                return Vec::new();
            }
        };
        let mut start = req.db_table_key.clone();
        start.extend_from_slice(&req.first_key_part);
        let end = prefix_upper_bound(&start);

        let response = self
            .registry
            .with_transaction(req.transaction_id, |tx| {
                let mut key_values = Vec::new();
                tx.scan(&start, end.as_deref(), |key, value| {
                    if !key.starts_with(&start) {
                        return true; // past the prefix range, stop
                    }
                    key_values.push(KeyValue {
                        key: key[req.db_table_key.len()..].to_vec(),
                        value: value.to_vec(),
                    });
                    false
                });
                ScanResponse {
                    key_values,
                    is_aborted: tx.is_aborted(),
                }
            })
            .unwrap_or_else(|| {
                warn!(tx_id = req.transaction_id, "scan on unknown transaction");
                ScanResponse {
                    key_values: Vec::new(),
                    is_aborted: true,
                }
            });
        response.encode()
    }

    fn handle_fence(&self, payload: &[u8]) -> Vec<u8> {
        if let Err(e) = FenceRequest::decode(payload) {
            warn!(error = %e, "malformed FENCE request");
            return Vec::new();
        }
        self.db.fence();
        FenceResponse.encode()
    }

    fn handle_end(&self, payload: &[u8]) -> Vec<u8> {
        let req = match EndRequest::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "malformed END request");
                return Vec::new();
            }
        };
        let Some(tx) = self.registry.remove(req.transaction_id) else {
            warn!(tx_id = req.transaction_id, "end of unknown transaction");
            return EndResponse { is_aborted: true }.encode();
        };
        let tx_id = req.transaction_id;
        let committed = self
            .db
            .end_transaction(tx, move |status| trace!(tx_id, ?status, "commit decided"));
        if req.fence {
            self.db.fence();
        }
        debug!(tx_id, committed, fence = req.fence, "transaction ended");
        EndResponse {
            is_aborted: !committed,
        }
        .encode()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ordo_engine::{Database, EngineConfig};
    use ordo_types::{OpCode, TransactionIdAllocator};
    use ordo_wire::records::{
        AbortRequest, BeginResponse, EndRequest, EndResponse, ReadRequest, ReadResponse,
        ScanRequest, ScanResponse, WriteRequest, WriteResponse,
    };

    use super::{RpcDispatcher, prefix_upper_bound};
    use crate::registry::TransactionRegistry;

    fn dispatcher() -> RpcDispatcher {
        let db = Arc::new(Database::new(EngineConfig::default()));
        let registry = Arc::new(TransactionRegistry::new(Arc::new(
            TransactionIdAllocator::new(),
        )));
        RpcDispatcher::new(db, registry, None)
    }

    fn begin(d: &RpcDispatcher) -> i64 {
        let resp = d.dispatch(1, OpCode::Begin, &[]);
        let id = BeginResponse::decode(&resp).expect("begin response").transaction_id;
        assert!(id >= 1);
        id
    }

    #[test]
    fn upper_bound_increments_last_byte() {
        assert_eq!(prefix_upper_bound(b"t/a"), Some(b"t/b".to_vec()));
        assert_eq!(prefix_upper_bound(&[0x74, 0xFF]), Some(vec![0x75]));
        assert_eq!(prefix_upper_bound(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_upper_bound(b""), None);
    }

    #[test]
    fn read_your_write_through_dispatch() {
        let d = dispatcher();
        let tx = begin(&d);

        let resp = d.dispatch(
            1,
            OpCode::Write,
            &WriteRequest {
                transaction_id: tx,
                key: b"t/a".to_vec(),
                value: b"1".to_vec(),
            }
            .encode(),
        );
        let write = WriteResponse::decode(&resp).unwrap();
        assert!(write.success);
        assert!(!write.is_aborted);

        let resp = d.dispatch(
            1,
            OpCode::Read,
            &ReadRequest {
                transaction_id: tx,
                key: b"t/a".to_vec(),
            }
            .encode(),
        );
        let read = ReadResponse::decode(&resp).unwrap();
        assert!(read.found);
        assert_eq!(read.value.as_deref(), Some(&b"1"[..]));

        let resp = d.dispatch(
            1,
            OpCode::End,
            &EndRequest {
                transaction_id: tx,
                fence: false,
            }
            .encode(),
        );
        assert!(!EndResponse::decode(&resp).unwrap().is_aborted);
    }

    #[test]
    fn unknown_transaction_is_nonfatal() {
        let d = dispatcher();
        let resp = d.dispatch(
            1,
            OpCode::Read,
            &ReadRequest {
                transaction_id: 999,
                key: b"k".to_vec(),
            }
            .encode(),
        );
        let read = ReadResponse::decode(&resp).unwrap();
        assert!(!read.found);
        assert!(read.is_aborted);

        let resp = d.dispatch(
            1,
            OpCode::End,
            &EndRequest {
                transaction_id: 999,
                fence: false,
            }
            .encode(),
        );
        assert!(EndResponse::decode(&resp).unwrap().is_aborted);
    }

    #[test]
    fn abort_is_idempotent() {
        let d = dispatcher();
        let tx = begin(&d);
        for _ in 0..3 {
            let resp = d.dispatch(
                1,
                OpCode::Abort,
                &AbortRequest { transaction_id: tx }.encode(),
            );
            assert!(resp.is_empty());
        }
        let resp = d.dispatch(
            1,
            OpCode::End,
            &EndRequest {
                transaction_id: tx,
                fence: false,
            }
            .encode(),
        );
        assert!(EndResponse::decode(&resp).unwrap().is_aborted);
    }

    #[test]
    fn scan_strips_table_prefix() {
        let d = dispatcher();
        let tx = begin(&d);
        for (k, v) in [("t/a1", "x"), ("t/a2", "y"), ("t/b1", "z")] {
            d.dispatch(
                1,
                OpCode::Write,
                &WriteRequest {
                    transaction_id: tx,
                    key: k.as_bytes().to_vec(),
                    value: v.as_bytes().to_vec(),
                }
                .encode(),
            );
        }
        let resp = d.dispatch(
            1,
            OpCode::Scan,
            &ScanRequest {
                transaction_id: tx,
                db_table_key: b"t/".to_vec(),
                first_key_part: b"a".to_vec(),
            }
            .encode(),
        );
        let scan = ScanResponse::decode(&resp).unwrap();
        let got: Vec<(&[u8], &[u8])> = scan
            .key_values
            .iter()
            .map(|kv| (kv.key.as_slice(), kv.value.as_slice()))
            .collect();
        assert_eq!(
            got,
            vec![(&b"a1"[..], &b"x"[..]), (&b"a2"[..], &b"y"[..])]
        );
    }

    #[test]
    fn malformed_payload_yields_empty_response() {
        let d = dispatcher();
        let garbage = [0xAB; 3];
        assert!(d.dispatch(1, OpCode::Read, &garbage).is_empty());
        assert!(d.dispatch(1, OpCode::End, &garbage).is_empty());
    }

    #[test]
    fn delete_via_empty_write() {
        let d = dispatcher();
        let tx = begin(&d);
        for value in [&b"v"[..], &b""[..]] {
            d.dispatch(
                1,
                OpCode::Write,
                &WriteRequest {
                    transaction_id: tx,
                    key: b"k".to_vec(),
                    value: value.to_vec(),
                }
                .encode(),
            );
        }
        let resp = d.dispatch(
            1,
            OpCode::Read,
            &ReadRequest {
                transaction_id: tx,
                key: b"k".to_vec(),
            }
            .encode(),
        );
        let read = ReadResponse::decode(&resp).unwrap();
        assert!(!read.found);
        assert!(read.value.is_none());
    }
}
