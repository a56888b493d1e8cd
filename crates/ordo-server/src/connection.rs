//! The per-connection message loop.

use std::net::TcpStream;
use std::sync::Arc;

use ordo_engine::Database;
use ordo_error::OrdoError;
use ordo_types::TransactionIdAllocator;
use ordo_wire::{read_frame, write_frame};
use tracing::{debug, info, warn};

use crate::manager::WorkerManager;
use crate::profiler::RpcProfiler;
use crate::registry::TransactionRegistry;

/// Run the message loop for one accepted connection until EOF or a framing
/// error. Strictly sequential: one frame in, one frame out, so responses are
/// FIFO per connection and a transaction's operations reach the engine in
/// submission order.
///
/// Dropping the worker manager on exit aborts surviving transactions and
/// joins their workers.
pub fn serve_connection(
    mut stream: TcpStream,
    db: Arc<Database>,
    ids: Arc<TransactionIdAllocator>,
    profiler: Option<Arc<RpcProfiler>>,
) {
    let peer = stream.peer_addr().ok();
    info!(?peer, "client connected");

    let registry = Arc::new(TransactionRegistry::new(ids));
    let mut manager = WorkerManager::new(db, registry, profiler);

    loop {
        let (header, payload) = match read_frame(&mut stream) {
            Ok(frame) => frame,
            Err(OrdoError::ConnectionClosed) => {
                info!(?peer, "client disconnected");
                break;
            }
            Err(e) => {
                warn!(?peer, error = %e, "terminating connection");
                break;
            }
        };
        debug!(
            ?peer,
            opcode = %header.opcode,
            payload_len = payload.len(),
            "frame received"
        );

        let response = manager.route(header.sender_id, header.opcode, payload);

        if let Err(e) = write_frame(&mut stream, 0, header.opcode, &response) {
            warn!(?peer, error = %e, "failed to write response");
            break;
        }
    }

    let open = manager.worker_count();
    if open > 0 {
        debug!(?peer, open, "tearing down workers for dead connection");
    }
}
