//! TCP accept loop.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use ordo_engine::Database;
use ordo_error::{OrdoError, Result};
use ordo_types::TransactionIdAllocator;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::connection::serve_connection;
use crate::holder::DatabaseHolder;
use crate::profiler::RpcProfiler;

/// Backoff after a non-transient accept error, to avoid a busy spin on a
/// persistently failing listener.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// The gateway's listening socket plus the process-wide handles every
/// connection shares.
pub struct GatewayServer {
    listener: TcpListener,
    db: Arc<Database>,
    ids: Arc<TransactionIdAllocator>,
    profiler: Option<Arc<RpcProfiler>>,
}

impl GatewayServer {
    /// Bind the configured address. Port 0 picks an ephemeral port;
    /// [`GatewayServer::local_addr`] reports what was actually bound.
    pub fn bind(
        config: &ServerConfig,
        holder: &DatabaseHolder,
        profiler: Option<Arc<RpcProfiler>>,
    ) -> Result<Self> {
        let addr = SocketAddr::from((config.host, config.port));
        let listener = TcpListener::bind(addr).map_err(|source| OrdoError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self {
            listener,
            db: holder.database(),
            ids: holder.id_allocator(),
            profiler,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept forever, one detached message-loop thread per connection.
    /// Client threads are never joined; process exit is abrupt.
    pub fn run(self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!(%peer, "accepted connection");
                    let db = Arc::clone(&self.db);
                    let ids = Arc::clone(&self.ids);
                    let profiler = self.profiler.clone();
                    std::thread::spawn(move || serve_connection(stream, db, ids, profiler));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    std::thread::sleep(ACCEPT_RETRY_DELAY);
                }
            }
        }
    }
}
