//! Ordo gateway server.
//!
//! One acceptor thread, one thread per connection, one worker thread per
//! open transaction. The message loop is strictly sequential per connection;
//! the worker queue's job is bridging the connection thread onto the thread
//! that owns the engine transaction, not load smoothing.

pub mod acceptor;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod holder;
pub mod manager;
pub mod profiler;
pub mod registry;
pub mod worker;

pub use acceptor::GatewayServer;
pub use config::{DEFAULT_PORT, ServerConfig};
pub use dispatcher::RpcDispatcher;
pub use holder::DatabaseHolder;
pub use manager::WorkerManager;
pub use profiler::RpcProfiler;
pub use registry::TransactionRegistry;
pub use worker::TransactionWorker;
