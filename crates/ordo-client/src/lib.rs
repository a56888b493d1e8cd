//! Ordo gateway client.
//!
//! [`GatewayClient`] is the blocking RPC socket: one request frame out, one
//! response frame in, no pipelining. [`TransactionProxy`] sits on top and
//! translates a relational handler's row-at-a-time calls into RPCs while
//! keeping returned byte slices valid for the life of the statement.

pub mod proxy;
pub mod session;
pub mod socket;

pub use proxy::TransactionProxy;
pub use session::{AutocommitSession, HostSession};
pub use socket::GatewayClient;
