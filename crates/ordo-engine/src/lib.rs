//! Embedded optimistic key-value engine.
//!
//! Single-process, in-memory, non-durable. Transactions read a committed
//! store through private read/write sets and validate at commit time under a
//! global commit lock (first-committer-wins on read-set versions). A handle
//! must only ever be touched by one thread at a time; the [`Database`] itself
//! is safe to share across threads.

pub mod config;
pub mod database;
pub mod transaction;

pub use config::{ConcurrencyControl, EngineConfig};
pub use database::{Database, TxStatus};
pub use transaction::Transaction;
