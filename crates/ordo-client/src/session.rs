//! Contract with the hosting relational database's session.

use ordo_types::TransactionId;

/// What the proxy needs from the host session: whether the current statement
/// belongs to a user-visible multi-statement transaction, a registration
/// hook so commit/rollback propagates back to the proxy's `end`, and a way
/// to mark the whole host transaction for rollback when the engine refuses
/// to commit.
pub trait HostSession {
    /// Whether the statement runs inside an explicit multi-statement
    /// transaction (as opposed to autocommit).
    fn in_multi_statement_txn(&self) -> bool;

    /// Register the proxy as a transactional participant.
    fn register_participant(&mut self, tx_id: TransactionId, multi_statement: bool);

    /// Mark the host transaction for rollback.
    fn mark_rollback(&mut self);
}

/// A host session for standalone use: every statement is autocommit and
/// rollback marks are only logged.
#[derive(Debug, Default)]
pub struct AutocommitSession;

impl HostSession for AutocommitSession {
    fn in_multi_statement_txn(&self) -> bool {
        false
    }

    fn register_participant(&mut self, _tx_id: TransactionId, _multi_statement: bool) {}

    fn mark_rollback(&mut self) {
        tracing::debug!("rollback requested on autocommit session");
    }
}
