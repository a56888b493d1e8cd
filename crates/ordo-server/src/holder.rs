//! Ownership of the process-wide engine instance.

use std::sync::Arc;

use ordo_engine::{Database, EngineConfig};
use ordo_types::TransactionIdAllocator;
use tracing::info;

/// Owns the engine and the process-wide transaction-id counter.
///
/// Exactly one instance exists per gateway process; everything downstream
/// receives `Arc` handles by capability rather than reaching for a global.
#[derive(Debug)]
pub struct DatabaseHolder {
    db: Arc<Database>,
    ids: Arc<TransactionIdAllocator>,
}

impl DatabaseHolder {
    /// Construct the engine with the gateway's fixed configuration:
    /// non-durable, optimistic, eager abort notification on.
    #[must_use]
    pub fn new() -> Self {
        let config = EngineConfig::default();
        info!(?config, "engine configured");
        Self {
            db: Arc::new(Database::new(config)),
            ids: Arc::new(TransactionIdAllocator::new()),
        }
    }

    /// Handle to the engine.
    #[must_use]
    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    /// Handle to the process-wide id counter.
    #[must_use]
    pub fn id_allocator(&self) -> Arc<TransactionIdAllocator> {
        Arc::clone(&self.ids)
    }
}

impl Default for DatabaseHolder {
    fn default() -> Self {
        Self::new()
    }
}
