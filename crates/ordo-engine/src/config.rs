//! Engine configuration.

/// Concurrency-control protocol selector.
///
/// Only the optimistic Silo-class protocol is implemented; the selector
/// exists so a configuration snapshot names the protocol explicitly.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub enum ConcurrencyControl {
    /// Optimistic: read-set version validation at commit, no read locks.
    #[default]
    Silo,
}

/// Fixed configuration the gateway constructs the engine with.
///
/// The engine is in-memory and non-durable; there is no checkpointer, no
/// recovery and no write-ahead log to switch off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Concurrency-control protocol.
    pub protocol: ConcurrencyControl,
    /// When a transaction commits, immediately mark every still-active
    /// transaction whose read set overlaps the installed writes as aborted,
    /// so the loser observes `is_aborted` on its next operation instead of
    /// at its own commit.
    pub eager_abort: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protocol: ConcurrencyControl::Silo,
            eager_abort: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    #[test]
    fn default_config_is_optimistic_with_eager_abort() {
        let config = EngineConfig::default();
        assert_eq!(config.protocol, super::ConcurrencyControl::Silo);
        assert!(config.eager_abort);
    }
}
