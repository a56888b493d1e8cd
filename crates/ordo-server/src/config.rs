//! Server configuration.

use std::net::Ipv4Addr;

/// Default TCP port the gateway listens on.
pub const DEFAULT_PORT: u16 = 9999;

/// Listen address configuration.
///
/// Port 0 asks the OS for an ephemeral port; the bound address is readable
/// from the server after bind, which is how tests avoid port collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED,
            port: DEFAULT_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_PORT, ServerConfig};

    #[test]
    fn default_listens_on_any_interface() {
        let config = ServerConfig::default();
        assert!(config.host.is_unspecified());
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
