//! HTTP server configuration.

use std::net::SocketAddr;

use secrecy::SecretString;
use serde::Deserialize;

use crate::health::HealthConfig;

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address the server binds to.
    pub listen_address: SocketAddr,

    /// Bearer token required on every `/v1` endpoint.
    ///
    /// When unset the gateway runs open, which is only sensible behind
    /// another authenticating proxy.
    pub api_key: Option<SecretString>,

    /// Health endpoint settings.
    pub health: HealthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            api_key: None,
            health: HealthConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn listen_address_parses() {
        let config: ServerConfig = toml::from_str(indoc! {r#"
            listen_address = "0.0.0.0:9100"
        "#})
        .expect("valid server config");

        assert_eq!(config.listen_address.port(), 9100);
        assert!(config.api_key.is_none());
    }
}
