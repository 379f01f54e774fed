//! Health endpoint configuration.

use serde::Deserialize;

/// Settings for the unauthenticated liveness endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether the endpoint is exposed at all.
    pub enabled: bool,
    /// Path the endpoint is served from.
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/health".to_string(),
        }
    }
}
