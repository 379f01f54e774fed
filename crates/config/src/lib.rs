//! Switchyard configuration structures to map the switchyard.toml configuration.

#![deny(missing_docs)]

mod files;
mod health;
mod kb;
mod llm;
mod loader;
mod server;

use std::path::Path;

pub use files::FilesConfig;
pub use health::HealthConfig;
pub use kb::KbConfig;
pub use llm::{
    BedrockConfig, BedrockCredentials, DefaultMaxTokens, LlmConfig, OpenAiConfig, RetryConfig, TimeoutConfig,
};
pub use server::ServerConfig;

use serde::Deserialize;

/// Main configuration structure for the Switchyard gateway.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// Chat-completions gateway settings.
    pub llm: LlmConfig,
    /// Uploaded-file storage settings.
    pub files: Option<FilesConfig>,
    /// Knowledge-base retrieval settings.
    pub kb: KbConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates that the configuration has at least one functional upstream.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate_has_upstreams(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn full_configuration_deserializes() {
        let config: Config = toml::from_str(indoc! {r#"
            [server]
            listen_address = "127.0.0.1:8000"
            api_key = "sk-test"

            [llm.openai]
            api_key = "sk-openai"

            [llm.bedrock]
            region = "us-east-1"

            [llm.bedrock.credentials]
            type = "profile"
            name = "dev"

            [llm.retry]
            max_attempts = 5
            wait_min = "500ms"
            wait_max = "8s"

            [files]
            bucket = "switchyard-files"

            [kb]
            enabled = true
            top_k = 3
        "#})
        .expect("valid config");

        assert!(config.llm.openai.is_some());
        assert!(config.llm.bedrock.is_some());
        assert_eq!(config.llm.retry.max_attempts, 5);
        assert_eq!(config.files.as_ref().map(|f| f.bucket.as_str()), Some("switchyard-files"));
        assert!(config.kb.enabled);
    }

    #[test]
    fn defaults_apply_for_empty_config() {
        let config: Config = toml::from_str("").expect("empty config is valid");

        assert!(config.llm.openai.is_none());
        assert!(config.llm.bedrock.is_none());
        assert_eq!(config.llm.retry.max_attempts, 3);
        assert!(config.files.is_none());
        assert!(!config.kb.enabled);
    }
}
