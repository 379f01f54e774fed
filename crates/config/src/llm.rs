//! Gateway configuration for the chat-completions core.

use std::path::PathBuf;
use std::time::Duration;

use duration_str::deserialize_duration;
use secrecy::SecretString;
use serde::Deserialize;

/// Chat-completions gateway settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// OpenAI upstream. Absent means `gpt-*` models cannot be routed.
    pub openai: Option<OpenAiConfig>,

    /// AWS Bedrock upstream. Absent means `anthropic.*` / `amazon.titan-*`
    /// models cannot be routed.
    pub bedrock: Option<BedrockConfig>,

    /// Family defaults applied when a request omits `max_tokens`.
    pub default_max_tokens: DefaultMaxTokens,

    /// Retry policy for provider invocations.
    pub retry: RetryConfig,

    /// Per-phase timeouts for one request.
    pub timeouts: TimeoutConfig,
}

/// OpenAI upstream settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token.
    pub api_key: SecretString,

    /// Custom base URL, mainly for test doubles.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// AWS Bedrock upstream settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BedrockConfig {
    /// AWS region the Bedrock runtime lives in.
    pub region: String,

    /// How the SDK obtains credentials.
    #[serde(default)]
    pub credentials: BedrockCredentials,

    /// Custom endpoint URL, mainly for VPC endpoints and test doubles.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Credential source for the Bedrock SDK, resolved once at startup.
///
/// The variants mirror the AWS credential chain entry points; `ambient`
/// delegates entirely to the default chain (environment, shared config,
/// IMDS).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum BedrockCredentials {
    /// Static access key pair, optionally with a session token.
    Static {
        /// AWS access key id.
        access_key_id: SecretString,
        /// AWS secret access key.
        secret_access_key: SecretString,
        /// Session token for temporary credentials.
        #[serde(default)]
        session_token: Option<SecretString>,
    },

    /// Named profile from the shared AWS config files.
    Profile {
        /// Profile name.
        name: String,
    },

    /// Role assumed via STS on top of the ambient chain.
    AssumedRole {
        /// ARN of the role to assume.
        role_arn: String,
        /// External id passed to STS, when the role requires one.
        #[serde(default)]
        external_id: Option<String>,
        /// Session name; a fixed default is used when unset.
        #[serde(default)]
        session_name: Option<String>,
        /// Session duration.
        #[serde(default, deserialize_with = "deserialize_opt_duration")]
        duration: Option<Duration>,
    },

    /// Web-identity token file exchanged for role credentials.
    WebIdentity {
        /// Path to the OIDC token file.
        token_file: PathBuf,
        /// ARN of the role to assume.
        role_arn: String,
    },

    /// Default AWS credential chain.
    #[default]
    Ambient,
}

/// Per-family `max_tokens` defaults.
///
/// Anthropic models require the field; Titan caps generation at a model
/// default when it is omitted, which tends to surprise, so both get an
/// explicit gateway default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultMaxTokens {
    /// Default for `anthropic.*` models.
    pub claude: u32,
    /// Default for `amazon.titan-*` models.
    pub titan: u32,
}

impl Default for DefaultMaxTokens {
    fn default() -> Self {
        Self { claude: 1024, titan: 512 }
    }
}

/// Retry policy settings for provider invocations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Base wait before the first retry.
    #[serde(deserialize_with = "deserialize_duration")]
    pub wait_min: Duration,

    /// Upper bound on any single wait.
    #[serde(deserialize_with = "deserialize_duration")]
    pub wait_max: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            wait_min: Duration::from_secs(1),
            wait_max: Duration::from_secs(10),
        }
    }
}

/// Per-phase timeouts for a single request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Budget for fetching all referenced files.
    #[serde(deserialize_with = "deserialize_duration")]
    pub file_fetch: Duration,

    /// Budget for one provider invocation (or stream establishment).
    #[serde(deserialize_with = "deserialize_duration")]
    pub provider_call: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            file_fetch: Duration::from_secs(10),
            provider_call: Duration::from_secs(120),
        }
    }
}

fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_duration(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn bedrock_static_credentials() {
        let config: BedrockConfig = toml::from_str(indoc! {r#"
            region = "eu-west-1"

            [credentials]
            type = "static"
            access_key_id = "AKIA..."
            secret_access_key = "secret"
        "#})
        .expect("valid bedrock config");

        assert!(matches!(config.credentials, BedrockCredentials::Static { .. }));
        assert_eq!(config.region, "eu-west-1");
    }

    #[test]
    fn bedrock_assumed_role_with_duration() {
        let config: BedrockConfig = toml::from_str(indoc! {r#"
            region = "us-east-1"

            [credentials]
            type = "assumed_role"
            role_arn = "arn:aws:iam::123456789012:role/switchyard"
            external_id = "ext"
            duration = "15m"
        "#})
        .expect("valid bedrock config");

        match config.credentials {
            BedrockCredentials::AssumedRole { duration, external_id, .. } => {
                assert_eq!(duration, Some(Duration::from_secs(900)));
                assert_eq!(external_id.as_deref(), Some("ext"));
            }
            other => unreachable!("expected assumed role credentials, got {other:?}"),
        }
    }

    #[test]
    fn credentials_default_to_ambient_chain() {
        let config: BedrockConfig = toml::from_str(indoc! {r#"
            region = "us-east-1"
        "#})
        .expect("valid bedrock config");

        assert!(matches!(config.credentials, BedrockCredentials::Ambient));
    }

    #[test]
    fn retry_defaults() {
        let config = RetryConfig::default();

        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.wait_min, Duration::from_secs(1));
        assert_eq!(config.wait_max, Duration::from_secs(10));
    }

    #[test]
    fn default_max_tokens_per_family() {
        let defaults = DefaultMaxTokens::default();

        assert_eq!(defaults.claude, 1024);
        assert_eq!(defaults.titan, 512);
    }
}
