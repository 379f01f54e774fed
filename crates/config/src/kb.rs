//! Knowledge-base retrieval configuration.

use serde::Deserialize;

/// Settings for the optional retrieval-augmented generation path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KbConfig {
    /// Whether the knowledge-base subsystem is active at all.
    pub enabled: bool,

    /// Region override for the agent runtime; falls back to the Bedrock
    /// region.
    pub region: Option<String>,

    /// Intent score at or above which the query is delegated wholesale to
    /// the provider's retrieve-and-generate API.
    pub direct_rag_threshold: f32,

    /// Intent score at or above which retrieved snippets are injected as
    /// context before normal routing.
    pub augment_threshold: f32,

    /// How many passages a retrieval returns.
    pub top_k: usize,

    /// Model ARN handed to retrieve-and-generate when the request does not
    /// pin one.
    pub model_arn: Option<String>,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            region: None,
            direct_rag_threshold: 0.7,
            augment_threshold: 0.4,
            top_k: 5,
            model_arn: None,
        }
    }
}
