//! Bedrock Amazon Titan text wire types.
//!
//! Titan has no role model: a request is one flat `inputText` prompt plus a
//! `textGenerationConfig` block. Conversations are flattened into the
//! prompt with `User: ` / `Bot:` turn prefixes and a trailing `Bot:` cue;
//! system content becomes a leading preamble.

use serde::{Deserialize, Serialize};

/// Turn prefix for user messages in a flattened prompt.
pub const USER_PREFIX: &str = "User: ";

/// Turn prefix (and trailing cue) for model messages in a flattened prompt.
pub const BOT_PREFIX: &str = "Bot:";

/// Titan text generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(rename = "inputText")]
    pub input_text: String,

    #[serde(rename = "textGenerationConfig", skip_serializing_if = "Option::is_none")]
    pub text_generation_config: Option<TextGenerationConfig>,

    /// Gateway extension, absent on the Bedrock wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Gateway extension, absent on the Bedrock wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Generation tuning block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextGenerationConfig {
    #[serde(rename = "maxTokenCount", skip_serializing_if = "Option::is_none")]
    pub max_token_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(rename = "stopSequences", skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Titan text generation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(rename = "inputTextTokenCount")]
    pub input_text_token_count: u32,

    pub results: Vec<GenerateResult>,
}

/// One generation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResult {
    #[serde(rename = "outputText")]
    pub output_text: String,

    #[serde(rename = "tokenCount")]
    pub token_count: u32,

    #[serde(rename = "completionReason")]
    pub completion_reason: CompletionReason,
}

/// Titan's completion reason vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionReason {
    Finish,
    Length,
    ContentFiltered,
    #[serde(untagged)]
    Other(String),
}

/// One frame of a Titan response stream.
///
/// The final frame carries the completion reason and cumulative token
/// counts; earlier frames carry only `outputText` fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(rename = "outputText")]
    pub output_text: String,

    #[serde(default)]
    pub index: u32,

    #[serde(rename = "totalOutputTextTokenCount", skip_serializing_if = "Option::is_none")]
    pub total_output_text_token_count: Option<u32>,

    #[serde(rename = "completionReason", skip_serializing_if = "Option::is_none")]
    pub completion_reason: Option<CompletionReason>,

    #[serde(rename = "inputTextTokenCount", skip_serializing_if = "Option::is_none")]
    pub input_text_token_count: Option<u32>,
}
