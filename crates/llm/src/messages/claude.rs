//! Bedrock Anthropic (Claude) wire types.
//!
//! These are the native Anthropic Messages shapes as Bedrock hosts them:
//! the request carries `anthropic_version` and no model field (the model id
//! rides in the invocation URI), and streaming arrives as Anthropic SSE
//! events wrapped in Bedrock event-stream payload parts.
//!
//! The gateway also accepts this shape as an ingress dialect. In that
//! position the body may carry `model` and `stream`, which are stripped
//! before the request reaches Bedrock.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The version token Bedrock requires on every Claude request.
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Claude messages request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub anthropic_version: String,

    /// Gateway extension, absent on the Bedrock wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Required by the provider; the family default is applied during
    /// request shaping when the caller omitted it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    pub messages: Vec<InputMessage>,

    /// Anthropic's dedicated system slot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// Gateway extension, absent on the Bedrock wire (streaming is
    /// selected by the invocation, not the body).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

/// One conversation turn; Claude knows only user and assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputMessage {
    pub role: InputRole,
    pub content: InputContent,
}

/// Message sender role on the Claude wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputRole {
    User,
    Assistant,
}

/// Scalar text or tagged blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Tagged content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

/// Inline image payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

/// Tool definition in Anthropic shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
}

/// Tool-choice directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    /// Anthropic's spelling of "required".
    Any,
    None,
    Tool {
        name: String,
    },
}

/// Claude messages response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub r#type: ResponseType,
    pub role: String,
    pub content: Vec<ResponseContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    pub usage: TokenUsage,
}

/// Response object type; always `message` today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Message,
    #[serde(untagged)]
    Other(String),
}

/// Response content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
}

/// Why the model stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    ContentFiltered,
    #[serde(untagged)]
    Other(String),
}

/// Claude token accounting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Omitted on some `message_delta` events.
    #[serde(default)]
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Anthropic streaming events.
///
/// A well-formed stream is `message_start`, then per content block a
/// `content_block_start` / `content_block_delta`* / `content_block_stop`
/// run, then `message_delta` with the stop reason and final usage, then
/// `message_stop`. `ping` may appear anywhere.
///
/// The same enum serves both directions: parsing Bedrock payload parts on
/// ingress and rendering `target_format=bedrock_claude` streams on egress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        index: u32,
        content_block: StreamContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: MessageDeltaData,
        usage: TokenUsage,
    },
    MessageStop,
    Ping,
    Error {
        error: StreamError,
    },
}

/// Skeleton message carried by `message_start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStart {
    pub id: String,
    pub model: String,
    pub role: String,
    /// Always empty at start; content arrives through deltas.
    #[serde(default)]
    pub content: Vec<Value>,
    pub usage: TokenUsage,
}

/// Block header carried by `content_block_start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
}

/// Incremental update carried by `content_block_delta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

/// Final metadata carried by `message_delta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDeltaData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
}

/// In-band stream failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn ingress_request_accepts_model_and_stream() {
        let request: ChatRequest = serde_json::from_str(indoc! {r#"
            {
                "anthropic_version": "bedrock-2023-05-31",
                "model": "anthropic.claude-3-haiku-20240307-v1:0",
                "max_tokens": 1000,
                "messages": [{"role": "user", "content": "Hello!"}],
                "stream": true
            }
        "#})
        .expect("valid request");

        assert_eq!(request.model.as_deref(), Some("anthropic.claude-3-haiku-20240307-v1:0"));
        assert_eq!(request.stream, Some(true));
    }

    #[test]
    fn gateway_extensions_never_reach_the_wire() {
        let request = ChatRequest {
            anthropic_version: ANTHROPIC_VERSION.to_string(),
            model: None,
            max_tokens: Some(64),
            messages: vec![InputMessage {
                role: InputRole::User,
                content: InputContent::Text("hi".to_string()),
            }],
            system: None,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
        };

        let wire = serde_json::to_value(&request).expect("serializes");
        assert!(wire.get("model").is_none());
        assert!(wire.get("stream").is_none());
    }

    #[test]
    fn stream_events_parse_by_type_tag() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#,
        )
        .expect("event parses");

        assert!(matches!(
            event,
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::TextDelta { .. }
            }
        ));
    }

    #[test]
    fn unknown_stop_reasons_are_preserved() {
        let reason: StopReason = serde_json::from_str(r#""pause_turn""#).expect("reason parses");
        assert_eq!(reason, StopReason::Other("pause_turn".to_string()));
    }
}
