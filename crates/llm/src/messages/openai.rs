//! OpenAI chat-completions wire types.
//!
//! This is the canonical ingress and egress dialect: the default response
//! shape, and the request shape that carries the gateway-level extensions
//! (`file_ids`, knowledge-base hints).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model identifier; keys routing.
    pub model: String,

    /// Ordered conversation, system messages inline.
    pub messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Gateway extension: artifacts to inject as context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<String>>,

    /// Gateway extension: knowledge base to consult unconditionally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_base_id: Option<String>,

    /// Gateway extension: let the gateway decide on knowledge-base use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_kb: Option<bool>,

    /// Gateway extension: retrieval tuning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_config: Option<RetrievalConfig>,

    /// Gateway extension: citation rendering for RAG answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_format: Option<String>,
}

/// Retrieval tuning carried on the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

/// One conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,

    /// Text, content parts, or absent (assistant tool-call turns).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Message sender role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
    /// Forward compatibility with roles this gateway does not know.
    #[serde(untagged)]
    Other(String),
}

/// String content or an ordered list of parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One multimodal content part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
}

/// Image reference inside a content part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Tool made available to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDefinition,
}

/// The only tool type OpenAI defines today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Function,
}

/// Callable function description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: Value,
}

/// Tool-choice directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(ToolChoiceMode),
    Specific {
        #[serde(rename = "type")]
        tool_type: ToolType,
        function: FunctionName,
    },
}

/// Mode-only tool choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    None,
    Auto,
    Required,
}

/// Names the function a `Specific` tool choice pins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionName {
    pub name: String,
}

/// A call the assistant made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionCall,
}

/// Function name plus arguments as a JSON string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: ObjectType,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// One response choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: FinishReason,
}

/// Why generation stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    /// Forward compatibility with reasons this gateway does not know.
    #[serde(untagged)]
    Other(String),
}

/// Token accounting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Streaming chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: ObjectType,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoiceDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Incremental update for one choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoiceDelta {
    pub index: u32,
    pub delta: ChatMessageDelta,
    pub finish_reason: Option<FinishReason>,
}

/// Partial message content inside a chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatMessageDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<StreamingToolCall>>,
}

/// Tool-call fragments in streaming responses.
///
/// The first frame for a call carries id and name; later frames append
/// argument fragments keyed by index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamingToolCall {
    Start {
        index: usize,
        id: String,
        #[serde(rename = "type")]
        tool_type: ToolType,
        function: FunctionStart,
    },
    Delta {
        index: usize,
        function: FunctionDelta,
    },
}

/// Function header on the opening frame of a streamed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionStart {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Argument fragment on a continuation frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDelta {
    pub arguments: String,
}

/// Object type marker in OpenAI responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Model,
    List,
    #[serde(rename = "chat.completion")]
    ChatCompletion,
    #[serde(rename = "chat.completion.chunk")]
    ChatCompletionChunk,
}

/// Model listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub object: ObjectType,
    pub created: u64,
    pub owned_by: String,
}

/// Model listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: ObjectType,
    pub data: Vec<Model>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn request_with_extensions_deserializes() {
        let request: ChatCompletionRequest = serde_json::from_str(indoc! {r#"
            {
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Summarize"}],
                "file_ids": ["file-abc123"],
                "auto_kb": true
            }
        "#})
        .expect("valid request");

        assert_eq!(request.file_ids.as_deref(), Some(&["file-abc123".to_string()][..]));
        assert_eq!(request.auto_kb, Some(true));
    }

    #[test]
    fn unknown_roles_survive_round_trip() {
        let role: ChatRole = serde_json::from_str(r#""developer""#).expect("role parses");
        assert_eq!(role, ChatRole::Other("developer".to_string()));
        assert_eq!(serde_json::to_string(&role).expect("role serializes"), r#""developer""#);
    }

    #[test]
    fn streaming_tool_call_frames_distinguish_start_and_delta() {
        let start: StreamingToolCall = serde_json::from_str(
            r#"{"index":0,"id":"call_1","type":"function","function":{"name":"lookup","arguments":""}}"#,
        )
        .expect("start frame parses");
        assert!(matches!(start, StreamingToolCall::Start { .. }));

        let delta: StreamingToolCall =
            serde_json::from_str(r#"{"index":0,"function":{"arguments":"{\"q\":"}}"#).expect("delta frame parses");
        assert!(matches!(delta, StreamingToolCall::Delta { .. }));
    }

    #[test]
    fn chunk_object_type_serializes_with_dotted_name() {
        let object = serde_json::to_string(&ObjectType::ChatCompletionChunk).expect("serializes");
        assert_eq!(object, r#""chat.completion.chunk""#);
    }
}
