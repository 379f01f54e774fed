//! Dialect-neutral chat types.
//!
//! Every recognized request dialect (OpenAI chat, Bedrock Claude, Bedrock
//! Titan) converts into these types on ingress and back out of them on
//! egress. Orienting everything around one hub keeps the conversion count
//! linear in the number of dialects instead of quadratic.
//!
//! The types here are pure values: no I/O, no provider knowledge. Provider
//! specifics live in the dialect modules and the family strategies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) mod from_claude;
pub(crate) mod from_openai;
pub(crate) mod from_titan;
pub(crate) mod to_claude;
pub(crate) mod to_openai;
pub(crate) mod to_titan;

/// A chat request in canonical form.
///
/// `model` keys routing; everything else is tuning, conversation state, or
/// gateway-level hints (file context, knowledge bases) that never reach the
/// provider wire as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRequest {
    /// Model identifier, exactly as the caller sent it.
    pub model: String,

    /// Ordered conversation messages. System content is held separately in
    /// [`CanonicalRequest::system`] so each dialect can place it where its
    /// provider expects it.
    pub messages: Vec<CanonicalMessage>,

    /// System instruction, extracted from system-role messages on ingress.
    pub system: Option<String>,

    /// Generation cap. Families that require the field get a configured
    /// default applied during request shaping when this is `None`.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling cutoff.
    pub top_p: Option<f32>,

    /// Sequences that halt generation.
    pub stop_sequences: Option<Vec<String>>,

    /// Whether the caller asked for an event stream.
    pub stream: Option<bool>,

    /// Tools the model may call.
    pub tools: Option<Vec<ToolDef>>,

    /// How the model should use the tools.
    pub tool_choice: Option<ToolChoice>,

    /// Uploaded artifacts to inject as context before routing.
    pub file_ids: Option<Vec<String>>,

    /// Knowledge base to consult unconditionally.
    pub knowledge_base_id: Option<String>,

    /// Let the gateway decide from the query whether to consult a
    /// knowledge base.
    pub auto_kb: Option<bool>,

    /// Retrieval tuning forwarded to the knowledge-base subsystem.
    pub retrieval_config: Option<RetrievalConfig>,

    /// How citations are rendered into a RAG answer.
    pub citation_format: Option<CitationFormat>,
}

impl CanonicalRequest {
    /// Text of the most recent user message, used for knowledge-base
    /// intent scoring.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .and_then(|message| match &message.content {
                MessageContent::Text(text) => Some(text.as_str()),
                MessageContent::Blocks(blocks) => blocks.iter().find_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                }),
            })
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Who sent the message.
    pub role: Role,

    /// Plain text or an ordered list of tagged blocks.
    pub content: MessageContent,

    /// Optional participant name (OpenAI extension).
    pub name: Option<String>,

    /// For tool-role messages, the call this message answers.
    pub tool_call_id: Option<String>,

    /// Calls the assistant made in this turn (OpenAI representation;
    /// Claude carries the same information as `ToolUse` blocks).
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl CanonicalMessage {
    /// A plain text message with no tool state.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// Message sender role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Tool execution result.
    Tool,
}

/// Message content: a scalar string or tagged blocks.
///
/// The untagged representation keeps the common text-only case free of
/// wrapper noise in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content.
    Text(String),
    /// Ordered content blocks for tool use or multimodal turns.
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Flattens the content to plain text, joining text blocks with
    /// newlines and skipping everything that has no textual rendering.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single tagged content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },

    /// An image, inline or by reference. Passed through to providers that
    /// accept it; never transcoded.
    Image {
        /// MIME type of the image data.
        media_type: String,
        /// Base64 payload, when inline.
        data: Option<String>,
        /// URL reference, when external.
        url: Option<String>,
    },

    /// The assistant requesting a tool invocation.
    ToolUse {
        /// Correlates with a later `ToolResult`.
        id: String,
        /// Tool name.
        name: String,
        /// Arguments as parsed JSON.
        input: Value,
    },

    /// Output of a tool invocation.
    ToolResult {
        /// The `ToolUse` id this answers.
        tool_use_id: String,
        /// Tool output text.
        content: String,
    },
}

/// Tool definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    /// Unique tool name.
    pub name: String,
    /// What the tool does, for the model's benefit.
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
}

/// A concrete call the assistant made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, echoed back by the tool result.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments as a JSON string (the OpenAI wire convention; Claude's
    /// parsed objects serialize into this on conversion).
    pub arguments: String,
}

/// How the model should use the offered tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides.
    Auto,
    /// Tools disabled for this turn.
    None,
    /// Model must call at least one tool.
    Required,
    /// Model must call this tool.
    Named {
        /// The required tool's name.
        name: String,
    },
}

/// Retrieval tuning forwarded to the knowledge-base subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// How many passages to retrieve.
    pub top_k: Option<usize>,
}

/// Citation rendering for RAG answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationFormat {
    /// Inline markdown links (default).
    Markdown,
    /// Numbered reference list.
    Numbered,
    /// No citations.
    None,
}

/// A complete (non-streaming) chat response in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalResponse {
    /// Provider-assigned completion id.
    pub id: String,
    /// Unix timestamp of creation.
    pub created: u64,
    /// Model that produced the response (restored to the caller's id by
    /// the orchestrator).
    pub model: String,
    /// At least one choice; index 0 is the primary completion.
    pub choices: Vec<Choice>,
    /// Token accounting, when the provider reports it.
    pub usage: Option<Usage>,
}

/// One completion candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Stable index of this candidate.
    pub index: u32,
    /// The assistant's message.
    pub message: CanonicalMessage,
    /// Why generation stopped. Always populated on non-streaming
    /// responses.
    pub finish_reason: FinishReason,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop or stop sequence.
    Stop,
    /// Token budget exhausted.
    Length,
    /// The model called tools.
    ToolCalls,
    /// Safety filtering intervened.
    ContentFilter,
    /// The provider reported an unclassifiable termination.
    Error,
}

/// Token accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated.
    pub completion_tokens: u32,
    /// Sum of the two.
    pub total_tokens: u32,
}

impl Usage {
    /// Builds usage from prompt/completion counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// One frame of a streaming response.
///
/// Invariants maintained by every producer: the first chunk for a choice
/// carries `role`, later chunks carry only content or tool-call deltas,
/// exactly one final chunk per choice carries a finish reason and no delta
/// content, and `id` is stable across all chunks of one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalChunk {
    /// Completion id, stable across the stream.
    pub id: String,
    /// Unix timestamp of the underlying completion.
    pub created: u64,
    /// Model producing the stream.
    pub model: String,
    /// Incremental updates per choice.
    pub choices: Vec<ChoiceDelta>,
    /// Token accounting, present on the final chunk when the provider
    /// reports it.
    pub usage: Option<Usage>,
}

impl CanonicalChunk {
    /// A chunk with a single choice delta at index 0.
    pub fn single(id: impl Into<String>, created: u64, model: impl Into<String>, delta: MessageDelta) -> Self {
        Self {
            id: id.into(),
            created,
            model: model.into(),
            choices: vec![ChoiceDelta {
                index: 0,
                delta,
                finish_reason: None,
            }],
            usage: None,
        }
    }

    /// The terminal chunk for choice 0, carrying the finish reason and
    /// optional usage.
    pub fn finish(
        id: impl Into<String>,
        created: u64,
        model: impl Into<String>,
        finish_reason: FinishReason,
        usage: Option<Usage>,
    ) -> Self {
        Self {
            id: id.into(),
            created,
            model: model.into(),
            choices: vec![ChoiceDelta {
                index: 0,
                delta: MessageDelta::default(),
                finish_reason: Some(finish_reason),
            }],
            usage,
        }
    }
}

/// Incremental update for one choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceDelta {
    /// Which choice this updates.
    pub index: u32,
    /// The new content since the previous chunk.
    pub delta: MessageDelta,
    /// Present exactly once per choice, on its final chunk.
    pub finish_reason: Option<FinishReason>,
}

/// Partial message content inside a chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDelta {
    /// Set on the first chunk of a choice only.
    pub role: Option<Role>,
    /// Text fragment to append.
    pub content: Option<String>,
    /// Tool-call fragments to apply.
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

impl MessageDelta {
    /// Delta that only establishes the assistant role.
    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Self::default()
        }
    }

    /// Delta carrying a text fragment.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

/// A fragment of a streamed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallDelta {
    /// A new tool call opens: id and name are known, arguments follow.
    Start {
        /// Position in the message's tool-call list.
        index: usize,
        /// Call identifier.
        id: String,
        /// Tool name.
        name: String,
    },
    /// An argument fragment for a previously started call.
    Args {
        /// Position in the message's tool-call list.
        index: usize,
        /// JSON fragment to append to the argument string.
        arguments: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_user_text_skips_assistant_turns() {
        let request = CanonicalRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                CanonicalMessage::text(Role::User, "first"),
                CanonicalMessage::text(Role::Assistant, "reply"),
                CanonicalMessage::text(Role::User, "second"),
            ],
            system: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
            file_ids: None,
            knowledge_base_id: None,
            auto_kb: None,
            retrieval_config: None,
            citation_format: None,
        };

        assert_eq!(request.latest_user_text(), Some("second"));
    }

    #[test]
    fn content_blocks_flatten_to_text() {
        let content = MessageContent::Blocks(vec![
            ContentBlock::Text { text: "a".to_string() },
            ContentBlock::ToolUse {
                id: "call_1".to_string(),
                name: "lookup".to_string(),
                input: serde_json::json!({}),
            },
            ContentBlock::Text { text: "b".to_string() },
        ]);

        assert_eq!(content.as_text(), "a\nb");
    }

    #[test]
    fn finish_chunk_carries_reason_and_no_delta() {
        let chunk = CanonicalChunk::finish("id-1", 0, "m", FinishReason::Stop, Some(Usage::new(3, 4)));

        assert_eq!(chunk.choices.len(), 1);
        assert_eq!(chunk.choices[0].finish_reason, Some(FinishReason::Stop));
        assert!(chunk.choices[0].delta.content.is_none());
        assert!(chunk.choices[0].delta.role.is_none());
        assert_eq!(chunk.usage.map(|u| u.total_tokens), Some(7));
    }
}
