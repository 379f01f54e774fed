//! Claude-on-Bedrock family strategy.
//!
//! Shapes canonical requests into the native Anthropic messages body,
//! parses responses, and converts the Anthropic event stream (delivered as
//! Bedrock payload parts) into canonical chunks.

use crate::{
    error::{LlmError, LlmResult},
    messages::{
        canonical::{CanonicalChunk, CanonicalRequest, CanonicalResponse, FinishReason, MessageDelta, Role, ToolCallDelta, Usage},
        claude,
    },
    provider::now_unix,
};

/// Canonical request → Anthropic JSON body.
///
/// `max_tokens` is mandatory on this wire; the family default applies when
/// the caller omitted it. The gateway-extension fields never serialize.
pub(crate) fn shape_request(request: &CanonicalRequest, default_max_tokens: u32) -> LlmResult<Vec<u8>> {
    let mut wire = claude::ChatRequest::from(request.clone());
    wire.model = None;
    wire.stream = None;
    wire.max_tokens = Some(wire.max_tokens.unwrap_or(default_max_tokens));

    serde_json::to_vec(&wire).map_err(|e| LlmError::Validation(format!("Failed to serialize Claude request: {e}")))
}

/// Anthropic JSON response → canonical response.
pub(crate) fn parse_response(payload: &[u8], model_id: &str) -> LlmResult<CanonicalResponse> {
    let response: claude::ChatResponse = serde_json::from_slice(payload).map_err(|e| {
        log::error!("Failed to parse Claude response: {e}");
        LlmError::Internal(None)
    })?;

    let mut canonical = CanonicalResponse::from(response);
    canonical.model = model_id.to_string();
    canonical.created = now_unix();

    Ok(canonical)
}

/// State machine turning Anthropic stream events into canonical chunks.
///
/// Tracks the message id from `message_start`, maps content-block indices
/// to tool-call positions, and holds usage until `message_delta` closes the
/// choice. Exactly one terminal chunk is emitted per stream.
pub(crate) struct StreamState {
    model: String,
    message_id: String,
    created: u64,
    prompt_tokens: u32,
    /// Content-block index → position in the tool_calls list.
    tool_call_positions: std::collections::HashMap<u32, usize>,
    finished: bool,
}

impl StreamState {
    pub fn new(model: String) -> Self {
        Self {
            model,
            message_id: String::new(),
            created: now_unix(),
            prompt_tokens: 0,
            tool_call_positions: std::collections::HashMap::new(),
            finished: false,
        }
    }

    /// Feeds one Bedrock payload part (an Anthropic event as JSON).
    pub fn on_payload(&mut self, bytes: &[u8]) -> LlmResult<Vec<CanonicalChunk>> {
        let event: claude::StreamEvent = serde_json::from_slice(bytes).map_err(|e| {
            log::warn!("Failed to parse Claude stream event: {e}");
            LlmError::Connection(format!("Malformed Claude stream event: {e}"))
        })?;

        Ok(self.on_event(event))
    }

    fn chunk(&self, delta: MessageDelta) -> CanonicalChunk {
        CanonicalChunk::single(self.message_id.clone(), self.created, self.model.clone(), delta)
    }

    fn on_event(&mut self, event: claude::StreamEvent) -> Vec<CanonicalChunk> {
        match event {
            claude::StreamEvent::MessageStart { message } => {
                self.message_id = message.id;
                self.prompt_tokens = message.usage.input_tokens;

                vec![self.chunk(MessageDelta::role(Role::Assistant))]
            }

            claude::StreamEvent::ContentBlockStart { index, content_block } => match content_block {
                claude::StreamContentBlock::ToolUse { id, name } => {
                    let position = self.tool_call_positions.len();
                    self.tool_call_positions.insert(index, position);

                    vec![self.chunk(MessageDelta {
                        tool_calls: Some(vec![ToolCallDelta::Start {
                            index: position,
                            id,
                            name,
                        }]),
                        ..MessageDelta::default()
                    })]
                }
                claude::StreamContentBlock::Text { .. } => Vec::new(),
            },

            claude::StreamEvent::ContentBlockDelta { index, delta } => match delta {
                claude::BlockDelta::TextDelta { text } => vec![self.chunk(MessageDelta::text(text))],
                claude::BlockDelta::InputJsonDelta { partial_json } => {
                    let Some(&position) = self.tool_call_positions.get(&index) else {
                        log::warn!("Claude input_json_delta for unknown block index {index}");
                        return Vec::new();
                    };

                    vec![self.chunk(MessageDelta {
                        tool_calls: Some(vec![ToolCallDelta::Args {
                            index: position,
                            arguments: partial_json,
                        }]),
                        ..MessageDelta::default()
                    })]
                }
            },

            claude::StreamEvent::MessageDelta { delta, usage } => {
                if self.finished {
                    return Vec::new();
                }
                self.finished = true;

                let finish_reason = delta
                    .stop_reason
                    .map(FinishReason::from)
                    .unwrap_or(FinishReason::Stop);

                vec![CanonicalChunk::finish(
                    self.message_id.clone(),
                    self.created,
                    self.model.clone(),
                    finish_reason,
                    Some(Usage::new(self.prompt_tokens.max(usage.input_tokens), usage.output_tokens)),
                )]
            }

            claude::StreamEvent::Error { error } => {
                log::error!("Claude stream error: {} - {}", error.error_type, error.message);
                Vec::new()
            }

            // message_stop closes the wire; the terminal chunk already went
            // out with message_delta. Pings and block stops carry nothing.
            claude::StreamEvent::MessageStop
            | claude::StreamEvent::Ping
            | claude::StreamEvent::ContentBlockStop { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::canonical::{CanonicalMessage, MessageContent};
    use serde_json::json;

    fn request(max_tokens: Option<u32>) -> CanonicalRequest {
        CanonicalRequest {
            model: "anthropic.claude-3-haiku-20240307-v1:0".to_string(),
            messages: vec![CanonicalMessage::text(Role::User, "Hello!")],
            system: Some("Be brief.".to_string()),
            max_tokens,
            temperature: Some(0.2),
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
        }
    }

    #[test]
    fn missing_max_tokens_gets_the_family_default() {
        let body = shape_request(&request(None), 1024).expect("shapes");
        let wire: serde_json::Value = serde_json::from_slice(&body).expect("valid json");

        assert_eq!(wire["max_tokens"], 1024);
        assert_eq!(wire["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(wire["system"], "Be brief.");
        assert!(wire.get("model").is_none());
        assert!(wire.get("stream").is_none());
    }

    #[test]
    fn explicit_max_tokens_wins_over_the_default() {
        let body = shape_request(&request(Some(2000)), 1024).expect("shapes");
        let wire: serde_json::Value = serde_json::from_slice(&body).expect("valid json");

        assert_eq!(wire["max_tokens"], 2000);
    }

    fn feed(state: &mut StreamState, event: serde_json::Value) -> Vec<CanonicalChunk> {
        state
            .on_payload(event.to_string().as_bytes())
            .expect("event processes")
    }

    #[test]
    fn event_stream_produces_role_content_and_terminal_chunks() {
        let mut state = StreamState::new("anthropic.claude-3-haiku-20240307-v1:0".to_string());

        let start = feed(
            &mut state,
            json!({
                "type": "message_start",
                "message": {
                    "id": "msg_stream",
                    "model": "claude-3-haiku",
                    "role": "assistant",
                    "content": [],
                    "usage": {"input_tokens": 12, "output_tokens": 0}
                }
            }),
        );
        assert_eq!(start.len(), 1);
        assert_eq!(start[0].choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(start[0].id, "msg_stream");

        let text = feed(
            &mut state,
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}}),
        );
        assert_eq!(text[0].choices[0].delta.content.as_deref(), Some("Hi"));
        assert_eq!(text[0].id, "msg_stream");

        let terminal = feed(
            &mut state,
            json!({
                "type": "message_delta",
                "delta": {"stop_reason": "end_turn"},
                "usage": {"input_tokens": 12, "output_tokens": 4}
            }),
        );
        assert_eq!(terminal[0].choices[0].finish_reason, Some(FinishReason::Stop));
        assert!(terminal[0].choices[0].delta.content.is_none());
        assert_eq!(terminal[0].usage.map(|u| u.total_tokens), Some(16));

        let stop = feed(&mut state, json!({"type": "message_stop"}));
        assert!(stop.is_empty());
    }

    #[test]
    fn tool_use_blocks_stream_as_start_then_args() {
        let mut state = StreamState::new("anthropic.claude-3-haiku-20240307-v1:0".to_string());

        feed(
            &mut state,
            json!({
                "type": "message_start",
                "message": {"id": "msg_t", "model": "m", "role": "assistant", "content": [],
                             "usage": {"input_tokens": 1, "output_tokens": 0}}
            }),
        );

        let start = feed(
            &mut state,
            json!({
                "type": "content_block_start",
                "index": 1,
                "content_block": {"type": "tool_use", "id": "toolu_5", "name": "get_weather"}
            }),
        );
        let calls = start[0].choices[0].delta.tool_calls.as_ref().expect("calls");
        assert_eq!(
            calls[0],
            ToolCallDelta::Start {
                index: 0,
                id: "toolu_5".to_string(),
                name: "get_weather".to_string()
            }
        );

        let args = feed(
            &mut state,
            json!({
                "type": "content_block_delta",
                "index": 1,
                "delta": {"type": "input_json_delta", "partial_json": "{\"city\":"}
            }),
        );
        let calls = args[0].choices[0].delta.tool_calls.as_ref().expect("calls");
        assert_eq!(
            calls[0],
            ToolCallDelta::Args {
                index: 0,
                arguments: "{\"city\":".to_string()
            }
        );

        let terminal = feed(
            &mut state,
            json!({
                "type": "message_delta",
                "delta": {"stop_reason": "tool_use"},
                "usage": {"output_tokens": 9}
            }),
        );
        assert_eq!(terminal[0].choices[0].finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn response_parse_stamps_model_and_timestamp() {
        let payload = json!({
            "id": "msg_abc",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hello!"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 5}
        });

        let response =
            parse_response(payload.to_string().as_bytes(), "anthropic.claude-3-haiku-20240307-v1:0").expect("parses");

        assert_eq!(response.model, "anthropic.claude-3-haiku-20240307-v1:0");
        assert!(response.created > 0);
        assert_eq!(response.choices[0].finish_reason, FinishReason::Stop);
        assert_eq!(
            MessageContent::Text("Hello!".to_string()),
            response.choices[0].message.content
        );
    }
}
