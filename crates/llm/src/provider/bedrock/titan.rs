//! Titan-on-Bedrock family strategy.
//!
//! Flattens conversations into Titan's single prompt, parses the results
//! array, and converts the chunked response stream into canonical chunks.

use crate::{
    error::{LlmError, LlmResult},
    messages::{
        canonical::{CanonicalChunk, CanonicalRequest, CanonicalResponse, FinishReason, MessageDelta, Role, Usage},
        titan,
    },
    provider::now_unix,
};

/// Canonical request → Titan JSON body.
pub(crate) fn shape_request(request: &CanonicalRequest, default_max_tokens: u32) -> LlmResult<Vec<u8>> {
    let mut wire = titan::GenerateRequest::from(request.clone());
    wire.model = None;
    wire.stream = None;

    let mut config = wire.text_generation_config.unwrap_or_default();
    config.max_token_count = Some(config.max_token_count.unwrap_or(default_max_tokens));
    wire.text_generation_config = Some(config);

    serde_json::to_vec(&wire).map_err(|e| LlmError::Validation(format!("Failed to serialize Titan request: {e}")))
}

/// Titan JSON response → canonical response.
pub(crate) fn parse_response(payload: &[u8], model_id: &str) -> LlmResult<CanonicalResponse> {
    let response: titan::GenerateResponse = serde_json::from_slice(payload).map_err(|e| {
        log::error!("Failed to parse Titan response: {e}");
        LlmError::Internal(None)
    })?;

    let mut canonical = CanonicalResponse::from(response);
    canonical.id = generation_id();
    canonical.model = model_id.to_string();
    canonical.created = now_unix();

    Ok(canonical)
}

fn generation_id() -> String {
    format!("titan-{}", uuid::Uuid::new_v4())
}

/// State machine turning Titan stream chunks into canonical chunks.
///
/// Titan frames are plain text fragments; the first frame additionally
/// establishes the assistant role, and the frame carrying a
/// `completionReason` closes the choice with usage.
pub(crate) struct StreamState {
    model: String,
    id: String,
    created: u64,
    started: bool,
    finished: bool,
}

impl StreamState {
    pub fn new(model: String) -> Self {
        Self {
            model,
            id: generation_id(),
            created: now_unix(),
            started: false,
            finished: false,
        }
    }

    /// Feeds one Bedrock payload part (a Titan chunk as JSON).
    pub fn on_payload(&mut self, bytes: &[u8]) -> LlmResult<Vec<CanonicalChunk>> {
        let chunk: titan::StreamChunk = serde_json::from_slice(bytes).map_err(|e| {
            log::warn!("Failed to parse Titan stream chunk: {e}");
            LlmError::Connection(format!("Malformed Titan stream chunk: {e}"))
        })?;

        let mut out = Vec::new();

        if !self.started {
            self.started = true;
            out.push(CanonicalChunk::single(
                self.id.clone(),
                self.created,
                self.model.clone(),
                MessageDelta::role(Role::Assistant),
            ));
        }

        if !chunk.output_text.is_empty() {
            out.push(CanonicalChunk::single(
                self.id.clone(),
                self.created,
                self.model.clone(),
                MessageDelta::text(chunk.output_text),
            ));
        }

        if let Some(reason) = chunk.completion_reason
            && !self.finished
        {
            self.finished = true;

            let usage = chunk
                .total_output_text_token_count
                .map(|completion| Usage::new(chunk.input_text_token_count.unwrap_or(0), completion));

            out.push(CanonicalChunk::finish(
                self.id.clone(),
                self.created,
                self.model.clone(),
                FinishReason::from(reason),
                usage,
            ));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::canonical::CanonicalMessage;
    use serde_json::json;

    fn request() -> CanonicalRequest {
        CanonicalRequest {
            model: "amazon.titan-text-express-v1".to_string(),
            messages: vec![
                CanonicalMessage::text(Role::User, "What is Rust?"),
            ],
            system: Some("Answer tersely.".to_string()),
            max_tokens: None,
            temperature: Some(0.7),
            top_p: Some(0.9),
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
    fn shaping_flattens_and_applies_the_token_default() {
        let body = shape_request(&request(), 512).expect("shapes");
        let wire: serde_json::Value = serde_json::from_slice(&body).expect("valid json");

        let prompt = wire["inputText"].as_str().expect("prompt present");
        assert!(prompt.starts_with("Answer tersely.\n\nUser: What is Rust?"));
        assert!(prompt.ends_with("Bot:"));

        assert_eq!(wire["textGenerationConfig"]["maxTokenCount"], 512);
        assert_eq!(wire["textGenerationConfig"]["temperature"], 0.7);
        assert!(wire.get("model").is_none());
    }

    #[test]
    fn response_parses_with_stamped_identity() {
        let payload = json!({
            "inputTextTokenCount": 6,
            "results": [{"outputText": "A systems language.", "tokenCount": 5, "completionReason": "FINISH"}]
        });

        let response = parse_response(payload.to_string().as_bytes(), "amazon.titan-text-express-v1").expect("parses");

        assert!(response.id.starts_with("titan-"));
        assert_eq!(response.model, "amazon.titan-text-express-v1");
        assert_eq!(response.choices[0].finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.map(|u| u.total_tokens), Some(11));
    }

    #[test]
    fn stream_emits_role_then_text_then_terminal() {
        let mut state = StreamState::new("amazon.titan-text-express-v1".to_string());

        let first = state
            .on_payload(json!({"outputText": "A systems", "index": 0}).to_string().as_bytes())
            .expect("processes");

        assert_eq!(first.len(), 2);
        assert_eq!(first[0].choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(first[1].choices[0].delta.content.as_deref(), Some("A systems"));
        assert_eq!(first[0].id, first[1].id);

        let terminal = state
            .on_payload(
                json!({
                    "outputText": " language.",
                    "index": 0,
                    "totalOutputTextTokenCount": 4,
                    "completionReason": "FINISH",
                    "inputTextTokenCount": 6
                })
                .to_string()
                .as_bytes(),
            )
            .expect("processes");

        assert_eq!(terminal.len(), 2);
        assert_eq!(terminal[0].choices[0].delta.content.as_deref(), Some(" language."));
        assert_eq!(terminal[1].choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(terminal[1].usage.map(|u| u.total_tokens), Some(10));
        assert_eq!(terminal[1].id, first[0].id);
    }

    #[test]
    fn reassembled_stream_matches_the_non_streaming_text() {
        // The same output split across frames concatenates to the one-shot
        // result.
        let mut state = StreamState::new("amazon.titan-text-express-v1".to_string());
        let fragments = ["A ", "systems ", "language."];
        let mut assembled = String::new();

        for (i, fragment) in fragments.iter().enumerate() {
            let mut frame = json!({"outputText": fragment, "index": 0});
            if i == fragments.len() - 1 {
                frame["completionReason"] = json!("FINISH");
            }

            for chunk in state.on_payload(frame.to_string().as_bytes()).expect("processes") {
                if let Some(text) = &chunk.choices[0].delta.content {
                    assembled.push_str(text);
                }
            }
        }

        assert_eq!(assembled, "A systems language.");
    }
}
