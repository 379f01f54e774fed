//! Bedrock Titan protocol types → canonical types.

use crate::messages::{canonical, titan};

impl From<titan::GenerateRequest> for canonical::CanonicalRequest {
    fn from(req: titan::GenerateRequest) -> Self {
        let (system, messages) = parse_prompt(&req.input_text);

        let config = req.text_generation_config.unwrap_or_default();

        Self {
            model: req.model.unwrap_or_default(),
            messages,
            system,
            max_tokens: config.max_token_count,
            temperature: config.temperature,
            top_p: config.top_p,
            stop_sequences: config.stop_sequences,
            stream: req.stream,
            tools: None,
            tool_choice: None,
            file_ids: None,
            knowledge_base_id: None,
            auto_kb: None,
            retrieval_config: None,
            citation_format: None,
        }
    }
}

/// Recovers turns from a flattened Titan prompt.
///
/// Inverse of the flattening in `to_titan`: lines prefixed `User: ` /
/// `Bot:` open turns, continuation lines append to the current turn, text
/// before the first prefix is the system preamble, and a bare trailing
/// `Bot:` cue is dropped. A prompt with no prefixes at all is a single
/// user message.
fn parse_prompt(input: &str) -> (Option<String>, Vec<canonical::CanonicalMessage>) {
    let mut system_lines: Vec<&str> = Vec::new();
    let mut messages = Vec::new();
    let mut current: Option<(canonical::Role, String)> = None;

    for line in input.lines() {
        if let Some(rest) = line.strip_prefix(titan::USER_PREFIX) {
            flush(&mut current, &mut messages);
            current = Some((canonical::Role::User, rest.to_string()));
        } else if let Some(rest) = line.strip_prefix(titan::BOT_PREFIX) {
            flush(&mut current, &mut messages);
            current = Some((canonical::Role::Assistant, rest.strip_prefix(' ').unwrap_or(rest).to_string()));
        } else if let Some((_, text)) = current.as_mut() {
            text.push('\n');
            text.push_str(line);
        } else {
            system_lines.push(line);
        }
    }

    flush(&mut current, &mut messages);

    // Drop the trailing generation cue.
    if matches!(
        messages.last(),
        Some(msg) if msg.role == canonical::Role::Assistant && msg.content.as_text().is_empty()
    ) {
        messages.pop();
    }

    while system_lines.last().is_some_and(|line| line.is_empty()) {
        system_lines.pop();
    }

    let system = if system_lines.is_empty() {
        None
    } else {
        Some(system_lines.join("\n"))
    };

    if messages.is_empty() {
        // No recognizable structure: the whole prompt is one user message.
        return (
            None,
            vec![canonical::CanonicalMessage::text(canonical::Role::User, input.to_string())],
        );
    }

    (system, messages)
}

fn flush(current: &mut Option<(canonical::Role, String)>, messages: &mut Vec<canonical::CanonicalMessage>) {
    if let Some((role, text)) = current.take() {
        messages.push(canonical::CanonicalMessage::text(role, text));
    }
}

impl From<titan::CompletionReason> for canonical::FinishReason {
    fn from(reason: titan::CompletionReason) -> Self {
        match reason {
            titan::CompletionReason::Finish => canonical::FinishReason::Stop,
            titan::CompletionReason::Length => canonical::FinishReason::Length,
            titan::CompletionReason::ContentFiltered => canonical::FinishReason::ContentFilter,
            titan::CompletionReason::Other(_) => canonical::FinishReason::Error,
        }
    }
}

impl From<titan::GenerateResponse> for canonical::CanonicalResponse {
    fn from(resp: titan::GenerateResponse) -> Self {
        let prompt_tokens = resp.input_text_token_count;
        let completion_tokens: u32 = resp.results.iter().map(|result| result.token_count).sum();

        let choices = resp
            .results
            .into_iter()
            .enumerate()
            .map(|(index, result)| canonical::Choice {
                index: index as u32,
                message: canonical::CanonicalMessage::text(canonical::Role::Assistant, result.output_text),
                finish_reason: canonical::FinishReason::from(result.completion_reason),
            })
            .collect();

        Self {
            // Titan responses carry no id or timestamp; the provider stamps
            // both.
            id: String::new(),
            created: 0,
            model: String::new(),
            choices,
            usage: Some(canonical::Usage::new(prompt_tokens, completion_tokens)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::canonical::{CanonicalMessage, CanonicalRequest, FinishReason, Role};
    use crate::messages::titan::GenerateRequest;
    use indoc::indoc;

    #[test]
    fn flattened_prompt_parses_back_into_turns() {
        let request: GenerateRequest = serde_json::from_str(indoc! {r#"
            {
                "inputText": "Answer tersely.\n\nUser: What is Rust?\nBot: A systems language.\nUser: More\nBot:",
                "model": "amazon.titan-text-express-v1"
            }
        "#})
        .expect("valid request");

        let canonical = CanonicalRequest::from(request);

        assert_eq!(canonical.system.as_deref(), Some("Answer tersely."));
        assert_eq!(canonical.messages.len(), 3);
        assert_eq!(canonical.messages[0].role, Role::User);
        assert_eq!(canonical.messages[1].role, Role::Assistant);
        assert_eq!(canonical.messages[1].content.as_text(), "A systems language.");
        assert_eq!(canonical.messages[2].content.as_text(), "More");
    }

    #[test]
    fn unstructured_prompt_is_one_user_message() {
        let request: GenerateRequest =
            serde_json::from_str(r#"{"inputText": "Tell me about Rust"}"#).expect("valid request");

        let canonical = CanonicalRequest::from(request);

        assert!(canonical.system.is_none());
        assert_eq!(canonical.messages.len(), 1);
        assert_eq!(canonical.messages[0].content.as_text(), "Tell me about Rust");
    }

    #[test]
    fn round_trip_preserves_text_only_conversations() {
        let original = CanonicalRequest {
            model: "amazon.titan-text-express-v1".to_string(),
            messages: vec![
                CanonicalMessage::text(Role::User, "one"),
                CanonicalMessage::text(Role::Assistant, "two"),
                CanonicalMessage::text(Role::User, "three"),
            ],
            system: Some("preamble".to_string()),
            max_tokens: Some(512),
            temperature: Some(0.25),
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

        let dialect = crate::messages::titan::GenerateRequest::from(original.clone());
        let back = CanonicalRequest::from(dialect);

        assert_eq!(back.system, original.system);
        assert_eq!(back.max_tokens, original.max_tokens);
        assert_eq!(back.temperature, original.temperature);
        assert_eq!(back.messages.len(), original.messages.len());

        for (a, b) in back.messages.iter().zip(original.messages.iter()) {
            assert_eq!(a.role, b.role);
            assert_eq!(a.content, b.content);
        }
    }

    #[test]
    fn response_maps_completion_reasons() {
        let response: crate::messages::titan::GenerateResponse = serde_json::from_str(indoc! {r#"
            {
                "inputTextTokenCount": 7,
                "results": [
                    {"outputText": "truncated...", "tokenCount": 512, "completionReason": "LENGTH"}
                ]
            }
        "#})
        .expect("valid response");

        let canonical = canonical::CanonicalResponse::from(response);

        assert_eq!(canonical.choices[0].finish_reason, FinishReason::Length);
        assert_eq!(canonical.usage.map(|u| u.prompt_tokens), Some(7));
    }
}
