//! Canonical types → Bedrock Titan protocol types.

use crate::messages::{canonical, titan};

impl From<canonical::CanonicalRequest> for titan::GenerateRequest {
    fn from(req: canonical::CanonicalRequest) -> Self {
        let config = titan::TextGenerationConfig {
            max_token_count: req.max_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            stop_sequences: req.stop_sequences,
        };

        let has_config = config.max_token_count.is_some()
            || config.temperature.is_some()
            || config.top_p.is_some()
            || config.stop_sequences.is_some();

        Self {
            input_text: flatten_conversation(req.system.as_deref(), &req.messages),
            text_generation_config: has_config.then_some(config),
            model: Some(req.model),
            stream: req.stream,
        }
    }
}

/// Serializes a conversation into Titan's single prompt string.
///
/// System content becomes a leading preamble separated by a blank line.
/// Turns are prefixed `User: ` / `Bot: ` one per line, and the prompt ends
/// with a bare `Bot:` cue so the model answers as the bot.
pub(crate) fn flatten_conversation(system: Option<&str>, messages: &[canonical::CanonicalMessage]) -> String {
    let mut prompt = String::new();

    if let Some(system) = system {
        prompt.push_str(system);
        prompt.push_str("\n\n");
    }

    for msg in messages {
        let text = msg.content.as_text();

        match msg.role {
            canonical::Role::Assistant => {
                prompt.push_str(titan::BOT_PREFIX);
                prompt.push(' ');
                prompt.push_str(&text);
            }
            // Titan has no role model beyond the two prefixes; system
            // content was handled above and tool turns read as user input.
            canonical::Role::User | canonical::Role::System | canonical::Role::Tool => {
                prompt.push_str(titan::USER_PREFIX);
                prompt.push_str(&text);
            }
        }

        prompt.push('\n');
    }

    prompt.push_str(titan::BOT_PREFIX);
    prompt
}

impl From<canonical::FinishReason> for titan::CompletionReason {
    fn from(reason: canonical::FinishReason) -> Self {
        match reason {
            canonical::FinishReason::Stop | canonical::FinishReason::ToolCalls => titan::CompletionReason::Finish,
            canonical::FinishReason::Length => titan::CompletionReason::Length,
            canonical::FinishReason::ContentFilter => titan::CompletionReason::ContentFiltered,
            canonical::FinishReason::Error => titan::CompletionReason::Other("ERROR".to_string()),
        }
    }
}

impl From<canonical::CanonicalResponse> for titan::GenerateResponse {
    fn from(resp: canonical::CanonicalResponse) -> Self {
        let input_text_token_count = resp.usage.map(|usage| usage.prompt_tokens).unwrap_or(0);

        let results = resp
            .choices
            .into_iter()
            .map(|choice| titan::GenerateResult {
                output_text: choice.message.content.as_text(),
                token_count: resp.usage.map(|usage| usage.completion_tokens).unwrap_or(0),
                completion_reason: titan::CompletionReason::from(choice.finish_reason),
            })
            .collect();

        Self {
            input_text_token_count,
            results,
        }
    }
}

impl From<canonical::CanonicalChunk> for titan::StreamChunk {
    fn from(chunk: canonical::CanonicalChunk) -> Self {
        let choice = chunk.choices.into_iter().next();

        let (content, finish_reason, index) = match choice {
            Some(choice) => (choice.delta.content, choice.finish_reason, choice.index),
            None => (None, None, 0),
        };

        Self {
            output_text: content.unwrap_or_default(),
            index,
            total_output_text_token_count: chunk.usage.map(|usage| usage.completion_tokens),
            completion_reason: finish_reason.map(titan::CompletionReason::from),
            input_text_token_count: chunk.usage.map(|usage| usage.prompt_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::canonical::{CanonicalMessage, Role};
    use insta::assert_snapshot;

    #[test]
    fn conversation_flattens_with_turn_prefixes_and_trailing_cue() {
        let messages = vec![
            CanonicalMessage::text(Role::User, "What is Rust?"),
            CanonicalMessage::text(Role::Assistant, "A systems language."),
            CanonicalMessage::text(Role::User, "Name one feature."),
        ];

        let prompt = flatten_conversation(Some("Answer tersely."), &messages);

        assert_snapshot!(prompt, @r"
        Answer tersely.

        User: What is Rust?
        Bot: A systems language.
        User: Name one feature.
        Bot:
        ");
    }

    #[test]
    fn system_only_request_keeps_the_cue() {
        let prompt = flatten_conversation(None, &[CanonicalMessage::text(Role::User, "Hi")]);
        assert!(prompt.ends_with("Bot:"));
        assert!(prompt.starts_with("User: Hi"));
    }
}
