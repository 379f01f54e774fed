//! OpenAI protocol types → canonical types.

use crate::messages::{canonical, openai};

impl From<openai::ChatCompletionRequest> for canonical::CanonicalRequest {
    fn from(req: openai::ChatCompletionRequest) -> Self {
        let mut system_parts = Vec::new();
        let mut messages = Vec::with_capacity(req.messages.len());

        for msg in req.messages {
            if msg.role == openai::ChatRole::System {
                if let Some(content) = msg.content {
                    system_parts.push(flatten_content(content));
                }
            } else {
                messages.push(canonical::CanonicalMessage::from(msg));
            }
        }

        let system = match system_parts.len() {
            0 => None,
            _ => Some(system_parts.join("\n")),
        };

        Self {
            model: req.model,
            messages,
            system,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            stop_sequences: req.stop,
            stream: req.stream,
            tools: req
                .tools
                .map(|tools| tools.into_iter().map(canonical::ToolDef::from).collect()),
            tool_choice: req.tool_choice.map(canonical::ToolChoice::from),
            file_ids: req.file_ids,
            knowledge_base_id: req.knowledge_base_id,
            auto_kb: req.auto_kb,
            retrieval_config: req.retrieval_config.map(|config| canonical::RetrievalConfig {
                top_k: config.top_k,
            }),
            citation_format: req.citation_format.as_deref().map(parse_citation_format),
        }
    }
}

fn parse_citation_format(raw: &str) -> canonical::CitationFormat {
    match raw {
        "numbered" => canonical::CitationFormat::Numbered,
        "none" => canonical::CitationFormat::None,
        _ => canonical::CitationFormat::Markdown,
    }
}

fn flatten_content(content: openai::MessageContent) -> String {
    match content {
        openai::MessageContent::Text(text) => text,
        openai::MessageContent::Parts(parts) => parts
            .into_iter()
            .filter_map(|part| match part {
                openai::ContentPart::Text { text } => Some(text),
                openai::ContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

impl From<openai::ChatRole> for canonical::Role {
    fn from(role: openai::ChatRole) -> Self {
        match role {
            openai::ChatRole::System => canonical::Role::System,
            openai::ChatRole::User => canonical::Role::User,
            openai::ChatRole::Assistant => canonical::Role::Assistant,
            openai::ChatRole::Tool => canonical::Role::Tool,
            // Unknown roles degrade to assistant rather than failing the request.
            openai::ChatRole::Other(_) => canonical::Role::Assistant,
        }
    }
}

impl From<openai::ChatMessage> for canonical::CanonicalMessage {
    fn from(msg: openai::ChatMessage) -> Self {
        let content = match msg.content {
            Some(openai::MessageContent::Text(text)) => canonical::MessageContent::Text(text),
            Some(openai::MessageContent::Parts(parts)) => {
                canonical::MessageContent::Blocks(parts.into_iter().map(canonical::ContentBlock::from).collect())
            }
            None => canonical::MessageContent::Blocks(Vec::new()),
        };

        Self {
            role: canonical::Role::from(msg.role),
            content,
            name: msg.name,
            tool_call_id: msg.tool_call_id,
            tool_calls: msg.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .map(|call| canonical::ToolCall {
                        id: call.id,
                        name: call.function.name,
                        arguments: call.function.arguments,
                    })
                    .collect()
            }),
        }
    }
}

impl From<openai::ContentPart> for canonical::ContentBlock {
    fn from(part: openai::ContentPart) -> Self {
        match part {
            openai::ContentPart::Text { text } => canonical::ContentBlock::Text { text },
            openai::ContentPart::ImageUrl { image_url } => match parse_data_uri(&image_url.url) {
                Some((media_type, data)) => canonical::ContentBlock::Image {
                    media_type,
                    data: Some(data),
                    url: None,
                },
                None => canonical::ContentBlock::Image {
                    media_type: "image/jpeg".to_string(),
                    data: None,
                    url: Some(image_url.url),
                },
            },
        }
    }
}

/// Splits a `data:<media>;base64,<payload>` URI into its parts.
fn parse_data_uri(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64").unwrap_or(header);

    Some((media_type.to_string(), payload.to_string()))
}

impl From<openai::Tool> for canonical::ToolDef {
    fn from(tool: openai::Tool) -> Self {
        Self {
            name: tool.function.name,
            description: tool.function.description,
            parameters: tool.function.parameters,
        }
    }
}

impl From<openai::ToolChoice> for canonical::ToolChoice {
    fn from(choice: openai::ToolChoice) -> Self {
        match choice {
            openai::ToolChoice::Mode(openai::ToolChoiceMode::None) => canonical::ToolChoice::None,
            openai::ToolChoice::Mode(openai::ToolChoiceMode::Auto) => canonical::ToolChoice::Auto,
            openai::ToolChoice::Mode(openai::ToolChoiceMode::Required) => canonical::ToolChoice::Required,
            openai::ToolChoice::Specific { function, .. } => canonical::ToolChoice::Named { name: function.name },
        }
    }
}

impl From<openai::FinishReason> for canonical::FinishReason {
    fn from(reason: openai::FinishReason) -> Self {
        match reason {
            openai::FinishReason::Stop => canonical::FinishReason::Stop,
            openai::FinishReason::Length => canonical::FinishReason::Length,
            openai::FinishReason::ToolCalls => canonical::FinishReason::ToolCalls,
            openai::FinishReason::ContentFilter => canonical::FinishReason::ContentFilter,
            openai::FinishReason::Other(_) => canonical::FinishReason::Error,
        }
    }
}

impl From<openai::Usage> for canonical::Usage {
    fn from(usage: openai::Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

impl From<openai::ChatCompletionResponse> for canonical::CanonicalResponse {
    fn from(resp: openai::ChatCompletionResponse) -> Self {
        Self {
            id: resp.id,
            created: resp.created,
            model: resp.model,
            choices: resp
                .choices
                .into_iter()
                .map(|choice| canonical::Choice {
                    index: choice.index,
                    message: canonical::CanonicalMessage::from(choice.message),
                    finish_reason: canonical::FinishReason::from(choice.finish_reason),
                })
                .collect(),
            usage: resp.usage.map(canonical::Usage::from),
        }
    }
}

impl From<openai::StreamingToolCall> for canonical::ToolCallDelta {
    fn from(call: openai::StreamingToolCall) -> Self {
        match call {
            openai::StreamingToolCall::Start { index, id, function, .. } => canonical::ToolCallDelta::Start {
                index,
                id,
                name: function.name,
            },
            openai::StreamingToolCall::Delta { index, function } => canonical::ToolCallDelta::Args {
                index,
                arguments: function.arguments,
            },
        }
    }
}

impl From<openai::ChatCompletionChunk> for canonical::CanonicalChunk {
    fn from(chunk: openai::ChatCompletionChunk) -> Self {
        Self {
            id: chunk.id,
            created: chunk.created,
            model: chunk.model,
            choices: chunk
                .choices
                .into_iter()
                .map(|choice| canonical::ChoiceDelta {
                    index: choice.index,
                    delta: canonical::MessageDelta {
                        role: choice.delta.role.map(canonical::Role::from),
                        content: choice.delta.content,
                        tool_calls: choice
                            .delta
                            .tool_calls
                            .map(|calls| calls.into_iter().map(canonical::ToolCallDelta::from).collect()),
                    },
                    finish_reason: choice.finish_reason.map(canonical::FinishReason::from),
                })
                .collect(),
            usage: chunk.usage.map(canonical::Usage::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::canonical::{CanonicalRequest, MessageContent, Role};
    use indoc::indoc;

    fn parse(json: &str) -> CanonicalRequest {
        let request: openai::ChatCompletionRequest = serde_json::from_str(json).expect("valid request");
        CanonicalRequest::from(request)
    }

    #[test]
    fn system_message_moves_to_the_system_slot() {
        let canonical = parse(indoc! {r#"
            {
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hello!"}
                ]
            }
        "#});

        assert_eq!(canonical.system.as_deref(), Some("Be brief."));
        assert_eq!(canonical.messages.len(), 1);
        assert_eq!(canonical.messages[0].role, Role::User);
    }

    #[test]
    fn multiple_system_messages_concatenate() {
        let canonical = parse(indoc! {r#"
            {
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "One."},
                    {"role": "system", "content": "Two."},
                    {"role": "user", "content": "Hi"}
                ]
            }
        "#});

        assert_eq!(canonical.system.as_deref(), Some("One.\nTwo."));
    }

    #[test]
    fn tool_call_turns_preserve_call_ids() {
        let canonical = parse(indoc! {r#"
            {
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "user", "content": "Weather?"},
                    {"role": "assistant", "content": null, "tool_calls": [
                        {"id": "call_1", "type": "function",
                         "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}}
                    ]},
                    {"role": "tool", "tool_call_id": "call_1", "content": "22C"}
                ]
            }
        "#});

        let assistant = &canonical.messages[1];
        let calls = assistant.tool_calls.as_ref().expect("tool calls present");
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "get_weather");

        let tool = &canonical.messages[2];
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn data_uri_image_parts_become_inline_blocks() {
        let canonical = parse(indoc! {r#"
            {
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "user", "content": [
                        {"type": "text", "text": "What is this?"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,aWJtZQ=="}}
                    ]}
                ]
            }
        "#});

        let MessageContent::Blocks(blocks) = &canonical.messages[0].content else {
            unreachable!("parts convert to blocks");
        };

        assert!(matches!(
            &blocks[1],
            canonical::ContentBlock::Image { media_type, data: Some(data), url: None }
                if media_type == "image/png" && data == "aWJtZQ=="
        ));
    }
}
