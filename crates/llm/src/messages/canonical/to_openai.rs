//! Canonical types → OpenAI protocol types.

use crate::messages::{canonical, openai};

impl From<canonical::CanonicalRequest> for openai::ChatCompletionRequest {
    fn from(req: canonical::CanonicalRequest) -> Self {
        let mut messages = Vec::with_capacity(req.messages.len() + usize::from(req.system.is_some()));

        // System content returns to an inline leading message.
        if let Some(system) = req.system {
            messages.push(openai::ChatMessage {
                role: openai::ChatRole::System,
                content: Some(openai::MessageContent::Text(system)),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in req.messages {
            messages.push(openai::ChatMessage::from(msg));
        }

        Self {
            model: req.model,
            messages,
            temperature: req.temperature,
            top_p: req.top_p,
            max_tokens: req.max_tokens,
            stop: req.stop_sequences,
            stream: req.stream,
            tools: req.tools.map(|tools| tools.into_iter().map(openai::Tool::from).collect()),
            tool_choice: req.tool_choice.map(openai::ToolChoice::from),
            file_ids: req.file_ids,
            knowledge_base_id: req.knowledge_base_id,
            auto_kb: req.auto_kb,
            retrieval_config: req
                .retrieval_config
                .map(|config| openai::RetrievalConfig { top_k: config.top_k }),
            citation_format: req.citation_format.map(|format| {
                match format {
                    canonical::CitationFormat::Markdown => "markdown",
                    canonical::CitationFormat::Numbered => "numbered",
                    canonical::CitationFormat::None => "none",
                }
                .to_string()
            }),
        }
    }
}

impl From<canonical::Role> for openai::ChatRole {
    fn from(role: canonical::Role) -> Self {
        match role {
            canonical::Role::System => openai::ChatRole::System,
            canonical::Role::User => openai::ChatRole::User,
            canonical::Role::Assistant => openai::ChatRole::Assistant,
            canonical::Role::Tool => openai::ChatRole::Tool,
        }
    }
}

impl From<canonical::CanonicalMessage> for openai::ChatMessage {
    fn from(msg: canonical::CanonicalMessage) -> Self {
        let content = match msg.content {
            canonical::MessageContent::Text(text) => Some(openai::MessageContent::Text(text)),
            canonical::MessageContent::Blocks(blocks) => blocks_to_content(blocks),
        };

        Self {
            role: openai::ChatRole::from(msg.role),
            content,
            name: msg.name,
            tool_calls: msg.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .map(|call| openai::ToolCall {
                        id: call.id,
                        tool_type: openai::ToolType::Function,
                        function: openai::FunctionCall {
                            name: call.name,
                            arguments: call.arguments,
                        },
                    })
                    .collect()
            }),
            tool_call_id: msg.tool_call_id,
        }
    }
}

/// Renders canonical blocks as OpenAI content parts, or plain text when
/// only text blocks are present. Empty block lists map to absent content
/// (the assistant tool-call turn shape).
fn blocks_to_content(blocks: Vec<canonical::ContentBlock>) -> Option<openai::MessageContent> {
    if blocks.is_empty() {
        return None;
    }

    let needs_parts = blocks
        .iter()
        .any(|block| matches!(block, canonical::ContentBlock::Image { .. }));

    if needs_parts {
        let parts = blocks
            .into_iter()
            .filter_map(|block| match block {
                canonical::ContentBlock::Text { text } => Some(openai::ContentPart::Text { text }),
                canonical::ContentBlock::Image { media_type, data, url } => {
                    let url = match (data, url) {
                        (Some(data), _) => format!("data:{media_type};base64,{data}"),
                        (None, Some(url)) => url,
                        (None, None) => return None,
                    };

                    Some(openai::ContentPart::ImageUrl {
                        image_url: openai::ImageUrl { url },
                    })
                }
                // Tool blocks have OpenAI representations outside the content
                // (tool_calls field, tool-role messages) and are not rendered
                // as parts.
                canonical::ContentBlock::ToolUse { .. } | canonical::ContentBlock::ToolResult { .. } => None,
            })
            .collect::<Vec<_>>();

        return Some(openai::MessageContent::Parts(parts));
    }

    let text = blocks
        .into_iter()
        .filter_map(|block| match block {
            canonical::ContentBlock::Text { text } => Some(text),
            canonical::ContentBlock::ToolResult { content, .. } => Some(content),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        None
    } else {
        Some(openai::MessageContent::Text(text))
    }
}

impl From<canonical::ToolDef> for openai::Tool {
    fn from(tool: canonical::ToolDef) -> Self {
        Self {
            tool_type: openai::ToolType::Function,
            function: openai::FunctionDefinition {
                name: tool.name,
                description: tool.description,
                parameters: tool.parameters,
            },
        }
    }
}

impl From<canonical::ToolChoice> for openai::ToolChoice {
    fn from(choice: canonical::ToolChoice) -> Self {
        match choice {
            canonical::ToolChoice::Auto => openai::ToolChoice::Mode(openai::ToolChoiceMode::Auto),
            canonical::ToolChoice::None => openai::ToolChoice::Mode(openai::ToolChoiceMode::None),
            canonical::ToolChoice::Required => openai::ToolChoice::Mode(openai::ToolChoiceMode::Required),
            canonical::ToolChoice::Named { name } => openai::ToolChoice::Specific {
                tool_type: openai::ToolType::Function,
                function: openai::FunctionName { name },
            },
        }
    }
}

impl From<canonical::FinishReason> for openai::FinishReason {
    fn from(reason: canonical::FinishReason) -> Self {
        match reason {
            canonical::FinishReason::Stop => openai::FinishReason::Stop,
            canonical::FinishReason::Length => openai::FinishReason::Length,
            canonical::FinishReason::ToolCalls => openai::FinishReason::ToolCalls,
            canonical::FinishReason::ContentFilter => openai::FinishReason::ContentFilter,
            canonical::FinishReason::Error => openai::FinishReason::Other("error".to_string()),
        }
    }
}

impl From<canonical::Usage> for openai::Usage {
    fn from(usage: canonical::Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

impl From<canonical::CanonicalResponse> for openai::ChatCompletionResponse {
    fn from(resp: canonical::CanonicalResponse) -> Self {
        Self {
            id: resp.id,
            object: openai::ObjectType::ChatCompletion,
            created: resp.created,
            model: resp.model,
            choices: resp
                .choices
                .into_iter()
                .map(|choice| openai::ChatChoice {
                    index: choice.index,
                    message: openai::ChatMessage::from(choice.message),
                    finish_reason: openai::FinishReason::from(choice.finish_reason),
                })
                .collect(),
            usage: resp.usage.map(openai::Usage::from),
        }
    }
}

impl From<canonical::ToolCallDelta> for openai::StreamingToolCall {
    fn from(delta: canonical::ToolCallDelta) -> Self {
        match delta {
            canonical::ToolCallDelta::Start { index, id, name } => openai::StreamingToolCall::Start {
                index,
                id,
                tool_type: openai::ToolType::Function,
                function: openai::FunctionStart {
                    name,
                    arguments: String::new(),
                },
            },
            canonical::ToolCallDelta::Args { index, arguments } => openai::StreamingToolCall::Delta {
                index,
                function: openai::FunctionDelta { arguments },
            },
        }
    }
}

impl From<canonical::CanonicalChunk> for openai::ChatCompletionChunk {
    fn from(chunk: canonical::CanonicalChunk) -> Self {
        Self {
            id: chunk.id,
            object: openai::ObjectType::ChatCompletionChunk,
            created: chunk.created,
            model: chunk.model,
            choices: chunk
                .choices
                .into_iter()
                .map(|choice| openai::ChatChoiceDelta {
                    index: choice.index,
                    delta: openai::ChatMessageDelta {
                        role: choice.delta.role.map(openai::ChatRole::from),
                        content: choice.delta.content,
                        tool_calls: choice
                            .delta
                            .tool_calls
                            .map(|calls| calls.into_iter().map(openai::StreamingToolCall::from).collect()),
                    },
                    finish_reason: choice.finish_reason.map(openai::FinishReason::from),
                })
                .collect(),
            usage: chunk.usage.map(openai::Usage::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::messages::canonical::{
        CanonicalMessage, CanonicalRequest, MessageContent, Role,
    };
    use crate::messages::openai;

    fn request(system: Option<&str>, messages: Vec<CanonicalMessage>) -> CanonicalRequest {
        CanonicalRequest {
            model: "gpt-4o-mini".to_string(),
            messages,
            system: system.map(str::to_string),
            max_tokens: Some(256),
            temperature: Some(0.5),
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
    fn system_slot_becomes_leading_message() {
        let canonical = request(Some("Be brief."), vec![CanonicalMessage::text(Role::User, "Hi")]);
        let openai_req = openai::ChatCompletionRequest::from(canonical);

        assert_eq!(openai_req.messages.len(), 2);
        assert_eq!(openai_req.messages[0].role, openai::ChatRole::System);
        assert_eq!(openai_req.messages[1].role, openai::ChatRole::User);
    }

    #[test]
    fn text_only_round_trip_preserves_roles_order_and_text() {
        let canonical = request(
            Some("sys"),
            vec![
                CanonicalMessage::text(Role::User, "one"),
                CanonicalMessage::text(Role::Assistant, "two"),
                CanonicalMessage::text(Role::User, "three"),
            ],
        );

        let dialect = openai::ChatCompletionRequest::from(canonical.clone());
        let back = CanonicalRequest::from(dialect);

        assert_eq!(back.system, canonical.system);
        assert_eq!(back.max_tokens, canonical.max_tokens);
        assert_eq!(back.temperature, canonical.temperature);
        assert_eq!(back.messages.len(), canonical.messages.len());

        for (a, b) in back.messages.iter().zip(canonical.messages.iter()) {
            assert_eq!(a.role, b.role);
            assert_eq!(a.content, b.content);
        }
    }

    #[test]
    fn empty_block_content_serializes_as_absent() {
        let message = CanonicalMessage {
            role: Role::Assistant,
            content: MessageContent::Blocks(Vec::new()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        };

        let openai_msg = openai::ChatMessage::from(message);
        assert!(openai_msg.content.is_none());
    }
}
