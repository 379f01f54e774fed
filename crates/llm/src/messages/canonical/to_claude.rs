//! Canonical types → Bedrock Claude protocol types.

use serde_json::Value;

use crate::messages::{canonical, claude};

impl From<canonical::CanonicalRequest> for claude::ChatRequest {
    fn from(req: canonical::CanonicalRequest) -> Self {
        let mut messages = Vec::with_capacity(req.messages.len());

        for msg in req.messages {
            match msg.role {
                canonical::Role::User => messages.push(claude::InputMessage {
                    role: claude::InputRole::User,
                    content: convert_content(msg.content),
                }),
                canonical::Role::Assistant => messages.push(assistant_message(msg)),
                // Tool results ride in user messages on the Claude wire.
                canonical::Role::Tool => messages.push(claude::InputMessage {
                    role: claude::InputRole::User,
                    content: claude::InputContent::Blocks(vec![claude::ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.unwrap_or_default(),
                        content: msg.content.as_text(),
                    }]),
                }),
                // System content was extracted to the dedicated slot on
                // ingress; a stray system message is carried as a user turn
                // so nothing silently disappears.
                canonical::Role::System => messages.push(claude::InputMessage {
                    role: claude::InputRole::User,
                    content: convert_content(msg.content),
                }),
            }
        }

        Self {
            anthropic_version: claude::ANTHROPIC_VERSION.to_string(),
            model: Some(req.model),
            max_tokens: req.max_tokens,
            messages,
            system: req.system,
            temperature: req.temperature,
            top_p: req.top_p,
            stop_sequences: req.stop_sequences,
            stream: req.stream,
            tools: req.tools.map(|tools| {
                tools
                    .into_iter()
                    .map(|tool| claude::ToolDef {
                        name: tool.name,
                        description: tool.description,
                        input_schema: tool.parameters,
                    })
                    .collect()
            }),
            tool_choice: req.tool_choice.map(claude::ToolChoice::from),
        }
    }
}

fn assistant_message(msg: canonical::CanonicalMessage) -> claude::InputMessage {
    let mut blocks = match msg.content {
        canonical::MessageContent::Text(text) => {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![claude::ContentBlock::Text { text }]
            }
        }
        canonical::MessageContent::Blocks(blocks) => blocks
            .into_iter()
            .filter_map(|block| match block {
                canonical::ContentBlock::Text { text } => Some(claude::ContentBlock::Text { text }),
                canonical::ContentBlock::Image { media_type, data, url } => {
                    Some(claude::ContentBlock::Image {
                        source: match (data, url) {
                            (Some(data), _) => claude::ImageSource::Base64 { media_type, data },
                            (None, Some(url)) => claude::ImageSource::Url { url },
                            (None, None) => return None,
                        },
                    })
                }
                canonical::ContentBlock::ToolUse { id, name, input } => {
                    Some(claude::ContentBlock::ToolUse { id, name, input })
                }
                canonical::ContentBlock::ToolResult { tool_use_id, content } => {
                    Some(claude::ContentBlock::ToolResult { tool_use_id, content })
                }
            })
            .collect(),
    };

    // OpenAI-style tool_calls become tool_use blocks after the text.
    for call in msg.tool_calls.into_iter().flatten() {
        let input: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Object(Default::default()));

        blocks.push(claude::ContentBlock::ToolUse {
            id: call.id,
            name: call.name,
            input,
        });
    }

    claude::InputMessage {
        role: claude::InputRole::Assistant,
        content: claude::InputContent::Blocks(blocks),
    }
}

fn convert_content(content: canonical::MessageContent) -> claude::InputContent {
    match content {
        canonical::MessageContent::Text(text) => claude::InputContent::Text(text),
        canonical::MessageContent::Blocks(blocks) => claude::InputContent::Blocks(
            blocks
                .into_iter()
                .filter_map(|block| match block {
                    canonical::ContentBlock::Text { text } => Some(claude::ContentBlock::Text { text }),
                    canonical::ContentBlock::Image { media_type, data, url } => Some(claude::ContentBlock::Image {
                        source: match (data, url) {
                            (Some(data), _) => claude::ImageSource::Base64 { media_type, data },
                            (None, Some(url)) => claude::ImageSource::Url { url },
                            (None, None) => return None,
                        },
                    }),
                    canonical::ContentBlock::ToolUse { id, name, input } => {
                        Some(claude::ContentBlock::ToolUse { id, name, input })
                    }
                    canonical::ContentBlock::ToolResult { tool_use_id, content } => {
                        Some(claude::ContentBlock::ToolResult { tool_use_id, content })
                    }
                })
                .collect(),
        ),
    }
}

impl From<canonical::ToolChoice> for claude::ToolChoice {
    fn from(choice: canonical::ToolChoice) -> Self {
        match choice {
            canonical::ToolChoice::Auto => claude::ToolChoice::Auto,
            canonical::ToolChoice::Required => claude::ToolChoice::Any,
            canonical::ToolChoice::None => claude::ToolChoice::None,
            canonical::ToolChoice::Named { name } => claude::ToolChoice::Tool { name },
        }
    }
}

impl From<canonical::FinishReason> for claude::StopReason {
    fn from(reason: canonical::FinishReason) -> Self {
        match reason {
            canonical::FinishReason::Stop => claude::StopReason::EndTurn,
            canonical::FinishReason::Length => claude::StopReason::MaxTokens,
            canonical::FinishReason::ToolCalls => claude::StopReason::ToolUse,
            canonical::FinishReason::ContentFilter => claude::StopReason::ContentFiltered,
            canonical::FinishReason::Error => claude::StopReason::Other("error".to_string()),
        }
    }
}

impl From<canonical::CanonicalResponse> for claude::ChatResponse {
    fn from(resp: canonical::CanonicalResponse) -> Self {
        // Claude's response shape has no notion of multiple choices; the
        // primary one represents the completion.
        let (message, finish_reason) = resp
            .choices
            .into_iter()
            .next()
            .map(|choice| (choice.message, choice.finish_reason))
            .unwrap_or_else(|| {
                (
                    canonical::CanonicalMessage::text(canonical::Role::Assistant, ""),
                    canonical::FinishReason::Stop,
                )
            });

        let mut content = Vec::new();

        let text = message.content.as_text();
        if !text.is_empty() {
            content.push(claude::ResponseContent::Text { text });
        }

        for call in message.tool_calls.into_iter().flatten() {
            let input: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Object(Default::default()));

            content.push(claude::ResponseContent::ToolUse {
                id: call.id,
                name: call.name,
                input,
            });
        }

        let usage = resp
            .usage
            .map(|usage| claude::TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            })
            .unwrap_or_default();

        Self {
            id: resp.id,
            r#type: claude::ResponseType::Message,
            role: "assistant".to_string(),
            content,
            model: Some(resp.model),
            stop_reason: Some(claude::StopReason::from(finish_reason)),
            stop_sequence: None,
            usage,
        }
    }
}

/// Renders one canonical chunk as Claude stream events.
///
/// The canonical invariants (role on the first chunk, one terminal chunk)
/// let this stay stateless: a role delta opens the message, text and
/// tool-call deltas map to block events, the finish reason closes with a
/// `message_delta`. The caller appends `message_stop` once the stream ends.
pub(crate) fn stream_events_from_chunk(chunk: canonical::CanonicalChunk) -> Vec<claude::StreamEvent> {
    let mut events = Vec::new();

    for choice in chunk.choices {
        if choice.delta.role.is_some() {
            events.push(claude::StreamEvent::MessageStart {
                message: claude::MessageStart {
                    id: chunk.id.clone(),
                    model: chunk.model.clone(),
                    role: "assistant".to_string(),
                    content: Vec::new(),
                    usage: claude::TokenUsage::default(),
                },
            });
        }

        if let Some(text) = choice.delta.content {
            events.push(claude::StreamEvent::ContentBlockDelta {
                index: 0,
                delta: claude::BlockDelta::TextDelta { text },
            });
        }

        for call in choice.delta.tool_calls.into_iter().flatten() {
            match call {
                canonical::ToolCallDelta::Start { index, id, name } => {
                    events.push(claude::StreamEvent::ContentBlockStart {
                        index: index as u32,
                        content_block: claude::StreamContentBlock::ToolUse { id, name },
                    });
                }
                canonical::ToolCallDelta::Args { index, arguments } => {
                    events.push(claude::StreamEvent::ContentBlockDelta {
                        index: index as u32,
                        delta: claude::BlockDelta::InputJsonDelta {
                            partial_json: arguments,
                        },
                    });
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            events.push(claude::StreamEvent::MessageDelta {
                delta: claude::MessageDeltaData {
                    stop_reason: Some(claude::StopReason::from(reason)),
                    stop_sequence: None,
                },
                usage: chunk
                    .usage
                    .map(|usage| claude::TokenUsage {
                        input_tokens: usage.prompt_tokens,
                        output_tokens: usage.completion_tokens,
                    })
                    .unwrap_or_default(),
            });
        }
    }

    events
}
