//! Bedrock Claude protocol types → canonical types.

use crate::messages::{canonical, claude};

impl From<claude::ChatRequest> for canonical::CanonicalRequest {
    fn from(req: claude::ChatRequest) -> Self {
        let mut messages = Vec::with_capacity(req.messages.len());

        for msg in req.messages {
            convert_input_message(msg, &mut messages);
        }

        Self {
            // The body-level model is a gateway extension; an empty id is
            // rejected by validation before routing.
            model: req.model.unwrap_or_default(),
            messages,
            system: req.system,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            stop_sequences: req.stop_sequences,
            stream: req.stream,
            tools: req.tools.map(|tools| {
                tools
                    .into_iter()
                    .map(|tool| canonical::ToolDef {
                        name: tool.name,
                        description: tool.description,
                        parameters: tool.input_schema,
                    })
                    .collect()
            }),
            tool_choice: req.tool_choice.map(canonical::ToolChoice::from),
            file_ids: None,
            knowledge_base_id: None,
            auto_kb: None,
            retrieval_config: None,
            citation_format: None,
        }
    }
}

/// One Claude input message can fan out into several canonical ones:
/// tool_result blocks ride in user messages on the Claude wire but are
/// their own tool-role turns canonically.
fn convert_input_message(msg: claude::InputMessage, out: &mut Vec<canonical::CanonicalMessage>) {
    let role = match msg.role {
        claude::InputRole::User => canonical::Role::User,
        claude::InputRole::Assistant => canonical::Role::Assistant,
    };

    let blocks = match msg.content {
        claude::InputContent::Text(text) => {
            out.push(canonical::CanonicalMessage::text(role, text));
            return;
        }
        claude::InputContent::Blocks(blocks) => blocks,
    };

    let mut content = Vec::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            claude::ContentBlock::Text { text } => content.push(canonical::ContentBlock::Text { text }),
            claude::ContentBlock::Image { source } => content.push(match source {
                claude::ImageSource::Base64 { media_type, data } => canonical::ContentBlock::Image {
                    media_type,
                    data: Some(data),
                    url: None,
                },
                claude::ImageSource::Url { url } => canonical::ContentBlock::Image {
                    media_type: "image/jpeg".to_string(),
                    data: None,
                    url: Some(url),
                },
            }),
            claude::ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(canonical::ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                });
            }
            claude::ContentBlock::ToolResult { tool_use_id, content } => {
                out.push(canonical::CanonicalMessage {
                    role: canonical::Role::Tool,
                    content: canonical::MessageContent::Text(content),
                    name: None,
                    tool_call_id: Some(tool_use_id),
                    tool_calls: None,
                });
            }
        }
    }

    if content.is_empty() && tool_calls.is_empty() {
        return;
    }

    // A single text block collapses to scalar content, matching what the
    // other dialects produce for plain conversations.
    let is_single_text = content.len() == 1 && matches!(content[0], canonical::ContentBlock::Text { .. });

    let content = if is_single_text {
        match content.pop() {
            Some(canonical::ContentBlock::Text { text }) => canonical::MessageContent::Text(text),
            _ => unreachable!("single text block checked above"),
        }
    } else {
        canonical::MessageContent::Blocks(content)
    };

    out.push(canonical::CanonicalMessage {
        role,
        content,
        name: None,
        tool_call_id: None,
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
    });
}

impl From<claude::ToolChoice> for canonical::ToolChoice {
    fn from(choice: claude::ToolChoice) -> Self {
        match choice {
            claude::ToolChoice::Auto => canonical::ToolChoice::Auto,
            claude::ToolChoice::Any => canonical::ToolChoice::Required,
            claude::ToolChoice::None => canonical::ToolChoice::None,
            claude::ToolChoice::Tool { name } => canonical::ToolChoice::Named { name },
        }
    }
}

impl From<claude::StopReason> for canonical::FinishReason {
    fn from(reason: claude::StopReason) -> Self {
        match reason {
            claude::StopReason::EndTurn | claude::StopReason::StopSequence => canonical::FinishReason::Stop,
            claude::StopReason::MaxTokens => canonical::FinishReason::Length,
            claude::StopReason::ToolUse => canonical::FinishReason::ToolCalls,
            claude::StopReason::ContentFiltered => canonical::FinishReason::ContentFilter,
            claude::StopReason::Other(_) => canonical::FinishReason::Error,
        }
    }
}

impl From<claude::TokenUsage> for canonical::Usage {
    fn from(usage: claude::TokenUsage) -> Self {
        canonical::Usage::new(usage.input_tokens, usage.output_tokens)
    }
}

impl From<claude::ChatResponse> for canonical::CanonicalResponse {
    fn from(resp: claude::ChatResponse) -> Self {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                claude::ResponseContent::Text { text: fragment } => text.push_str(&fragment),
                claude::ResponseContent::ToolUse { id, name, input } => tool_calls.push(canonical::ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
            }
        }

        let message = canonical::CanonicalMessage {
            role: canonical::Role::Assistant,
            content: canonical::MessageContent::Text(text),
            name: None,
            tool_call_id: None,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        };

        Self {
            id: resp.id,
            // Claude carries no timestamp; the provider stamps it.
            created: 0,
            model: resp.model.unwrap_or_default(),
            choices: vec![canonical::Choice {
                index: 0,
                message,
                finish_reason: resp
                    .stop_reason
                    .map(canonical::FinishReason::from)
                    .unwrap_or(canonical::FinishReason::Stop),
            }],
            usage: Some(canonical::Usage::from(resp.usage)),
        }
    }
}
