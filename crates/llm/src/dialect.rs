//! Inbound payload classification.
//!
//! Classifies a decoded JSON document into one of the recognized request
//! dialects by probing a handful of top-level keys. Runs before any schema
//! validation: a request can detect as OpenAI and still fail typed
//! deserialization with a validation error afterwards.

use serde_json::Value;

/// The recognized request dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// OpenAI chat completions.
    OpenAi,
    /// Bedrock Anthropic (Claude) messages.
    BedrockClaude,
    /// Bedrock Amazon Titan text generation.
    BedrockTitan,
    /// Nothing matched; the caller surfaces a validation error.
    Unknown,
}

/// Classifies a payload.
///
/// Rules in priority order, first match wins:
///
/// 1. `anthropic_version` present → Claude. Wins over rule 2 when both
///    keys appear, which valid inputs never produce.
/// 2. `inputText` present → Titan.
/// 3. `model` present and `messages` is an array → OpenAI.
/// 4. Otherwise unknown.
///
/// O(1) key probes; insertion order of keys cannot affect the result.
pub fn detect(payload: &Value) -> Dialect {
    let Some(object) = payload.as_object() else {
        return Dialect::Unknown;
    };

    if object.contains_key("anthropic_version") {
        return Dialect::BedrockClaude;
    }

    if object.contains_key("inputText") {
        return Dialect::BedrockTitan;
    }

    if object.contains_key("model") && object.get("messages").is_some_and(Value::is_array) {
        return Dialect::OpenAi;
    }

    Dialect::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn openai_requires_model_and_messages_array() {
        let payload = json!({"model": "gpt-4o-mini", "messages": [{"role": "user", "content": "Hello!"}]});
        assert_eq!(detect(&payload), Dialect::OpenAi);

        let not_an_array = json!({"model": "gpt-4o-mini", "messages": "Hello!"});
        assert_eq!(detect(&not_an_array), Dialect::Unknown);

        let missing_model = json!({"messages": []});
        assert_eq!(detect(&missing_model), Dialect::Unknown);
    }

    #[test]
    fn anthropic_version_detects_claude() {
        let payload = json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": 1000,
            "messages": [{"role": "user", "content": "Hello!"}]
        });

        assert_eq!(detect(&payload), Dialect::BedrockClaude);
    }

    #[test]
    fn input_text_detects_titan() {
        let payload = json!({"inputText": "User: hi\nBot:"});
        assert_eq!(detect(&payload), Dialect::BedrockTitan);
    }

    #[test]
    fn claude_wins_when_markers_collide() {
        // Keys 1 and 2 never co-occur in valid input; the tie-break is
        // still deterministic.
        let payload = json!({"anthropic_version": "bedrock-2023-05-31", "inputText": "hi"});
        assert_eq!(detect(&payload), Dialect::BedrockClaude);
    }

    #[test]
    fn detection_is_stable_under_key_order() {
        let a: Value =
            serde_json::from_str(r#"{"model": "gpt-4o-mini", "messages": [], "temperature": 0.1}"#).expect("json");
        let b: Value =
            serde_json::from_str(r#"{"temperature": 0.1, "messages": [], "model": "gpt-4o-mini"}"#).expect("json");

        assert_eq!(detect(&a), detect(&b));
        assert_eq!(detect(&a), Dialect::OpenAi);
    }

    #[test]
    fn non_objects_are_unknown() {
        assert_eq!(detect(&json!([1, 2, 3])), Dialect::Unknown);
        assert_eq!(detect(&json!("payload")), Dialect::Unknown);
        assert_eq!(detect(&json!({})), Dialect::Unknown);
    }
}
