//! OpenAI HTTP provider.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, header::AUTHORIZATION};
use secrecy::ExposeSecret;

use crate::{
    error::{LlmError, LlmResult},
    http_client::http_client,
    messages::{
        canonical::{CanonicalChunk, CanonicalRequest, CanonicalResponse},
        openai::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse},
    },
    provider::{ChatStream, Provider},
    routing::ModelFamily,
};

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";

pub(crate) struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: secrecy::SecretString,
}

impl OpenAiProvider {
    pub fn new(config: &config::OpenAiConfig) -> Self {
        Self {
            client: http_client(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_API_URL.to_string()),
            api_key: config.api_key.clone(),
        }
    }

    /// Builds the provider wire body. The gateway extensions were consumed
    /// by the orchestrator before the request got here; `stream` is pinned
    /// by the invocation mode.
    fn wire_request(&self, request: CanonicalRequest, stream: bool) -> ChatCompletionRequest {
        let mut wire = ChatCompletionRequest::from(request);
        wire.stream = Some(stream);
        wire.file_ids = None;
        wire.knowledge_base_id = None;
        wire.auto_kb = None;
        wire.retrieval_config = None;
        wire.citation_format = None;
        wire
    }

    async fn post(&self, body: &ChatCompletionRequest) -> LlmResult<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key.expose_secret()))
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Connection(format!("Failed to reach OpenAI: {e}")))?;

        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        log::debug!("OpenAI API error ({status}): {error_text}");

        Err(match status.as_u16() {
            401 => LlmError::Authentication(error_text),
            403 => LlmError::Authorization(error_text),
            404 => LlmError::UnsupportedModel(error_text),
            429 => LlmError::RateLimited(error_text),
            400 | 422 => LlmError::Validation(error_text),
            503 => LlmError::ServiceUnavailable(error_text),
            status => LlmError::Upstream {
                status,
                message: error_text,
            },
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn invoke(&self, request: CanonicalRequest, _: ModelFamily) -> LlmResult<CanonicalResponse> {
        log::debug!("OpenAI completion for model: {}", request.model);

        let body = self.wire_request(request, false);
        let response = self.post(&body).await?;

        let response_text = response.text().await.map_err(|e| {
            log::error!("Failed to read OpenAI response body: {e}");
            LlmError::Internal(None)
        })?;

        let parsed: ChatCompletionResponse = serde_json::from_str(&response_text).map_err(|e| {
            log::error!("Failed to parse OpenAI chat completion response: {e}");
            LlmError::Internal(None)
        })?;

        Ok(CanonicalResponse::from(parsed))
    }

    async fn stream(&self, request: CanonicalRequest, _: ModelFamily) -> LlmResult<ChatStream> {
        log::debug!("OpenAI streaming for model: {}", request.model);

        let body = self.wire_request(request, true);
        let response = self.post(&body).await?;

        let events = response.bytes_stream().eventsource();

        let chunks = events.filter_map(|event| async move {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("SSE parsing error in OpenAI stream: {e}");
                    return None;
                }
            };

            if event.data == "[DONE]" {
                return None;
            }

            match serde_json::from_str::<ChatCompletionChunk>(&event.data) {
                Ok(chunk) => Some(Ok(CanonicalChunk::from(chunk))),
                Err(e) => {
                    log::warn!("Failed to parse OpenAI streaming chunk: {e}");
                    None
                }
            }
        });

        Ok(Box::pin(chunks))
    }

    fn name(&self) -> &str {
        "openai"
    }
}
