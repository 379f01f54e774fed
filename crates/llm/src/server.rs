//! The request orchestrator.
//!
//! One request runs detect → convert-in → inject file context → (optional
//! KB) → route → invoke → convert-out. This module owns everything between
//! conversion and invocation; the HTTP handlers in `lib.rs` own the
//! dialect ends.

use std::sync::Arc;

use futures::StreamExt;

use crate::{
    error::{LlmError, LlmResult},
    kb::{self, KbEngine},
    messages::canonical::{CanonicalChunk, CanonicalRequest, CanonicalResponse, MessageDelta, Role},
    provider::{ChatStream, Provider, bedrock::BedrockProvider, openai::OpenAiProvider},
    retry::RetryPolicy,
    routing::{ProviderKind, Route, RouteTable},
};

/// Composition root for the chat pipeline. Cheap to clone, shared across
/// handlers.
#[derive(Clone)]
pub struct GatewayServer {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    openai: Option<Arc<OpenAiProvider>>,
    bedrock: Option<Arc<BedrockProvider>>,
    routes: RouteTable,
    retry: RetryPolicy,
    timeouts: config::TimeoutConfig,
    files: Option<Arc<files::FileStore>>,
    kb: Option<KbEngine>,
}

impl GatewayServer {
    /// Wires providers from configuration. Initialization order is
    /// credentials → clients → route table → orchestrator; handlers attach
    /// on top of the finished server.
    pub async fn new(
        config: &config::Config,
        files: Option<Arc<files::FileStore>>,
        kb: Option<KbEngine>,
    ) -> LlmResult<Self> {
        let openai = config.llm.openai.as_ref().map(OpenAiProvider::new).map(Arc::new);

        let bedrock = match &config.llm.bedrock {
            Some(bedrock_config) => Some(Arc::new(
                BedrockProvider::new(bedrock_config, config.llm.default_max_tokens.clone()).await?,
            )),
            None => None,
        };

        if openai.is_none() && bedrock.is_none() {
            return Err(LlmError::Internal(Some(
                "No upstream providers configured".to_string(),
            )));
        }

        Ok(Self {
            inner: Arc::new(GatewayInner {
                openai,
                bedrock,
                routes: RouteTable::new(),
                retry: RetryPolicy::new(&config.llm.retry),
                timeouts: config.llm.timeouts.clone(),
                files,
                kb,
            }),
        })
    }

    /// Which upstreams are live, for health and model discovery.
    pub fn provider_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();

        if self.inner.openai.is_some() {
            names.push("openai");
        }

        if self.inner.bedrock.is_some() {
            names.push("bedrock");
        }

        names
    }

    /// The KB engine, when the subsystem is enabled.
    pub fn kb(&self) -> Option<&KbEngine> {
        self.inner.kb.as_ref()
    }

    /// Non-streaming pipeline.
    pub async fn completion(&self, mut request: CanonicalRequest) -> LlmResult<CanonicalResponse> {
        self.validate(&request)?;

        if let Some(response) = self.prepare(&mut request).await? {
            // Direct RAG answered without touching a provider.
            return Ok(response);
        }

        let route = self.inner.routes.route(&request.model)?;
        let provider = self.provider_for(route)?;
        let original_model = request.model.clone();

        log::debug!("Routed '{original_model}' to provider '{}'", provider.name());

        let response = self
            .inner
            .retry
            .run("chat completion", || {
                let request = request.clone();
                let provider = provider.clone();
                Box::pin(async move {
                    tokio::time::timeout(self.inner.timeouts.provider_call, provider.invoke(request, route.family))
                        .await
                        .map_err(|_| LlmError::Timeout("provider call"))?
                })
            })
            .await?;

        let mut response = response;
        response.model = original_model;

        Ok(response)
    }

    /// Streaming pipeline. The retry policy wraps stream establishment
    /// only; once chunks flow, failures surface in-band.
    pub async fn completion_stream(&self, mut request: CanonicalRequest) -> LlmResult<ChatStream> {
        self.validate(&request)?;

        if let Some(response) = self.prepare(&mut request).await? {
            return Ok(Box::pin(futures::stream::iter(
                response_as_chunks(response).into_iter().map(Ok),
            )));
        }

        let route = self.inner.routes.route(&request.model)?;
        let provider = self.provider_for(route)?;
        let original_model = request.model.clone();

        log::debug!("Routed '{original_model}' to provider '{}'", provider.name());

        let stream = self
            .inner
            .retry
            .run("chat completion stream", || {
                let request = request.clone();
                let provider = provider.clone();
                Box::pin(async move {
                    tokio::time::timeout(self.inner.timeouts.provider_call, provider.stream(request, route.family))
                        .await
                        .map_err(|_| LlmError::Timeout("provider call"))?
                })
            })
            .await?;

        // Restore the caller's model id on every chunk.
        let restored = stream.map(move |result| {
            result.map(|mut chunk| {
                chunk.model = original_model.clone();
                chunk
            })
        });

        Ok(Box::pin(restored))
    }

    fn validate(&self, request: &CanonicalRequest) -> LlmResult<()> {
        if request.model.is_empty() {
            return Err(LlmError::Validation(
                "A model identifier is required to route the request".to_string(),
            ));
        }

        if request.messages.is_empty() {
            return Err(LlmError::Validation("The messages list must not be empty".to_string()));
        }

        Ok(())
    }

    /// File injection and the KB step, in that order.
    async fn prepare(&self, request: &mut CanonicalRequest) -> LlmResult<Option<CanonicalResponse>> {
        if let Some(ids) = request.file_ids.take()
            && !ids.is_empty()
        {
            let Some(files) = &self.inner.files else {
                return Err(LlmError::Validation(
                    "file_ids were supplied but the files subsystem is not configured".to_string(),
                ));
            };

            let preamble = tokio::time::timeout(self.inner.timeouts.file_fetch, files.chat_context(&ids))
                .await
                .map_err(|_| LlmError::Timeout("file fetch"))??;

            kb::inject_preamble(request, &preamble);
        }

        if let Some(engine) = &self.inner.kb {
            return engine.apply(request).await;
        }

        Ok(None)
    }

    fn provider_for(&self, route: Route) -> LlmResult<Arc<dyn Provider>> {
        match route.provider {
            ProviderKind::OpenAi => self
                .inner
                .openai
                .clone()
                .map(|provider| provider as Arc<dyn Provider>)
                .ok_or_else(|| LlmError::UnsupportedModel("No OpenAI upstream is configured".to_string())),
            ProviderKind::Bedrock => self
                .inner
                .bedrock
                .clone()
                .map(|provider| provider as Arc<dyn Provider>)
                .ok_or_else(|| LlmError::UnsupportedModel("No Bedrock upstream is configured".to_string())),
        }
    }
}

/// Replays a complete response as a minimal chunk sequence: role, text,
/// terminal. Used when direct RAG answers a streaming request.
fn response_as_chunks(response: CanonicalResponse) -> Vec<CanonicalChunk> {
    let mut chunks = Vec::with_capacity(3);

    let Some(choice) = response.choices.into_iter().next() else {
        return chunks;
    };

    chunks.push(CanonicalChunk::single(
        response.id.clone(),
        response.created,
        response.model.clone(),
        MessageDelta::role(Role::Assistant),
    ));

    let text = choice.message.content.as_text();
    if !text.is_empty() {
        chunks.push(CanonicalChunk::single(
            response.id.clone(),
            response.created,
            response.model.clone(),
            MessageDelta::text(text),
        ));
    }

    chunks.push(CanonicalChunk::finish(
        response.id,
        response.created,
        response.model,
        choice.finish_reason,
        response.usage,
    ));

    chunks
}
