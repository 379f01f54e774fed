//! The chat-completions gateway core.
//!
//! Accepts requests in any recognized dialect (OpenAI chat, Bedrock
//! Claude, Bedrock Titan), converts them to a canonical form, routes on
//! the model identifier, invokes OpenAI or AWS Bedrock, and answers in the
//! dialect the caller selected with `target_format` — streaming or not.

use std::{convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::{get, post},
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;

mod dialect;
mod error;
mod http_client;
pub mod kb;
pub mod messages;
mod provider;
mod retry;
mod routing;
mod server;

pub use error::{LlmError, LlmResult as Result};
pub use provider::ChatStream;
pub use server::GatewayServer;

use dialect::Dialect;
use messages::{
    canonical::{CanonicalChunk, CanonicalRequest, CanonicalResponse},
    canonical::to_claude::stream_events_from_chunk,
    claude, openai, titan,
};

/// Builds the gateway server from configuration.
pub async fn build_server(
    config: &config::Config,
    files: Option<Arc<files::FileStore>>,
) -> anyhow::Result<GatewayServer> {
    let kb = if config.kb.enabled {
        let region = config
            .kb
            .region
            .clone()
            .or_else(|| config.llm.bedrock.as_ref().map(|bedrock| bedrock.region.clone()))
            .ok_or_else(|| anyhow::anyhow!("[kb] is enabled but no region is available"))?;

        let retriever = Arc::new(kb::BedrockRetriever::new(&region).await);
        Some(kb::KbEngine::new(config.kb.clone(), retriever))
    } else {
        None
    };

    GatewayServer::new(config, files, kb)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize gateway server: {e}"))
}

/// Axum router for the chat endpoints.
pub fn router(server: GatewayServer) -> Router {
    let mut router = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/chat/completions/health", get(chat_health))
        .route("/v1/models", get(list_models));

    if server.kb().is_some() {
        router = router
            .route("/v1/knowledge-bases", get(list_knowledge_bases))
            .route(
                "/v1/knowledge-bases/{id}",
                get(get_knowledge_base).delete(delete_knowledge_base),
            )
            .route("/v1/knowledge-bases/{id}/query", post(query_knowledge_base))
            .route(
                "/v1/knowledge-bases/{id}/retrieve-and-generate",
                post(knowledge_base_rag),
            );
    }

    router.with_state(server)
}

/// Response dialect the caller selects with `?target_format=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetFormat {
    OpenAi,
    BedrockClaude,
    BedrockTitan,
}

impl TargetFormat {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "openai" => Ok(Self::OpenAi),
            "bedrock_claude" => Ok(Self::BedrockClaude),
            "bedrock_titan" => Ok(Self::BedrockTitan),
            other => Err(LlmError::Validation(format!(
                "Unknown target_format '{other}': expected openai, bedrock_claude, or bedrock_titan"
            ))),
        }
    }

    /// Without an explicit `target_format` the response dialect matches
    /// the request dialect, so callers speaking Claude or Titan get their
    /// own shapes back.
    fn default_for(dialect: Dialect) -> Self {
        match dialect {
            Dialect::BedrockClaude => Self::BedrockClaude,
            Dialect::BedrockTitan => Self::BedrockTitan,
            Dialect::OpenAi | Dialect::Unknown => Self::OpenAi,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatParams {
    target_format: Option<String>,
}

/// Handle chat completion requests in any recognized dialect.
///
/// `stream: true` selects a `text/event-stream` response terminated by
/// `data: [DONE]`; otherwise a single JSON document in the target dialect
/// is returned.
async fn chat_completions(
    State(server): State<GatewayServer>,
    Query(params): Query<ChatParams>,
    Json(payload): Json<Value>,
) -> Result<Response> {
    let detected = dialect::detect(&payload);

    // Target-format validation happens before any provider work.
    let target = match params.target_format.as_deref() {
        Some(raw) => TargetFormat::parse(raw)?,
        None => TargetFormat::default_for(detected),
    };

    let request = canonicalize(detected, payload)?;

    log::debug!(
        "Chat completion for model '{}' with {} messages (stream: {})",
        request.model,
        request.messages.len(),
        request.stream.unwrap_or(false)
    );

    if request.stream.unwrap_or(false) {
        let stream = server.completion_stream(request).await?;
        Ok(sse_response(stream, target))
    } else {
        let response = server.completion(request).await?;
        Ok(egress_response(response, target))
    }
}

/// Converts a detected payload to canonical form.
fn canonicalize(dialect: Dialect, payload: Value) -> Result<CanonicalRequest> {
    match dialect {
        Dialect::OpenAi => {
            let request: openai::ChatCompletionRequest = serde_json::from_value(payload)
                .map_err(|e| LlmError::Validation(format!("Malformed OpenAI request: {e}")))?;

            Ok(CanonicalRequest::from(request))
        }
        Dialect::BedrockClaude => {
            let request: claude::ChatRequest = serde_json::from_value(payload)
                .map_err(|e| LlmError::Validation(format!("Malformed Bedrock Claude request: {e}")))?;

            Ok(CanonicalRequest::from(request))
        }
        Dialect::BedrockTitan => {
            let request: titan::GenerateRequest = serde_json::from_value(payload)
                .map_err(|e| LlmError::Validation(format!("Malformed Bedrock Titan request: {e}")))?;

            Ok(CanonicalRequest::from(request))
        }
        Dialect::Unknown => Err(LlmError::Validation(
            "Unrecognized request dialect: expected OpenAI chat, Bedrock Claude, or Bedrock Titan".to_string(),
        )),
    }
}

/// Renders a complete response in the target dialect.
fn egress_response(response: CanonicalResponse, target: TargetFormat) -> Response {
    match target {
        TargetFormat::OpenAi => Json(openai::ChatCompletionResponse::from(response)).into_response(),
        TargetFormat::BedrockClaude => Json(claude::ChatResponse::from(response)).into_response(),
        TargetFormat::BedrockTitan => Json(titan::GenerateResponse::from(response)).into_response(),
    }
}

/// Renders one canonical chunk as zero or more SSE data payloads in the
/// target dialect.
fn egress_frames(chunk: CanonicalChunk, target: TargetFormat) -> Vec<String> {
    match target {
        TargetFormat::OpenAi => serde_json::to_string(&openai::ChatCompletionChunk::from(chunk))
            .map(|json| vec![json])
            .unwrap_or_default(),
        TargetFormat::BedrockClaude => stream_events_from_chunk(chunk)
            .into_iter()
            .filter_map(|event| serde_json::to_string(&event).ok())
            .collect(),
        TargetFormat::BedrockTitan => {
            let frame = titan::StreamChunk::from(chunk);

            // Titan frames carry text or a completion reason; role-only
            // chunks have no rendering in this dialect.
            if frame.output_text.is_empty() && frame.completion_reason.is_none() {
                return Vec::new();
            }

            serde_json::to_string(&frame).map(|json| vec![json]).unwrap_or_default()
        }
    }
}

/// Logs when a streaming response is dropped before completion, which is
/// how a client disconnect manifests: the response future and the provider
/// stream inside it are dropped together, closing the upstream connection.
struct DisconnectGuard {
    finished: bool,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!("{}", LlmError::Cancelled);
        }
    }
}

/// Wraps a canonical chunk stream as a `text/event-stream` response.
///
/// Mid-stream errors are delivered as a final data frame with an `error`
/// field; every stream ends with `data: [DONE]` and a clean close.
fn sse_response(stream: ChatStream, target: TargetFormat) -> Response {
    let events = stream
        .map(move |result| match result {
            Ok(chunk) => egress_frames(chunk, target),
            Err(e) => {
                log::debug!("Stream error: {e}");
                let frame = serde_json::json!({
                    "error": {
                        "type": e.error_type(),
                        "message": e.client_message(),
                    }
                });

                vec![frame.to_string()]
            }
        })
        .flat_map(futures::stream::iter)
        .map(|data| Ok::<_, Infallible>(Event::default().data(data)));

    let mut guard = DisconnectGuard { finished: false };

    let terminated = events.chain(futures::stream::once(async move {
        guard.finished = true;
        Ok::<_, Infallible>(Event::default().data("[DONE]"))
    }));

    Sse::new(terminated).into_response()
}

/// Liveness of the unified chat endpoint.
async fn chat_health(State(server): State<GatewayServer>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "providers": server.provider_names(),
    }))
}

/// Model discovery from the routing table's registered families.
async fn list_models(State(server): State<GatewayServer>) -> Json<openai::ModelsResponse> {
    let mut data = Vec::new();

    let catalog: &[(&str, &str, &[&str])] = &[
        (
            "openai",
            "openai",
            &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"],
        ),
        (
            "bedrock",
            "anthropic",
            &[
                "anthropic.claude-3-opus-20240229-v1:0",
                "anthropic.claude-3-sonnet-20240229-v1:0",
                "anthropic.claude-3-haiku-20240307-v1:0",
                "anthropic.claude-3-5-sonnet-20240620-v1:0",
            ],
        ),
        (
            "bedrock",
            "amazon",
            &[
                "amazon.titan-text-premier-v1:0",
                "amazon.titan-text-express-v1",
                "amazon.titan-text-lite-v1",
            ],
        ),
    ];

    let providers = server.provider_names();

    for (provider, owner, models) in catalog {
        if !providers.contains(provider) {
            continue;
        }

        data.extend(models.iter().map(|model| openai::Model {
            id: (*model).to_string(),
            object: openai::ObjectType::Model,
            created: 0,
            owned_by: (*owner).to_string(),
        }));
    }

    Json(openai::ModelsResponse {
        object: openai::ObjectType::List,
        data,
    })
}

fn kb_engine(server: &GatewayServer) -> Result<&kb::KbEngine> {
    server
        .kb()
        .ok_or_else(|| LlmError::Validation("The knowledge-base subsystem is not enabled".to_string()))
}

async fn list_knowledge_bases(State(server): State<GatewayServer>) -> Result<Json<Value>> {
    let engine = kb_engine(&server)?;
    let bases = engine.retriever().list().await?;

    Ok(Json(serde_json::json!({"object": "list", "data": bases})))
}

async fn get_knowledge_base(State(server): State<GatewayServer>, Path(id): Path<String>) -> Result<Json<Value>> {
    let engine = kb_engine(&server)?;
    let base = engine.retriever().describe(&id).await?;

    Ok(Json(serde_json::to_value(base).unwrap_or_default()))
}

async fn delete_knowledge_base(State(server): State<GatewayServer>, Path(id): Path<String>) -> Result<Json<Value>> {
    let engine = kb_engine(&server)?;
    engine.retriever().delete(&id).await?;

    Ok(Json(serde_json::json!({"id": id, "deleted": true})))
}

#[derive(Debug, Deserialize)]
struct KbQueryRequest {
    query: String,
    top_k: Option<usize>,
}

async fn query_knowledge_base(
    State(server): State<GatewayServer>,
    Path(id): Path<String>,
    Json(body): Json<KbQueryRequest>,
) -> Result<Json<Value>> {
    let engine = kb_engine(&server)?;
    let top_k = body.top_k.unwrap_or(5);

    let passages = engine.retriever().retrieve(&id, &body.query, top_k).await?;

    let results: Vec<Value> = passages
        .into_iter()
        .map(|passage| {
            serde_json::json!({
                "content": passage.content,
                "source": passage.source,
                "score": passage.score,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({"results": results})))
}

#[derive(Debug, Deserialize)]
struct KbRagRequest {
    query: String,
    model_arn: Option<String>,
}

async fn knowledge_base_rag(
    State(server): State<GatewayServer>,
    Path(id): Path<String>,
    Json(body): Json<KbRagRequest>,
) -> Result<Json<Value>> {
    let engine = kb_engine(&server)?;

    let answer = engine
        .retriever()
        .retrieve_and_generate(&id, &body.query, body.model_arn.as_deref())
        .await?;

    Ok(Json(serde_json::json!({
        "output": {"text": answer.text},
        "citations": answer.citations,
    })))
}
