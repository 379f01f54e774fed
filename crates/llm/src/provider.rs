//! Provider clients.
//!
//! A provider is a thin transport: it moves a canonical request to an
//! upstream and canonical responses (or chunk streams) back. All
//! family-specific shaping lives in the strategy modules; the orchestrator
//! picks the family through the route table and hands it in.

pub(crate) mod bedrock;
pub(crate) mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{
    error::LlmResult,
    messages::canonical::{CanonicalChunk, CanonicalRequest, CanonicalResponse},
    routing::ModelFamily,
};

/// A finite, non-restartable stream of canonical chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = LlmResult<CanonicalChunk>> + Send>>;

/// Uniform interface the orchestrator drives.
#[async_trait]
pub trait Provider: Send + Sync {
    /// One-shot completion.
    async fn invoke(&self, request: CanonicalRequest, family: ModelFamily) -> LlmResult<CanonicalResponse>;

    /// Streaming completion. Errors returned here are stream-establishment
    /// failures and may be retried; errors inside the stream are not.
    async fn stream(&self, request: CanonicalRequest, family: ModelFamily) -> LlmResult<ChatStream>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Current unix timestamp, for providers whose wire formats carry none.
pub(crate) fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
