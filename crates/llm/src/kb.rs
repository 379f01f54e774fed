//! Knowledge-base retrieval.
//!
//! Two ways into a knowledge base: delegate the whole query to the
//! provider's retrieve-and-generate API (direct RAG), or retrieve top-k
//! passages and inject them as context before normal routing. An intent
//! score over the latest user query picks between them; an explicit
//! `knowledge_base_id` always means direct RAG.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    error::{LlmError, LlmResult},
    messages::canonical::{
        CanonicalMessage, CanonicalRequest, CanonicalResponse, Choice, CitationFormat, FinishReason, MessageContent,
        Role,
    },
    provider::now_unix,
};

/// Routing decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KbRoute {
    /// Delegate retrieve-and-generate to the provider.
    DirectRag,
    /// Retrieve passages, inject them as context, route normally.
    ContextAugmentation,
    /// Leave the request alone.
    Skip,
}

/// One retrieved passage.
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    pub content: String,
    pub source: Option<String>,
    pub score: Option<f32>,
}

/// A provider-side RAG answer.
#[derive(Debug, Clone)]
pub struct KbAnswer {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// One citation attached to a RAG answer.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub source: String,
}

/// Knowledge-base listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBaseSummary {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
}

/// The provider seam for knowledge-base operations.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn list(&self) -> LlmResult<Vec<KnowledgeBaseSummary>>;

    async fn describe(&self, kb_id: &str) -> LlmResult<KnowledgeBaseSummary>;

    async fn delete(&self, kb_id: &str) -> LlmResult<()>;

    async fn retrieve(&self, kb_id: &str, query: &str, top_k: usize) -> LlmResult<Vec<RetrievedPassage>>;

    async fn retrieve_and_generate(&self, kb_id: &str, query: &str, model_arn: Option<&str>) -> LlmResult<KbAnswer>;
}

/// Heuristic intent score in `[0, 1]`.
///
/// Keyword and pattern weights are tunable folklore, not a contract; the
/// thresholds that interpret the score live in configuration.
pub fn score_intent(query: &str) -> f32 {
    const STRONG: &[&str] = &[
        "knowledge base",
        "according to the docs",
        "according to our docs",
        "in the documentation",
        "company policy",
        "internal docs",
    ];

    const WEAK: &[&str] = &[
        "docs",
        "documentation",
        "policy",
        "guideline",
        "manual",
        "handbook",
        "wiki",
        "spec",
        "reference",
    ];

    let lowered = query.to_lowercase();
    let mut score = 0.0f32;

    for marker in STRONG {
        if lowered.contains(marker) {
            score += 0.5;
        }
    }

    for marker in WEAK {
        if lowered.contains(marker) {
            score += 0.2;
        }
    }

    // Interrogatives lean toward lookup intent.
    if lowered.starts_with("what") || lowered.starts_with("how") || lowered.starts_with("where") {
        score += 0.1;
    }

    if lowered.contains('?') {
        score += 0.1;
    }

    score.min(1.0)
}

/// Applies the configured thresholds to a score.
pub fn decide(score: f32, config: &config::KbConfig) -> KbRoute {
    if score >= config.direct_rag_threshold {
        KbRoute::DirectRag
    } else if score >= config.augment_threshold {
        KbRoute::ContextAugmentation
    } else {
        KbRoute::Skip
    }
}

/// Renders citations into the answer text.
pub fn render_citations(text: &str, citations: &[Citation], format: CitationFormat) -> String {
    if citations.is_empty() || format == CitationFormat::None {
        return text.to_string();
    }

    let mut rendered = String::from(text);
    rendered.push_str("\n\nSources:\n");

    for (i, citation) in citations.iter().enumerate() {
        match format {
            CitationFormat::Markdown => {
                rendered.push_str(&format!("- [{source}]({source})\n", source = citation.source));
            }
            CitationFormat::Numbered => {
                rendered.push_str(&format!("[{}] {}\n", i + 1, citation.source));
            }
            CitationFormat::None => unreachable!("handled above"),
        }
    }

    rendered.truncate(rendered.trim_end().len());
    rendered
}

const KB_HEADER: &str = "=== KNOWLEDGE BASE CONTEXT ===";
const KB_FOOTER: &str = "========================";

/// Frames retrieved passages as a context preamble, mirroring the uploaded
/// files framing.
pub fn build_context_preamble(passages: &[RetrievedPassage]) -> String {
    let mut preamble = String::from(KB_HEADER);
    preamble.push('\n');

    for passage in passages {
        preamble.push_str(&passage.content);
        preamble.push('\n');

        if let Some(source) = &passage.source {
            preamble.push_str(&format!("Source: {source}\n"));
        }

        preamble.push('\n');
    }

    preamble.push_str(KB_FOOTER);
    preamble
}

/// The knowledge-base engine wired into the orchestrator.
pub struct KbEngine {
    config: config::KbConfig,
    retriever: Arc<dyn KnowledgeRetriever>,
}

impl KbEngine {
    pub fn new(config: config::KbConfig, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        Self { config, retriever }
    }

    pub fn retriever(&self) -> &dyn KnowledgeRetriever {
        self.retriever.as_ref()
    }

    /// Runs the KB step of the pipeline.
    ///
    /// Returns `Some(response)` when direct RAG answered the request
    /// outright; otherwise the request may have been augmented in place
    /// and proceeds to normal routing.
    pub async fn apply(&self, request: &mut CanonicalRequest) -> LlmResult<Option<CanonicalResponse>> {
        let Some(query) = request.latest_user_text().map(str::to_string) else {
            return Ok(None);
        };

        let route = if request.knowledge_base_id.is_some() {
            KbRoute::DirectRag
        } else if request.auto_kb.unwrap_or(false) {
            let score = score_intent(&query);
            let route = decide(score, &self.config);
            log::debug!("KB intent score {score:.2} → {route:?}");
            route
        } else {
            KbRoute::Skip
        };

        match route {
            KbRoute::Skip => Ok(None),
            KbRoute::ContextAugmentation => {
                let top_k = request
                    .retrieval_config
                    .as_ref()
                    .and_then(|config| config.top_k)
                    .unwrap_or(self.config.top_k);

                let kb_id = match &request.knowledge_base_id {
                    Some(id) => id.clone(),
                    // Auto-detection without a configured target cannot
                    // retrieve; fall through to normal routing.
                    None => return Ok(None),
                };

                let passages = self.retriever.retrieve(&kb_id, &query, top_k).await?;

                if passages.is_empty() {
                    return Ok(None);
                }

                inject_preamble(request, &build_context_preamble(&passages));
                Ok(None)
            }
            KbRoute::DirectRag => {
                let Some(kb_id) = request.knowledge_base_id.clone() else {
                    return Ok(None);
                };

                let answer = self
                    .retriever
                    .retrieve_and_generate(&kb_id, &query, self.config.model_arn.as_deref())
                    .await?;

                let format = request.citation_format.unwrap_or(CitationFormat::Markdown);
                let text = render_citations(&answer.text, &answer.citations, format);

                Ok(Some(CanonicalResponse {
                    id: format!("kb-{}", uuid::Uuid::new_v4().simple()),
                    created: now_unix(),
                    model: request.model.clone(),
                    choices: vec![Choice {
                        index: 0,
                        message: CanonicalMessage::text(Role::Assistant, text),
                        finish_reason: FinishReason::Stop,
                    }],
                    usage: None,
                }))
            }
        }
    }
}

/// Prepends a framed preamble to the first user message.
pub(crate) fn inject_preamble(request: &mut CanonicalRequest, preamble: &str) {
    let Some(message) = request
        .messages
        .iter_mut()
        .find(|message| message.role == Role::User)
    else {
        request
            .messages
            .insert(0, CanonicalMessage::text(Role::User, preamble.to_string()));
        return;
    };

    match &mut message.content {
        MessageContent::Text(text) => {
            *text = format!("{preamble}\n{text}");
        }
        MessageContent::Blocks(blocks) => {
            blocks.insert(
                0,
                crate::messages::canonical::ContentBlock::Text {
                    text: format!("{preamble}\n"),
                },
            );
        }
    }
}

/// Bedrock knowledge-base client pair: agent runtime for retrieval, agent
/// control plane for listing and deletion.
pub struct BedrockRetriever {
    runtime: aws_sdk_bedrockagentruntime::Client,
    control: aws_sdk_bedrockagent::Client,
}

impl BedrockRetriever {
    pub async fn new(region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Self {
            runtime: aws_sdk_bedrockagentruntime::Client::new(&sdk_config),
            control: aws_sdk_bedrockagent::Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl KnowledgeRetriever for BedrockRetriever {
    async fn list(&self) -> LlmResult<Vec<KnowledgeBaseSummary>> {
        let output = self
            .control
            .list_knowledge_bases()
            .send()
            .await
            .map_err(|e| LlmError::ServiceUnavailable(format!("ListKnowledgeBases failed: {e}")))?;

        Ok(output
            .knowledge_base_summaries()
            .iter()
            .map(|summary| KnowledgeBaseSummary {
                id: summary.knowledge_base_id().to_string(),
                name: Some(summary.name().to_string()),
                status: Some(summary.status().as_str().to_string()),
            })
            .collect())
    }

    async fn describe(&self, kb_id: &str) -> LlmResult<KnowledgeBaseSummary> {
        let output = self
            .control
            .get_knowledge_base()
            .knowledge_base_id(kb_id)
            .send()
            .await
            .map_err(|e| LlmError::UnsupportedModel(format!("Knowledge base '{kb_id}' not found: {e}")))?;

        let kb = output
            .knowledge_base()
            .ok_or_else(|| LlmError::Internal(Some("GetKnowledgeBase returned no body".to_string())))?;

        Ok(KnowledgeBaseSummary {
            id: kb.knowledge_base_id().to_string(),
            name: Some(kb.name().to_string()),
            status: Some(kb.status().as_str().to_string()),
        })
    }

    async fn delete(&self, kb_id: &str) -> LlmResult<()> {
        self.control
            .delete_knowledge_base()
            .knowledge_base_id(kb_id)
            .send()
            .await
            .map_err(|e| LlmError::ServiceUnavailable(format!("DeleteKnowledgeBase failed: {e}")))?;

        Ok(())
    }

    async fn retrieve(&self, kb_id: &str, query: &str, top_k: usize) -> LlmResult<Vec<RetrievedPassage>> {
        use aws_sdk_bedrockagentruntime::types::{
            KnowledgeBaseQuery, KnowledgeBaseRetrievalConfiguration, KnowledgeBaseVectorSearchConfiguration,
        };

        let retrieval_query = KnowledgeBaseQuery::builder().text(query).build();

        let vector_config = KnowledgeBaseVectorSearchConfiguration::builder()
            .number_of_results(top_k as i32)
            .build();

        let output = self
            .runtime
            .retrieve()
            .knowledge_base_id(kb_id)
            .retrieval_query(retrieval_query)
            .retrieval_configuration(
                KnowledgeBaseRetrievalConfiguration::builder()
                    .vector_search_configuration(vector_config)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| LlmError::ServiceUnavailable(format!("Retrieve failed: {e}")))?;

        Ok(output
            .retrieval_results()
            .iter()
            .map(|result| RetrievedPassage {
                content: result
                    .content()
                    .map(|content| content.text().to_string())
                    .unwrap_or_default(),
                source: result
                    .location()
                    .and_then(|location| location.s3_location())
                    .and_then(|s3| s3.uri())
                    .map(str::to_string),
                score: result.score().map(|score| score as f32),
            })
            .collect())
    }

    async fn retrieve_and_generate(&self, kb_id: &str, query: &str, model_arn: Option<&str>) -> LlmResult<KbAnswer> {
        use aws_sdk_bedrockagentruntime::types::{
            KnowledgeBaseRetrieveAndGenerateConfiguration, RetrieveAndGenerateConfiguration, RetrieveAndGenerateInput,
            RetrieveAndGenerateType,
        };

        let Some(model_arn) = model_arn else {
            return Err(LlmError::Validation(
                "retrieve-and-generate requires [kb].model_arn to be configured".to_string(),
            ));
        };

        let input = RetrieveAndGenerateInput::builder()
            .text(query)
            .build()
            .map_err(|e| LlmError::Internal(Some(format!("building RAG input: {e}"))))?;

        let kb_config = KnowledgeBaseRetrieveAndGenerateConfiguration::builder()
            .knowledge_base_id(kb_id)
            .model_arn(model_arn)
            .build()
            .map_err(|e| LlmError::Internal(Some(format!("building RAG configuration: {e}"))))?;

        let output = self
            .runtime
            .retrieve_and_generate()
            .input(input)
            .retrieve_and_generate_configuration(
                RetrieveAndGenerateConfiguration::builder()
                    .r#type(RetrieveAndGenerateType::KnowledgeBase)
                    .knowledge_base_configuration(kb_config)
                    .build()
                    .map_err(|e| LlmError::Internal(Some(format!("building RAG configuration: {e}"))))?,
            )
            .send()
            .await
            .map_err(|e| LlmError::ServiceUnavailable(format!("RetrieveAndGenerate failed: {e}")))?;

        let text = output
            .output()
            .map(|out| out.text().to_string())
            .unwrap_or_default();

        let citations = output
            .citations()
            .iter()
            .flat_map(|citation| citation.retrieved_references())
            .filter_map(|reference| {
                reference
                    .location()
                    .and_then(|location| location.s3_location())
                    .and_then(|s3| s3.uri())
                    .map(|uri| Citation {
                        source: uri.to_string(),
                    })
            })
            .collect();

        Ok(KbAnswer { text, citations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kb_config() -> config::KbConfig {
        toml::from_str("enabled = true").expect("valid kb config")
    }

    #[test]
    fn strong_markers_route_to_direct_rag() {
        let config = kb_config();
        let score = score_intent("What does the knowledge base say about refunds? Check company policy.");

        assert!(score >= 0.7, "score {score} should clear the direct threshold");
        assert_eq!(decide(score, &config), KbRoute::DirectRag);
    }

    #[test]
    fn weak_markers_route_to_augmentation() {
        let config = kb_config();
        let score = score_intent("Is there a guideline for error handling in the docs");

        assert!((0.4..0.7).contains(&score), "score {score} should land mid-band");
        assert_eq!(decide(score, &config), KbRoute::ContextAugmentation);
    }

    #[test]
    fn small_talk_skips_the_kb() {
        let config = kb_config();
        let score = score_intent("hey, good morning!");

        assert!(score < 0.4, "score {score} should stay below the augment threshold");
        assert_eq!(decide(score, &config), KbRoute::Skip);
    }

    #[test]
    fn citations_render_markdown_and_numbered() {
        let citations = vec![
            Citation {
                source: "s3://kb/policies.pdf".to_string(),
            },
            Citation {
                source: "s3://kb/faq.md".to_string(),
            },
        ];

        let markdown = render_citations("Answer.", &citations, CitationFormat::Markdown);
        assert!(markdown.contains("- [s3://kb/policies.pdf](s3://kb/policies.pdf)"));

        let numbered = render_citations("Answer.", &citations, CitationFormat::Numbered);
        assert!(numbered.contains("[1] s3://kb/policies.pdf"));
        assert!(numbered.contains("[2] s3://kb/faq.md"));

        let none = render_citations("Answer.", &citations, CitationFormat::None);
        assert_eq!(none, "Answer.");
    }

    #[test]
    fn preamble_injection_prefixes_the_first_user_message() {
        let mut request = CanonicalRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                CanonicalMessage::text(Role::Assistant, "Earlier answer."),
                CanonicalMessage::text(Role::User, "Summarize"),
            ],
            system: None,
            max_tokens: None,
            temperature: None,
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
        };

        inject_preamble(&mut request, "=== KNOWLEDGE BASE CONTEXT ===\ncontent\n========================");

        // The assistant message is untouched; the user message starts with
        // the preamble and keeps its text on the following line.
        assert_eq!(request.messages[0].content.as_text(), "Earlier answer.");
        let user_text = request.messages[1].content.as_text();
        assert!(user_text.starts_with("=== KNOWLEDGE BASE CONTEXT ==="));
        assert!(user_text.ends_with("\nSummarize"));
    }
}
