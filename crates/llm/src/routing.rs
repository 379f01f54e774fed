//! Model-identifier routing.
//!
//! Maps a model id to the provider that hosts it and the family strategy
//! that shapes its requests. Routing is a pure function of the id: the
//! table is fixed at compile time and the per-process cache only memoizes
//! lookups.

use dashmap::DashMap;

use crate::error::{LlmError, LlmResult};

/// Which transport client serves the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI HTTP API.
    OpenAi,
    /// AWS Bedrock runtime.
    Bedrock,
}

/// Which request-shaping strategy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// OpenAI chat completions.
    OpenAiChat,
    /// Anthropic Claude on Bedrock.
    Claude,
    /// Amazon Titan text on Bedrock.
    Titan,
}

/// A resolved route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub provider: ProviderKind,
    pub family: ModelFamily,
}

/// Prefix table. Longest matching prefix wins. Entries with no route are
/// recognized Bedrock families without a registered strategy; adding one
/// means adding a family module and flipping the entry to `Some`.
const PREFIX_TABLE: &[(&str, Option<Route>)] = &[
    (
        "gpt-",
        Some(Route {
            provider: ProviderKind::OpenAi,
            family: ModelFamily::OpenAiChat,
        }),
    ),
    (
        "text-",
        Some(Route {
            provider: ProviderKind::OpenAi,
            family: ModelFamily::OpenAiChat,
        }),
    ),
    (
        "dall-e-",
        Some(Route {
            provider: ProviderKind::OpenAi,
            family: ModelFamily::OpenAiChat,
        }),
    ),
    (
        "anthropic.",
        Some(Route {
            provider: ProviderKind::Bedrock,
            family: ModelFamily::Claude,
        }),
    ),
    (
        "amazon.titan-",
        Some(Route {
            provider: ProviderKind::Bedrock,
            family: ModelFamily::Titan,
        }),
    ),
    ("ai21.", None),
    ("cohere.", None),
    ("meta.", None),
    ("mistral.", None),
];

/// Route resolver with a process-lifetime memo.
pub struct RouteTable {
    cache: DashMap<String, Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self { cache: DashMap::new() }
    }

    /// Resolves a model id to its route.
    ///
    /// Regional prefixes (`us.`, `eu.`, `apac.`, `ap-*.`) are stripped for
    /// the lookup only; callers keep passing the original id upstream.
    /// Concurrent misses may compute the same entry; last write wins and
    /// the value is identical either way.
    pub fn route(&self, model_id: &str) -> LlmResult<Route> {
        if let Some(route) = self.cache.get(model_id) {
            return Ok(*route);
        }

        let route = resolve(model_id)?;
        self.cache.insert(model_id.to_string(), route);

        Ok(route)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(model_id: &str) -> LlmResult<Route> {
    let lookup_id = strip_region(model_id);

    let matched = PREFIX_TABLE
        .iter()
        .filter(|(prefix, _)| lookup_id.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len());

    match matched {
        Some((_, Some(route))) => Ok(*route),
        Some((prefix, None)) => Err(LlmError::UnsupportedModel(format!(
            "{model_id} ({prefix}* models have no registered strategy)"
        ))),
        None => Err(LlmError::UnsupportedModel(model_id.to_string())),
    }
}

/// Strips a leading regional token (`us.`, `eu.`, `apac.`, `ap-*.`) when
/// what follows is a recognizable family prefix.
fn strip_region(model_id: &str) -> &str {
    let Some((token, rest)) = model_id.split_once('.') else {
        return model_id;
    };

    let is_region = matches!(token, "us" | "eu" | "apac") || token.starts_with("ap-");

    if is_region && PREFIX_TABLE.iter().any(|(prefix, _)| rest.starts_with(prefix)) {
        rest
    } else {
        model_id
    }
}
