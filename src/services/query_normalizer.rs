use serde_json::Value;
use tracing::{debug, warn};

use super::llm::LanguageModel;
use crate::models::news::Scope;

/// Query used when the caller sends nothing.
pub const GLOBAL_SENTINEL: &str = "global news";

const INSTRUCTION: &str = "You normalize news search queries into cache keys. \
Reply with strict JSON only, no prose, shaped as \
{\"normalized_query\": string, \"scope\": \"global\" | \"region\" | \"local\"}. \
normalized_query is the canonical lowercase topic or place name (e.g. \"ukraine\", \
\"san francisco\", \"global news\"). scope is global for worldwide topics, region for \
countries or large regions, local for cities and smaller places.";

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuery {
    pub key: String,
    pub scope: Scope,
}

pub fn effective_query(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        GLOBAL_SENTINEL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Map a free-text query to a cache key and scope. Never fails: any problem
/// falls back to the raw query with global scope.
pub async fn normalize(llm: &dyn LanguageModel, raw: &str) -> NormalizedQuery {
    let query = effective_query(raw);
    let fallback = NormalizedQuery {
        key: query.clone(),
        scope: Scope::Global,
    };

    match llm.complete_json(INSTRUCTION, &query).await {
        Ok(reply) => match parse_reply(&reply) {
            Some(normalized) => {
                debug!(query = %query, key = %normalized.key, scope = ?normalized.scope, "Normalized query");
                normalized
            }
            None => {
                warn!(query = %query, reply = %reply, "Normalizer reply missing fields");
                fallback
            }
        },
        Err(e) => {
            warn!(query = %query, error = %e, "Query normalization failed");
            fallback
        }
    }
}

fn parse_reply(reply: &Value) -> Option<NormalizedQuery> {
    let key = reply["normalized_query"].as_str()?.trim();
    if key.is_empty() {
        return None;
    }
    let scope = Scope::parse(reply["scope"].as_str()?)?;
    Some(NormalizedQuery {
        key: key.to_string(),
        scope,
    })
}
