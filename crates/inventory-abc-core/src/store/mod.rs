//! Storage, retrieval, and model-provider abstractions.
//!
//! The traits here are the seams between the engine and its collaborators:
//! the persistent item store, the context retriever, and the generative
//! model. Implementations must be `Send + Sync` so a pipeline can share
//! them across concurrently running item tasks.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{ContextSnippet, GeneratedCriterion, Item};

/// One pending single-field write: set `field_key = value` on `product_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldUpdate {
    pub product_id: String,
    pub field_key: String,
    pub value: f64,
}

/// Persistent owner of items and their criterion values.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_item_ids`](ItemStore::list_item_ids) | Identifiers of every item |
/// | [`load_items`](ItemStore::load_items) | Items with all criterion values |
/// | [`bulk_set_field`](ItemStore::bulk_set_field) | Apply many single-field updates |
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list_item_ids(&self) -> Result<Vec<String>>;

    async fn load_items(&self) -> Result<Vec<Item>>;

    /// Apply every update in one bulk operation.
    ///
    /// Implementations either apply all updates or report failure; callers
    /// assume no partial commit. Returns the number of items updated.
    async fn bulk_set_field(&self, updates: &[FieldUpdate]) -> Result<u64>;
}

/// Approximate nearest-neighbour lookup of snippets scoped to one item.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `k` snippets for `product_id`, most relevant first,
    /// chosen from the `candidate_pool` nearest candidates.
    async fn top_k(
        &self,
        query: &[f32],
        product_id: &str,
        k: usize,
        candidate_pool: usize,
    ) -> Result<Vec<ContextSnippet>>;
}

/// One generative call that turns a definition plus evidence into a score.
///
/// Returns the model's raw `score` field; the pipeline parses it so an
/// unusable answer is recorded as a failure instead of a zero.
#[async_trait]
pub trait CriterionScorer: Send + Sync {
    async fn score(&self, definition: &str, context: &[ContextSnippet])
        -> Result<serde_json::Value>;
}

/// One generative call that drafts a criterion definition from a prompt.
#[async_trait]
pub trait CriterionGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedCriterion>;
}

/// Rank `candidates` by relevance (descending), keep the `candidate_pool`
/// best, then truncate to `k`.
pub fn select_top_k(
    mut candidates: Vec<ContextSnippet>,
    k: usize,
    candidate_pool: usize,
) -> Vec<ContextSnippet> {
    candidates.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(candidate_pool.max(k));
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(text: &str, relevance: f64) -> ContextSnippet {
        ContextSnippet {
            product_id: "p1".to_string(),
            title: None,
            text: text.to_string(),
            relevance,
        }
    }

    #[test]
    fn test_select_top_k_orders_and_truncates() {
        let picked = select_top_k(
            vec![snippet("low", 0.1), snippet("high", 0.9), snippet("mid", 0.5)],
            2,
            50,
        );
        let texts: Vec<&str> = picked.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["high", "mid"]);
    }

    #[test]
    fn test_select_top_k_pool_smaller_than_k() {
        let picked = select_top_k(vec![snippet("a", 0.2), snippet("b", 0.4)], 5, 1);
        assert_eq!(picked.len(), 2);
    }
}
