//! Criterion scoring pipeline.
//!
//! Derives a value of a new criterion for every item:
//!
//! 1. validate the [`CriterionDefinition`];
//! 2. list every item id from the [`ItemStore`];
//! 3. embed the definition once with the [`Embedder`];
//! 4. per item, at most `max_in_flight` at a time: retrieve the top-K
//!    snippets with the [`Retriever`], then ask the [`CriterionScorer`]
//!    for one number;
//! 5. wait for every item, then write the surviving updates with a single
//!    [`ItemStore::bulk_set_field`] call.
//!
//! A failure for one item drops that item's update and is recorded in
//! [`ScoringReport::failed`]; it never aborts the batch. Listing,
//! embedding, and commit failures abort the run with a [`PipelineError`].
//! When no update survives, nothing is written and the run still succeeds.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::models::{ContextSnippet, CriterionDefinition, DataSource};
use crate::store::{CriterionScorer, FieldUpdate, ItemStore, Retriever};

/// Tuning knobs for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Snippets handed to the scorer per item.
    pub top_k: usize,
    /// Nearest candidates considered before truncating to `top_k`.
    pub candidate_pool: usize,
    /// Upper bound on concurrently processed items.
    pub max_in_flight: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            candidate_pool: 50,
            max_in_flight: 16,
        }
    }
}

/// Where an item's attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Retrieval,
    /// Retrieval succeeded but found nothing to score from.
    NoContext,
    Scoring,
    /// The scorer answered, but not with a usable number.
    Unscorable,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::Retrieval => "retrieval",
            FailureStage::NoContext => "no_context",
            FailureStage::Scoring => "scoring",
            FailureStage::Unscorable => "unscorable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub product_id: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringReport {
    pub field_key: String,
    /// Number of items the run attempted.
    pub targets: usize,
    /// Updates that were committed, ordered by product id.
    pub succeeded: Vec<FieldUpdate>,
    pub failed: Vec<ItemFailure>,
    /// Items reported updated by the store; 0 when nothing was written.
    pub committed: u64,
}

impl ScoringReport {
    /// Share of targets that failed, in `[0, 1]`; 0 when there were no targets.
    pub fn failure_ratio(&self) -> f64 {
        if self.targets == 0 {
            0.0
        } else {
            self.failed.len() as f64 / self.targets as f64
        }
    }
}

/// Parse a scorer's raw answer into a finite number.
///
/// Accepts a JSON number or a numeric string. Anything else is an error,
/// so "could not score" never turns into a score of 0.
pub fn parse_score(raw: &serde_json::Value) -> Result<f64, String> {
    let value = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(format!("non-finite score: {}", v)),
        None => Err(format!("not a number: {}", raw)),
    }
}

/// Criterion scoring over injected collaborators.
pub struct CriterionPipeline<'a> {
    store: &'a dyn ItemStore,
    embedder: &'a dyn Embedder,
    retriever: &'a dyn Retriever,
    scorer: &'a dyn CriterionScorer,
    options: PipelineOptions,
}

impl<'a> CriterionPipeline<'a> {
    pub fn new(
        store: &'a dyn ItemStore,
        embedder: &'a dyn Embedder,
        retriever: &'a dyn Retriever,
        scorer: &'a dyn CriterionScorer,
    ) -> Self {
        Self {
            store,
            embedder,
            retriever,
            scorer,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Score every item for `definition` and commit the results in bulk.
    ///
    /// Context always comes from the [`Retriever`]. The definition's
    /// `data_sources` are descriptive only and do not narrow retrieval.
    pub async fn run(
        &self,
        definition: &CriterionDefinition,
    ) -> Result<ScoringReport, PipelineError> {
        definition.validate()?;
        let field_key = definition.field_key.as_str();

        if !definition.data_sources.contains(&DataSource::Reviews) {
            debug!(
                field_key,
                sources = ?definition.data_sources,
                "criterion does not list reviews, scoring from retrieved reviews anyway"
            );
        }

        let ids = self
            .store
            .list_item_ids()
            .await
            .map_err(|e| PipelineError::Enumerate {
                reason: format!("{:#}", e),
            })?;

        info!(
            field_key,
            targets = ids.len(),
            max_in_flight = self.options.max_in_flight,
            "criterion scoring started"
        );

        let query = self
            .embedder
            .embed(&definition.definition)
            .await
            .map_err(|e| PipelineError::Embedding {
                reason: format!("{:#}", e),
            })?;
        if query.is_empty() {
            return Err(PipelineError::Embedding {
                reason: "embedder returned an empty vector".to_string(),
            });
        }

        let targets = ids.len();
        let query = query.as_slice();
        let outcomes: Vec<Result<FieldUpdate, ItemFailure>> = stream::iter(ids)
            .map(|product_id| self.score_item(query, definition, product_id))
            .buffer_unordered(self.options.max_in_flight.max(1))
            .collect()
            .await;

        let mut succeeded = Vec::with_capacity(outcomes.len());
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(update) => succeeded.push(update),
                Err(failure) => {
                    warn!(
                        product_id = %failure.product_id,
                        stage = %failure.stage,
                        reason = %failure.reason,
                        "item dropped from criterion scoring"
                    );
                    failed.push(failure);
                }
            }
        }
        succeeded.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        failed.sort_by(|a, b| a.product_id.cmp(&b.product_id));

        let committed = if succeeded.is_empty() {
            info!(field_key, "no scores survived, skipping bulk write");
            0
        } else {
            self.store
                .bulk_set_field(&succeeded)
                .await
                .map_err(|e| PipelineError::Commit {
                    pending: succeeded.len(),
                    reason: format!("{:#}", e),
                })?
        };

        info!(
            field_key,
            targets,
            committed,
            failed = failed.len(),
            "criterion scoring finished"
        );

        Ok(ScoringReport {
            field_key: field_key.to_string(),
            targets,
            succeeded,
            failed,
            committed,
        })
    }

    async fn score_item(
        &self,
        query: &[f32],
        definition: &CriterionDefinition,
        product_id: String,
    ) -> Result<FieldUpdate, ItemFailure> {
        let fail = |stage, reason: String| ItemFailure {
            product_id: product_id.clone(),
            stage,
            reason,
        };

        let context: Vec<ContextSnippet> = self
            .retriever
            .top_k(
                query,
                &product_id,
                self.options.top_k,
                self.options.candidate_pool,
            )
            .await
            .map_err(|e| fail(FailureStage::Retrieval, format!("{:#}", e)))?;

        if context.is_empty() {
            return Err(fail(
                FailureStage::NoContext,
                "no context snippets found".to_string(),
            ));
        }

        debug!(product_id = %product_id, snippets = context.len(), "scoring item");

        let raw = self
            .scorer
            .score(&definition.definition, &context)
            .await
            .map_err(|e| fail(FailureStage::Scoring, format!("{:#}", e)))?;

        let value = parse_score(&raw).map_err(|reason| fail(FailureStage::Unscorable, reason))?;

        Ok(FieldUpdate {
            product_id: product_id.clone(),
            field_key: definition.field_key.clone(),
            value,
        })
    }
}
