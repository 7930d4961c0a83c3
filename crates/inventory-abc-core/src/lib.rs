//! # Inventory ABC Core
//!
//! Shared, runtime-agnostic logic for Inventory ABC: data models, the
//! multi-criteria classification path, the store and provider traits, and
//! the criterion scoring pipeline.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Concrete
//! stores and model providers live in the `inventory-abc` app crate.
//!
//! ## Classification path
//!
//! ```text
//! items ──▶ normalize ──▶ weighted_scores ──▶ classify_abc ──▶ compare
//!           [0,1] per      Σ norm × weight     cumulative       previous
//!           criterion                          share → A/B/C    vs current
//! ```
//!
//! ## Criterion scoring pipeline
//!
//! ```text
//! definition ──▶ Embedder ──▶ per item (bounded): Retriever ─▶ CriterionScorer
//!                                                    │
//!                      ItemStore::bulk_set_field ◀───┘ (gather, then one write)
//! ```

pub mod classify;
pub mod embedding;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod store;
pub mod trend;
pub mod weighting;

pub use classify::{classify, classify_abc, AbcThresholds, ClassificationRun};
pub use error::{PipelineError, ValidationError};
pub use models::{
    ClassLabel, Classification, ContextSnippet, CriterionDefinition, CriterionSet, DataSource,
    GeneratedCriterion, Item, WeightMap,
};
pub use pipeline::{CriterionPipeline, PipelineOptions, ScoringReport};
pub use trend::{compare, Trend};
