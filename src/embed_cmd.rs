//! Review embedding commands.
//!
//! `abc embed pending` vectorizes reviews that have no vector for the
//! configured model, or whose text changed since they were embedded.
//! `abc embed rebuild` discards every vector and embeds everything again.
//! A failed batch is reported and skipped; the rest still land.

use anyhow::{bail, Result};

use inventory_abc_core::embedding::Embedder;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::sqlite_store::{PendingReview, SqliteStore};

/// Counts reported by one embedding pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EmbedSummary {
    pub pending: usize,
    pub embedded: u64,
    pub failed: u64,
}

/// Find and embed reviews that are missing or have stale vectors.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let pending = store
        .find_pending_reviews(embedder.model_name(), limit)
        .await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  reviews needing embeddings: {}", pending.len());
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all reviews up to date");
        return Ok(());
    }

    let summary = embed_reviews(&store, embedder.as_ref(), &pending, batch_size).await?;

    println!("embed pending");
    println!("  total pending: {}", summary.pending);
    println!("  embedded: {}", summary.embedded);
    println!("  failed: {}", summary.failed);

    store.pool().close().await;
    Ok(())
}

/// Delete all vectors and embed every review again.
pub async fn run_embed_rebuild(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let deleted = store.clear_review_vectors().await?;
    let pending = store
        .find_pending_reviews(embedder.model_name(), None)
        .await?;

    let summary = embed_reviews(&store, embedder.as_ref(), &pending, batch_size).await?;

    println!("embed rebuild");
    println!("  vectors deleted: {}", deleted);
    println!("  embedded: {}", summary.embedded);
    println!("  failed: {}", summary.failed);

    store.pool().close().await;
    Ok(())
}

/// Embed `pending` in batches of `batch_size` and store the vectors.
pub async fn embed_reviews(
    store: &SqliteStore,
    embedder: &dyn Embedder,
    pending: &[PendingReview],
    batch_size: usize,
) -> Result<EmbedSummary> {
    let mut summary = EmbedSummary {
        pending: pending.len(),
        ..Default::default()
    };
    let model_name = embedder.model_name().to_string();

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        match embedder.embed_batch(&texts).await {
            Ok(vectors) => {
                for (review, vector) in batch.iter().zip(vectors.iter()) {
                    store
                        .upsert_review_vector(review, &model_name, vector)
                        .await?;
                    summary.embedded += 1;
                }
            }
            Err(e) => {
                tracing::warn!(batch = batch.len(), error = %format!("{:#}", e), "embedding batch failed");
                summary.failed += batch.len() as u64;
            }
        }
    }

    Ok(summary)
}
