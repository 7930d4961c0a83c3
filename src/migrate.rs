//! Database schema migrations (idempotent).

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index if missing.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Items (SKUs)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            product_id TEXT PRIMARY KEY,
            name TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Dynamic criterion values, one row per (item, criterion)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_values (
            product_id TEXT NOT NULL,
            criterion TEXT NOT NULL,
            value REAL NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (product_id, criterion),
            FOREIGN KEY (product_id) REFERENCES items(product_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Reviews used as scoring context
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reviews (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            title TEXT,
            message TEXT NOT NULL,
            rating REAL,
            hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (product_id) REFERENCES items(product_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_vectors (
            review_id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (review_id) REFERENCES reviews(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Registry of known criteria
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS criteria (
            field_key TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            definition TEXT NOT NULL,
            data_sources_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Last classification run, kept for trend comparison
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS classification_snapshot (
            product_id TEXT PRIMARY KEY,
            class TEXT NOT NULL,
            weighted_score REAL NOT NULL,
            run_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_item_values_criterion ON item_values(criterion)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reviews_product_id ON reviews(product_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_review_vectors_product_id ON review_vectors(product_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
