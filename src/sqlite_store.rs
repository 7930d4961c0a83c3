//! SQLite-backed [`ItemStore`] and [`Retriever`].
//!
//! Wraps a [`SqlitePool`] and maps store operations onto the schema created
//! by [`migrate`](crate::migrate): `items`, `item_values`, `reviews`,
//! `review_vectors`, `criteria`, and `classification_snapshot`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use inventory_abc_core::classify::ClassificationRun;
use inventory_abc_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use inventory_abc_core::models::{
    ClassLabel, Classification, ContextSnippet, CriterionDefinition, DataSource, Item,
};
use inventory_abc_core::store::{select_top_k, FieldUpdate, ItemStore, Retriever};

/// SQLite implementation of the store traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

/// A review to insert.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub id: String,
    pub product_id: String,
    pub title: Option<String>,
    pub message: String,
    pub rating: Option<f64>,
}

/// A review whose vector is missing or stale for the current model.
#[derive(Debug, Clone)]
pub struct PendingReview {
    pub review_id: String,
    pub product_id: String,
    pub text: String,
    pub text_hash: String,
}

/// A registered criterion and how many items hold a value for it.
#[derive(Debug, Clone)]
pub struct CriterionRecord {
    pub definition: CriterionDefinition,
    pub coverage: i64,
    pub updated_at: i64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or update an item and merge its criterion values.
    pub async fn upsert_item(
        &self,
        product_id: &str,
        name: Option<&str>,
        values: &BTreeMap<String, f64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO items (product_id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(product_id) DO UPDATE SET
                name = COALESCE(excluded.name, items.name),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(product_id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (criterion, value) in values {
            upsert_value(&mut tx, product_id, criterion, *value, now).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Distinct criterion names that have at least one stored value.
    pub async fn criterion_names(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar(
            "SELECT DISTINCT criterion FROM item_values ORDER BY criterion",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    pub async fn item_count(&self) -> Result<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn item_exists(&self, product_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE product_id = ?")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Insert or replace a review. Its vector becomes stale if the text changed.
    ///
    /// A review moved to another item takes its vector along, so the old
    /// item stops retrieving it.
    pub async fn upsert_review(&self, review: &NewReview) -> Result<()> {
        let hash = hash_text(&review_text(review.title.as_deref(), &review.message));
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO reviews (id, product_id, title, message, rating, hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                product_id = excluded.product_id,
                title = excluded.title,
                message = excluded.message,
                rating = excluded.rating,
                hash = excluded.hash
            "#,
        )
        .bind(&review.id)
        .bind(&review.product_id)
        .bind(&review.title)
        .bind(&review.message)
        .bind(review.rating)
        .bind(&hash)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to store review {}", review.id))?;

        sqlx::query(
            "UPDATE review_vectors SET product_id = ? WHERE review_id = ? AND product_id != ?",
        )
        .bind(&review.product_id)
        .bind(&review.id)
        .bind(&review.product_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Reviews with no vector for `model`, or whose text changed since embedding.
    pub async fn find_pending_reviews(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PendingReview>> {
        let limit_val = limit.map(|l| l as i64).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"
            SELECT r.id, r.product_id, r.title, r.message, r.hash
            FROM reviews r
            LEFT JOIN review_vectors v ON v.review_id = r.id AND v.model = ?
            WHERE v.review_id IS NULL OR v.hash != r.hash
            ORDER BY r.product_id, r.id
            LIMIT ?
            "#,
        )
        .bind(model)
        .bind(limit_val)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let title: Option<String> = row.get("title");
                let message: String = row.get("message");
                PendingReview {
                    review_id: row.get("id"),
                    product_id: row.get("product_id"),
                    text: review_text(title.as_deref(), &message),
                    text_hash: row.get("hash"),
                }
            })
            .collect())
    }

    pub async fn upsert_review_vector(
        &self,
        review: &PendingReview,
        model: &str,
        vector: &[f32],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO review_vectors (review_id, product_id, model, dims, hash, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(review_id) DO UPDATE SET
                product_id = excluded.product_id,
                model = excluded.model,
                dims = excluded.dims,
                hash = excluded.hash,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(&review.review_id)
        .bind(&review.product_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(&review.text_hash)
        .bind(vec_to_blob(vector))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_review_vectors(&self) -> Result<u64> {
        let done = sqlx::query("DELETE FROM review_vectors")
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    /// Insert or update a criterion in the registry.
    pub async fn register_criterion(&self, definition: &CriterionDefinition) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let sources: Vec<&str> = definition.data_sources.iter().map(|s| s.as_str()).collect();
        sqlx::query(
            r#"
            INSERT INTO criteria (field_key, name, definition, data_sources_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(field_key) DO UPDATE SET
                name = excluded.name,
                definition = excluded.definition,
                data_sources_json = excluded.data_sources_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&definition.field_key)
        .bind(&definition.name)
        .bind(&definition.definition)
        .bind(serde_json::to_string(&sources)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_criterion(&self, field_key: &str) -> Result<Option<CriterionDefinition>> {
        let row = sqlx::query(
            "SELECT field_key, name, definition, data_sources_json FROM criteria WHERE field_key = ?",
        )
        .bind(field_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| criterion_from_row(&r)).transpose()
    }

    /// Registered criteria with per-criterion value coverage.
    pub async fn list_criteria(&self) -> Result<Vec<CriterionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT c.field_key, c.name, c.definition, c.data_sources_json, c.updated_at,
                   COUNT(v.product_id) AS coverage
            FROM criteria c
            LEFT JOIN item_values v ON v.criterion = c.field_key
            GROUP BY c.field_key
            ORDER BY c.field_key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(CriterionRecord {
                    definition: criterion_from_row(r)?,
                    coverage: r.get("coverage"),
                    updated_at: r.get("updated_at"),
                })
            })
            .collect()
    }

    /// Classification of the previous run; empty if none was saved.
    pub async fn load_snapshot(&self) -> Result<Classification> {
        let rows = sqlx::query("SELECT product_id, class FROM classification_snapshot")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Classification::new();
        for row in &rows {
            let class: String = row.get("class");
            out.insert(row.get("product_id"), class.parse::<ClassLabel>()?);
        }
        Ok(out)
    }

    /// Replace the stored snapshot with `run`.
    pub async fn save_snapshot(&self, run: &ClassificationRun) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM classification_snapshot")
            .execute(&mut *tx)
            .await?;

        for item in &run.items {
            sqlx::query(
                "INSERT INTO classification_snapshot (product_id, class, weighted_score, run_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&item.product_id)
            .bind(item.class.as_str())
            .bind(item.weighted_score)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn upsert_value(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product_id: &str,
    criterion: &str,
    value: f64,
    now: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO item_values (product_id, criterion, value, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(product_id, criterion) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(product_id)
    .bind(criterion)
    .bind(value)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn criterion_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CriterionDefinition> {
    let sources_json: String = row.get("data_sources_json");
    let data_sources: Vec<DataSource> = serde_json::from_str(&sources_json)
        .with_context(|| format!("Corrupt data_sources_json: {}", sources_json))?;
    Ok(CriterionDefinition {
        name: row.get("name"),
        field_key: row.get("field_key"),
        definition: row.get("definition"),
        data_sources,
    })
}

/// Text that gets embedded and shown to the scorer for one review.
pub fn review_text(title: Option<&str>, message: &str) -> String {
    match title {
        Some(t) if !t.trim().is_empty() => format!("{}\n{}", t.trim(), message),
        _ => message.to_string(),
    }
}

pub fn hash_text(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl ItemStore for SqliteStore {
    async fn list_item_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT product_id FROM items ORDER BY product_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn load_items(&self) -> Result<Vec<Item>> {
        let ids: Vec<String> = self.list_item_ids().await?;
        let mut items: BTreeMap<String, Item> = ids
            .into_iter()
            .map(|id| (id.clone(), Item::new(id)))
            .collect();

        let rows = sqlx::query("SELECT product_id, criterion, value FROM item_values")
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            let product_id: String = row.get("product_id");
            if let Some(item) = items.get_mut(&product_id) {
                item.values.insert(row.get("criterion"), row.get("value"));
            }
        }

        Ok(items.into_values().collect())
    }

    async fn bulk_set_field(&self, updates: &[FieldUpdate]) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for u in updates {
            upsert_value(&mut tx, &u.product_id, &u.field_key, u.value, now)
                .await
                .with_context(|| format!("Failed to set {} on {}", u.field_key, u.product_id))?;
        }

        tx.commit().await?;
        Ok(updates.len() as u64)
    }
}

#[async_trait]
impl Retriever for SqliteStore {
    async fn top_k(
        &self,
        query: &[f32],
        product_id: &str,
        k: usize,
        candidate_pool: usize,
    ) -> Result<Vec<ContextSnippet>> {
        let rows = sqlx::query(
            r#"
            SELECT r.title, r.message, v.embedding
            FROM review_vectors v
            JOIN reviews r ON r.id = v.review_id
            WHERE r.product_id = ? AND v.hash = r.hash
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                ContextSnippet {
                    product_id: product_id.to_string(),
                    title: row.get("title"),
                    text: row.get("message"),
                    relevance: cosine_similarity(query, &vector) as f64,
                }
            })
            .collect();

        Ok(select_top_k(candidates, k, candidate_pool))
    }
}
