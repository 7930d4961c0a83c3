//! JSON import of items and reviews.
//!
//! Items are a JSON array of flat objects. `productId` is required, `name`
//! is optional, and every other numeric field becomes a criterion value:
//!
//! ```json
//! [{"productId": "sku-1", "name": "Widget", "annualValue": 1200, "leadTime": 14}]
//! ```
//!
//! Reviews reference an existing item. A review without `id` gets a random
//! UUID:
//!
//! ```json
//! [{"productId": "sku-1", "title": "Broke", "message": "Stopped after a week", "rating": 2}]
//! ```
//!
//! Both imports validate the whole file before writing anything.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use inventory_abc_core::models::validate_field_key;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::{NewReview, SqliteStore};

/// One parsed item row.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub product_id: String,
    pub name: Option<String>,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "product_id")]
    pub product_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub message: String,
    #[serde(default)]
    pub rating: Option<f64>,
}

pub async fn run_import_items(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records = parse_items(&content)?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let imported = import_items(&store, &records).await?;

    println!("import items");
    println!("  file: {}", path.display());
    println!("  items: {}", imported);
    store.pool().close().await;
    Ok(())
}

pub async fn run_import_reviews(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records = parse_reviews(&content)?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let imported = import_reviews(&store, &records).await?;

    println!("import reviews");
    println!("  file: {}", path.display());
    println!("  reviews: {}", imported);
    store.pool().close().await;
    Ok(())
}

/// Parse an items file. Non-numeric extra fields are ignored.
pub fn parse_items(content: &str) -> Result<Vec<ItemRecord>> {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(content).context("Items file must be a JSON array of objects")?;

    let mut seen = std::collections::HashSet::new();
    let mut records = Vec::with_capacity(rows.len());

    for (pos, row) in rows.into_iter().enumerate() {
        let product_id = row
            .get("productId")
            .or_else(|| row.get("product_id"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Item #{} has no productId", pos + 1))?;

        if !seen.insert(product_id.clone()) {
            bail!("Duplicate productId in items file: {}", product_id);
        }

        let name = row.get("name").and_then(|v| v.as_str()).map(str::to_string);

        let mut values = BTreeMap::new();
        for (key, value) in &row {
            if matches!(key.as_str(), "productId" | "product_id" | "name") {
                continue;
            }
            match value.as_f64() {
                Some(v) if v.is_finite() => {
                    validate_field_key(key)
                        .with_context(|| format!("Item {} has an invalid field", product_id))?;
                    values.insert(key.clone(), v);
                }
                _ => tracing::debug!(product_id, field = key, "skipping non-numeric field"),
            }
        }

        records.push(ItemRecord {
            product_id,
            name,
            values,
        });
    }

    Ok(records)
}

pub fn parse_reviews(content: &str) -> Result<Vec<ReviewRecord>> {
    let records: Vec<ReviewRecord> =
        serde_json::from_str(content).context("Reviews file must be a JSON array of reviews")?;
    for (pos, r) in records.iter().enumerate() {
        if r.product_id.trim().is_empty() {
            bail!("Review #{} has an empty productId", pos + 1);
        }
        if r.message.trim().is_empty() {
            bail!("Review #{} has an empty message", pos + 1);
        }
    }
    Ok(records)
}

pub async fn import_items(store: &SqliteStore, records: &[ItemRecord]) -> Result<usize> {
    for r in records {
        store
            .upsert_item(&r.product_id, r.name.as_deref(), &r.values)
            .await
            .with_context(|| format!("Failed to import item {}", r.product_id))?;
    }
    Ok(records.len())
}

/// Insert reviews after checking that every referenced item exists.
pub async fn import_reviews(store: &SqliteStore, records: &[ReviewRecord]) -> Result<usize> {
    for r in records {
        if !store.item_exists(r.product_id.trim()).await? {
            bail!("Review references unknown productId: {}", r.product_id);
        }
    }

    for r in records {
        let review = NewReview {
            id: r
                .id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            product_id: r.product_id.trim().to_string(),
            title: r.title.clone(),
            message: r.message.clone(),
            rating: r.rating,
        };
        store.upsert_review(&review).await?;
    }
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_items_numeric_fields() {
        let items = parse_items(
            r#"[{"productId": "p1", "name": "Widget", "annualValue": 1200, "leadTime": 14.5, "color": "red"}]"#,
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name.as_deref(), Some("Widget"));
        assert_eq!(items[0].values.len(), 2);
        assert_eq!(items[0].values["leadTime"], 14.5);
    }

    #[test]
    fn test_parse_items_requires_product_id() {
        let err = parse_items(r#"[{"annualValue": 1}]"#).unwrap_err();
        assert!(err.to_string().contains("productId"));
    }

    #[test]
    fn test_parse_items_rejects_duplicates() {
        assert!(parse_items(r#"[{"productId": "p1"}, {"productId": "p1"}]"#).is_err());
    }

    #[test]
    fn test_parse_reviews_optional_fields() {
        let reviews =
            parse_reviews(r#"[{"productId": "p1", "message": "fine"}, {"id": "r2", "product_id": "p2", "title": "t", "message": "m", "rating": 4}]"#)
                .unwrap();
        assert_eq!(reviews.len(), 2);
        assert!(reviews[0].id.is_none());
        assert_eq!(reviews[1].product_id, "p2");
        assert_eq!(reviews[1].rating, Some(4.0));
    }

    #[test]
    fn test_parse_reviews_rejects_empty_message() {
        assert!(parse_reviews(r#"[{"productId": "p1", "message": "  "}]"#).is_err());
    }
}
