//! Library-level tests of the SQLite store and retriever under the scoring
//! pipeline, with stub model providers.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use tempfile::TempDir;

use inventory_abc::config::{parse_config, Config};
use inventory_abc::criteria_cmd::{check_failure_ratio, score_criterion};
use inventory_abc::sqlite_store::{NewReview, SqliteStore};
use inventory_abc::{db, migrate};
use inventory_abc_core::classify::{classify, AbcThresholds};
use inventory_abc_core::embedding::Embedder;
use inventory_abc_core::models::{
    ClassLabel, ContextSnippet, CriterionDefinition, CriterionSet, DataSource, WeightMap,
};
use inventory_abc_core::pipeline::{CriterionPipeline, FailureStage, PipelineOptions};
use inventory_abc_core::store::{CriterionScorer, FieldUpdate, ItemStore, Retriever};

struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Scores an item by how many snippets it was given.
struct CountingScorer;

#[async_trait]
impl CriterionScorer for CountingScorer {
    async fn score(&self, _definition: &str, context: &[ContextSnippet]) -> Result<serde_json::Value> {
        Ok(json!(context.len() as f64 / 10.0))
    }
}

async fn setup() -> (TempDir, Config, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let cfg = parse_config(&format!(
        "[db]\npath = \"{}\"\n",
        tmp.path().join("data").join("abc.sqlite").display()
    ))
    .unwrap();
    migrate::run_migrations(&cfg).await.unwrap();
    let store = SqliteStore::new(db::connect(&cfg).await.unwrap());
    (tmp, cfg, store)
}

async fn add_item(store: &SqliteStore, id: &str, annual_value: f64) {
    let values: BTreeMap<String, f64> = [("annualValue".to_string(), annual_value)].into();
    store.upsert_item(id, None, &values).await.unwrap();
}

async fn add_review(store: &SqliteStore, id: &str, product_id: &str, message: &str) {
    store
        .upsert_review(&NewReview {
            id: id.to_string(),
            product_id: product_id.to_string(),
            title: None,
            message: message.to_string(),
            rating: None,
        })
        .await
        .unwrap();
}

/// Embed every pending review with a fixed vector.
async fn embed_all(store: &SqliteStore, vector: &[f32]) {
    for review in store.find_pending_reviews("stub", None).await.unwrap() {
        store
            .upsert_review_vector(&review, "stub", vector)
            .await
            .unwrap();
    }
}

fn risk_definition() -> CriterionDefinition {
    CriterionDefinition {
        name: "Supplier Risk".to_string(),
        field_key: "supplierRisk".to_string(),
        definition: "1 = high risk, 0.01 = low risk".to_string(),
        data_sources: vec![DataSource::Reviews],
    }
}

#[tokio::test]
async fn test_pipeline_scores_items_with_context_and_skips_the_rest() {
    let (_tmp, _cfg, store) = setup().await;

    for i in 0..10 {
        add_item(&store, &format!("p{}", i), i as f64).await;
    }
    // p9 gets no reviews
    for i in 0..9 {
        add_review(&store, &format!("r{}a", i), &format!("p{}", i), "late delivery").await;
        add_review(&store, &format!("r{}b", i), &format!("p{}", i), "supplier went quiet").await;
    }
    embed_all(&store, &[1.0, 0.0]).await;

    let pipeline = CriterionPipeline::new(&store, &StubEmbedder, &store, &CountingScorer)
        .with_options(PipelineOptions {
            top_k: 5,
            candidate_pool: 50,
            max_in_flight: 4,
        });
    let report = pipeline.run(&risk_definition()).await.unwrap();

    assert_eq!(report.targets, 10);
    assert_eq!(report.succeeded.len(), 9);
    assert_eq!(report.committed, 9);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].product_id, "p9");
    assert_eq!(report.failed[0].stage, FailureStage::NoContext);

    let items = store.load_items().await.unwrap();
    for item in &items {
        let score = item.values.get("supplierRisk").copied();
        if item.product_id == "p9" {
            assert_eq!(score, None);
        } else {
            assert_eq!(score, Some(0.2), "{}", item.product_id);
        }
        // Existing criteria are untouched
        assert!(item.values.contains_key("annualValue"));
    }
}

#[tokio::test]
async fn test_scored_criterion_feeds_classification() {
    let (_tmp, _cfg, store) = setup().await;

    add_item(&store, "p1", 10.0).await;
    add_item(&store, "p2", 10.0).await;
    store
        .bulk_set_field(&[
            FieldUpdate {
                product_id: "p1".into(),
                field_key: "supplierRisk".into(),
                value: 0.9,
            },
            FieldUpdate {
                product_id: "p2".into(),
                field_key: "supplierRisk".into(),
                value: 0.1,
            },
        ])
        .await
        .unwrap();

    let items = store.load_items().await.unwrap();
    let criteria = CriterionSet::new(["annualValue", "supplierRisk"]).unwrap();
    let weights = WeightMap::uniform(&criteria);
    let run = classify(&items, &criteria, &weights, &AbcThresholds::default()).unwrap();

    assert_eq!(run.items[0].product_id, "p1");
    assert!(run.items[0].weighted_score > run.items[1].weighted_score);
    assert!(run.items.iter().all(|i| i.class == ClassLabel::C || i.rank == 1));

    store.save_snapshot(&run).await.unwrap();
    let snapshot = store.load_snapshot().await.unwrap();
    assert_eq!(snapshot, run.classification());
}

#[tokio::test]
async fn test_bulk_set_field_unknown_item_writes_nothing() {
    let (_tmp, _cfg, store) = setup().await;
    add_item(&store, "p1", 1.0).await;

    let result = store
        .bulk_set_field(&[
            FieldUpdate {
                product_id: "p1".into(),
                field_key: "supplierRisk".into(),
                value: 0.5,
            },
            FieldUpdate {
                product_id: "ghost".into(),
                field_key: "supplierRisk".into(),
                value: 0.5,
            },
        ])
        .await;
    assert!(result.is_err());

    let items = store.load_items().await.unwrap();
    assert!(!items[0].values.contains_key("supplierRisk"));
}

#[tokio::test]
async fn test_retriever_orders_by_similarity_and_scopes_to_item() {
    let (_tmp, _cfg, store) = setup().await;
    add_item(&store, "p1", 1.0).await;
    add_item(&store, "p2", 1.0).await;

    add_review(&store, "near", "p1", "close match").await;
    embed_all(&store, &[1.0, 0.0]).await;
    add_review(&store, "far", "p1", "unrelated").await;
    embed_all(&store, &[0.0, 1.0]).await;
    add_review(&store, "other", "p2", "other item").await;
    embed_all(&store, &[1.0, 0.0]).await;

    let hits = store.top_k(&[1.0, 0.0], "p1", 5, 50).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].text, "close match");
    assert!(hits[0].relevance > hits[1].relevance);
    assert!(hits.iter().all(|h| h.product_id == "p1"));

    let one = store.top_k(&[1.0, 0.0], "p1", 1, 50).await.unwrap();
    assert_eq!(one.len(), 1);
}

#[tokio::test]
async fn test_changed_review_becomes_pending() {
    let (_tmp, _cfg, store) = setup().await;
    add_item(&store, "p1", 1.0).await;
    add_review(&store, "r1", "p1", "first text").await;
    embed_all(&store, &[1.0, 0.0]).await;

    assert!(store.find_pending_reviews("stub", None).await.unwrap().is_empty());

    add_review(&store, "r1", "p1", "edited text").await;
    let pending = store.find_pending_reviews("stub", None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].text, "edited text");

    // A different model has no vectors at all
    assert_eq!(store.find_pending_reviews("other", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_moved_review_follows_its_new_item() {
    let (_tmp, _cfg, store) = setup().await;
    add_item(&store, "p1", 1.0).await;
    add_item(&store, "p2", 1.0).await;
    add_review(&store, "r1", "p1", "pump seized").await;
    embed_all(&store, &[1.0, 0.0]).await;

    add_review(&store, "r1", "p2", "pump seized").await;

    // Same text, so the existing vector is still valid
    assert!(store.find_pending_reviews("stub", None).await.unwrap().is_empty());

    let old_owner = store.top_k(&[1.0, 0.0], "p1", 5, 50).await.unwrap();
    assert!(old_owner.is_empty());

    let new_owner = store.top_k(&[1.0, 0.0], "p2", 5, 50).await.unwrap();
    assert_eq!(new_owner.len(), 1);
    assert_eq!(new_owner[0].text, "pump seized");
    assert_eq!(new_owner[0].product_id, "p2");
}

#[tokio::test]
async fn test_stale_vector_is_not_retrieved() {
    let (_tmp, _cfg, store) = setup().await;
    add_item(&store, "p1", 1.0).await;
    add_review(&store, "r1", "p1", "first text").await;
    embed_all(&store, &[1.0, 0.0]).await;

    add_review(&store, "r1", "p1", "edited text").await;
    assert!(store.top_k(&[1.0, 0.0], "p1", 5, 50).await.unwrap().is_empty());

    embed_all(&store, &[1.0, 0.0]).await;
    let hits = store.top_k(&[1.0, 0.0], "p1", 5, 50).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "edited text");
}

#[tokio::test]
async fn test_score_criterion_inline_definition_is_registered() {
    let (_tmp, cfg, store) = setup().await;
    add_item(&store, "p1", 1.0).await;
    add_review(&store, "r1", "p1", "late again").await;
    embed_all(&store, &[1.0, 0.0]).await;

    assert_eq!(store.get_criterion("leadTimeRisk").await.unwrap(), None);

    let report = score_criterion(
        &store,
        &StubEmbedder,
        &CountingScorer,
        "leadTimeRisk",
        Some("1 = always late, 0.01 = always on time"),
        &cfg,
    )
    .await
    .unwrap();
    assert_eq!(report.committed, 1);

    let registered = store.get_criterion("leadTimeRisk").await.unwrap().unwrap();
    assert_eq!(registered.name, "leadTimeRisk");
    assert_eq!(registered.definition, "1 = always late, 0.01 = always on time");
}

#[tokio::test]
async fn test_score_criterion_inline_text_keeps_registered_name() {
    let (_tmp, cfg, store) = setup().await;
    add_item(&store, "p1", 1.0).await;
    add_review(&store, "r1", "p1", "late again").await;
    embed_all(&store, &[1.0, 0.0]).await;
    store.register_criterion(&risk_definition()).await.unwrap();

    score_criterion(
        &store,
        &StubEmbedder,
        &CountingScorer,
        "supplierRisk",
        Some("revised scale"),
        &cfg,
    )
    .await
    .unwrap();

    let registered = store.get_criterion("supplierRisk").await.unwrap().unwrap();
    assert_eq!(registered.name, "Supplier Risk");
    assert_eq!(registered.data_sources, vec![DataSource::Reviews]);
    assert_eq!(registered.definition, "revised scale");
}

#[tokio::test]
async fn test_score_criterion_uses_registered_definition() {
    let (_tmp, cfg, store) = setup().await;
    add_item(&store, "p1", 1.0).await;
    add_review(&store, "r1", "p1", "supplier went quiet").await;
    embed_all(&store, &[1.0, 0.0]).await;
    store.register_criterion(&risk_definition()).await.unwrap();

    let report = score_criterion(&store, &StubEmbedder, &CountingScorer, "supplierRisk", None, &cfg)
        .await
        .unwrap();

    assert_eq!(report.field_key, "supplierRisk");
    let items = store.load_items().await.unwrap();
    assert_eq!(items[0].values.get("supplierRisk").copied(), Some(0.1));
}

#[tokio::test]
async fn test_score_criterion_without_registration_fails() {
    let (_tmp, cfg, store) = setup().await;
    add_item(&store, "p1", 1.0).await;

    let err = score_criterion(&store, &StubEmbedder, &CountingScorer, "unknownKey", None, &cfg)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("No registered criterion 'unknownKey'"));
    assert_eq!(store.get_criterion("unknownKey").await.unwrap(), None);
    assert!(store.load_items().await.unwrap()[0].values.get("unknownKey").is_none());
}

#[tokio::test]
async fn test_failure_ratio_over_limit_errors_after_commit() {
    let (_tmp, mut cfg, store) = setup().await;
    for id in ["p1", "p2", "p3", "p4"] {
        add_item(&store, id, 1.0).await;
    }
    // Only p1 has context, so three of four items fail
    add_review(&store, "r1", "p1", "pump seized").await;
    embed_all(&store, &[1.0, 0.0]).await;
    cfg.pipeline.max_failure_ratio = 0.5;

    let report = score_criterion(
        &store,
        &StubEmbedder,
        &CountingScorer,
        "supplierRisk",
        Some("1 = high risk"),
        &cfg,
    )
    .await
    .unwrap();
    assert_eq!(report.failed.len(), 3);

    let err = check_failure_ratio(&report, cfg.pipeline.max_failure_ratio).unwrap_err();
    assert!(err.to_string().contains("3 of 4 items failed"));

    // The successful value is stored regardless
    let items = store.load_items().await.unwrap();
    let p1 = items.iter().find(|i| i.product_id == "p1").unwrap();
    assert_eq!(p1.values.get("supplierRisk").copied(), Some(0.1));
    assert!(store.get_criterion("supplierRisk").await.unwrap().is_some());

    assert!(check_failure_ratio(&report, 0.75).is_ok());
}

#[tokio::test]
async fn test_criterion_registry_roundtrip_and_coverage() {
    let (_tmp, _cfg, store) = setup().await;
    add_item(&store, "p1", 1.0).await;
    add_item(&store, "p2", 2.0).await;

    let definition = risk_definition();
    store.register_criterion(&definition).await.unwrap();
    assert_eq!(
        store.get_criterion("supplierRisk").await.unwrap(),
        Some(definition.clone())
    );
    assert_eq!(store.get_criterion("missing").await.unwrap(), None);

    store
        .bulk_set_field(&[FieldUpdate {
            product_id: "p1".into(),
            field_key: "supplierRisk".into(),
            value: 0.3,
        }])
        .await
        .unwrap();

    let records = store.list_criteria().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].coverage, 1);

    // Re-registering updates in place
    let mut revised = definition;
    revised.definition = "revised scale".to_string();
    store.register_criterion(&revised).await.unwrap();
    let records = store.list_criteria().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].definition.definition, "revised scale");
}
