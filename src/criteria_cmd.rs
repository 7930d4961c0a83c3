//! `abc criteria`: generate, score, and list criteria.
//!
//! | Command | Action |
//! |---------|--------|
//! | `define` | Draft a criterion from a prompt; optionally register it |
//! | `score` | Score every item for one criterion and store the values |
//! | `list` | Show registered criteria with value coverage |

use anyhow::{bail, Context, Result};

use inventory_abc_core::embedding::Embedder;
use inventory_abc_core::models::{field_key_from_name, validate_prompt, CriterionDefinition};
use inventory_abc_core::pipeline::{CriterionPipeline, ScoringReport};
use inventory_abc_core::store::CriterionScorer;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::llm;
use crate::sqlite_store::SqliteStore;

pub async fn run_criteria_define(
    config: &Config,
    prompt: &str,
    json: bool,
    save: bool,
    field_key: Option<&str>,
) -> Result<()> {
    validate_prompt(prompt)?;
    if !config.llm.is_enabled() {
        bail!("LLM provider is disabled. Set [llm] provider in config.");
    }

    let generator = llm::create_generator(&config.llm)?;
    let generated = generator
        .generate(prompt)
        .await
        .context("Criterion generation failed")?;

    let mut definition = CriterionDefinition::from_generated(generated);
    if let Some(key) = field_key {
        definition.field_key = key.to_string();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&definition)?);
    } else {
        print_definition(&definition);
    }

    if save {
        definition.validate()?;
        let pool = db::connect(config).await?;
        let store = SqliteStore::new(pool);
        store.register_criterion(&definition).await?;
        if !json {
            println!();
            println!("  registered: {}", definition.field_key);
        }
        store.pool().close().await;
    }

    Ok(())
}

pub async fn run_criteria_score(
    config: &Config,
    field_key: &str,
    definition: Option<&str>,
    json: bool,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    if !config.llm.is_enabled() {
        bail!("LLM provider is disabled. Set [llm] provider in config.");
    }

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let embedder = embedding::create_embedder(&config.embedding)?;
    let scorer = llm::create_scorer(&config.llm)?;

    let report = score_criterion(
        &store,
        embedder.as_ref(),
        scorer.as_ref(),
        field_key,
        definition,
        config,
    )
    .await;
    store.pool().close().await;
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    check_failure_ratio(&report, config.pipeline.max_failure_ratio)
}

/// Resolve and validate the definition, score every item, then register
/// the definition that produced the stored values.
pub async fn score_criterion(
    store: &SqliteStore,
    embedder: &dyn Embedder,
    scorer: &dyn CriterionScorer,
    field_key: &str,
    inline: Option<&str>,
    config: &Config,
) -> Result<ScoringReport> {
    let definition = resolve_definition(store, field_key, inline).await?;
    definition.validate()?;

    let report = CriterionPipeline::new(store, embedder, store, scorer)
        .with_options(config.pipeline_options())
        .run(&definition)
        .await?;

    store.register_criterion(&definition).await?;
    Ok(report)
}

/// Fail when more than `max_ratio` of the targeted items failed.
///
/// Runs after the commit, so successful values stay stored either way.
pub fn check_failure_ratio(report: &ScoringReport, max_ratio: f64) -> Result<()> {
    let ratio = report.failure_ratio();
    if ratio > max_ratio {
        bail!(
            "{} of {} items failed ({:.0}%), above pipeline.max_failure_ratio = {}",
            report.failed.len(),
            report.targets,
            ratio * 100.0,
            max_ratio
        );
    }
    Ok(())
}

/// Use the inline definition if given, else the registered one.
pub async fn resolve_definition(
    store: &SqliteStore,
    field_key: &str,
    inline: Option<&str>,
) -> Result<CriterionDefinition> {
    if let Some(text) = inline {
        let existing = store.get_criterion(field_key).await?;
        return Ok(CriterionDefinition {
            name: existing
                .as_ref()
                .map(|d| d.name.clone())
                .unwrap_or_else(|| field_key.to_string()),
            field_key: field_key.to_string(),
            definition: text.to_string(),
            data_sources: existing.map(|d| d.data_sources).unwrap_or_default(),
        });
    }

    match store.get_criterion(field_key).await? {
        Some(d) => Ok(d),
        None => bail!(
            "No registered criterion '{}'. Pass --definition or run `abc criteria define --save` first.",
            field_key
        ),
    }
}

pub async fn run_criteria_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let records = store.list_criteria().await?;
    let total_items = store.item_count().await?;

    if records.is_empty() {
        println!("No criteria registered.");
    } else {
        println!("{:<24} {:<28} {:>10}  SOURCES", "FIELD KEY", "NAME", "COVERAGE");
        for r in &records {
            let sources: Vec<&str> = r.definition.data_sources.iter().map(|s| s.as_str()).collect();
            println!(
                "{:<24} {:<28} {:>10}  {}",
                r.definition.field_key,
                truncate(&r.definition.name, 28),
                format!("{}/{}", r.coverage, total_items),
                if sources.is_empty() {
                    "-".to_string()
                } else {
                    sources.join(",")
                }
            );
        }
    }

    store.pool().close().await;
    Ok(())
}

fn print_definition(definition: &CriterionDefinition) {
    let sources: Vec<&str> = definition.data_sources.iter().map(|s| s.as_str()).collect();
    println!("criteria define");
    println!("  name:      {}", definition.name);
    println!("  field key: {}", definition.field_key);
    if field_key_from_name(&definition.name) != definition.field_key {
        println!("  (derived:  {})", field_key_from_name(&definition.name));
    }
    println!("  sources:   {}", if sources.is_empty() { "-".to_string() } else { sources.join(", ") });
    println!();
    for line in definition.definition.lines() {
        println!("  {}", line);
    }
}

fn print_report(report: &ScoringReport) {
    println!("criteria score");
    println!("  field key: {}", report.field_key);
    println!("  targets:   {}", report.targets);
    println!("  scored:    {}", report.succeeded.len());
    println!("  failed:    {}", report.failed.len());
    println!("  committed: {}", report.committed);

    if !report.failed.is_empty() {
        println!();
        for f in &report.failed {
            println!("  ✗ {} [{}] {}", f.product_id, f.stage, f.reason);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long criterion name", 8), "a very …");
    }
}
