//! `abc classify`: rank stored items and assign A/B/C classes.
//!
//! Loads every item, builds the criterion set and weights from the command
//! line, runs the classification, and reports each item's movement against
//! the snapshot of the previous run. The snapshot is then replaced unless
//! `--no-save` is given.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use inventory_abc_core::classify::{classify, ClassificationRun};
use inventory_abc_core::models::{ClassLabel, Classification, CriterionSet, WeightMap};
use inventory_abc_core::store::ItemStore;
use inventory_abc_core::trend::{compare, Trend};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// One output row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRow {
    pub rank: usize,
    pub product_id: String,
    pub score: f64,
    pub cumulative_share: Option<f64>,
    pub class: ClassLabel,
    /// `None` when the item was not in the previous run.
    pub trend: Option<Trend>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyReport {
    pub criteria: Vec<String>,
    pub weights: WeightMap,
    pub total_score: f64,
    pub counts: BTreeMap<ClassLabel, usize>,
    pub items: Vec<ClassifyRow>,
}

/// Parse a `name=value` weight override.
pub fn parse_weight(raw: &str) -> Result<(String, f64)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Invalid weight '{}': expected name=value", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid weight '{}': missing criterion name", raw);
    }
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid weight '{}': value is not a number", raw))?;
    Ok((name.to_string(), value))
}

/// Split a comma-separated criteria list, dropping empty entries.
pub fn parse_criteria_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Attach trends from `previous` to `run`.
pub fn build_report(run: &ClassificationRun, previous: &Classification) -> ClassifyReport {
    let trends = compare(previous, &run.classification());
    let items = run
        .items
        .iter()
        .map(|i| ClassifyRow {
            rank: i.rank,
            product_id: i.product_id.clone(),
            score: i.weighted_score,
            cumulative_share: i.cumulative_share,
            class: i.class,
            trend: trends.get(&i.product_id).copied(),
        })
        .collect();

    ClassifyReport {
        criteria: run.criteria.clone(),
        weights: run.weights.clone(),
        total_score: run.total_score,
        counts: run.counts(),
        items,
    }
}

pub async fn run_classify(
    config: &Config,
    criteria: Option<&str>,
    weights: &[String],
    json: bool,
    no_save: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let known = store.criterion_names().await?;
    let names = match criteria {
        Some(raw) => {
            let names = parse_criteria_list(raw);
            if let Some(missing) = names.iter().find(|n| !known.contains(n)) {
                bail!(
                    "Unknown criterion '{}'. Known criteria: {}",
                    missing,
                    if known.is_empty() {
                        "(none)".to_string()
                    } else {
                        known.join(", ")
                    }
                );
            }
            names
        }
        None => known,
    };

    let criteria = CriterionSet::new(names)?;
    let overrides = weights
        .iter()
        .map(|w| parse_weight(w))
        .collect::<Result<Vec<_>>>()?;
    let weights = WeightMap::with_overrides(&criteria, overrides)?;

    let items = store.load_items().await?;
    let run = classify(&items, &criteria, &weights, &config.classification.thresholds())?;

    let previous = store.load_snapshot().await?;
    let report = build_report(&run, &previous);

    tracing::info!(
        items = report.items.len(),
        criteria = report.criteria.len(),
        total_score = report.total_score,
        "classification complete"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !no_save {
        store.save_snapshot(&run).await?;
    }

    store.pool().close().await;
    Ok(())
}

fn print_report(report: &ClassifyReport) {
    println!("classify");
    println!("  criteria: {}", report.criteria.join(", "));
    let weights: Vec<String> = report
        .weights
        .iter()
        .map(|(k, v)| format!("{}={:.3}", k, v))
        .collect();
    println!("  weights:  {}", weights.join(", "));
    println!("  total score: {:.4}", report.total_score);
    println!();

    if report.items.is_empty() {
        println!("  no items");
        return;
    }

    println!(
        "  {:>4}  {:<24} {:>12}  {:>7}  CLASS  TREND",
        "RANK", "PRODUCT", "SCORE", "CUM%"
    );
    for row in &report.items {
        let share = row
            .cumulative_share
            .map(|s| format!("{:.1}", s * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>4}  {:<24} {:>12.4}  {:>7}  {:<5}  {}",
            row.rank,
            row.product_id,
            row.score,
            share,
            row.class,
            row.trend.map(|t| t.arrow()).unwrap_or("new"),
        );
    }

    println!();
    let counts: Vec<String> = report
        .counts
        .iter()
        .map(|(class, n)| format!("{}: {}", class, n))
        .collect();
    println!("  {}", counts.join("  "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_abc_core::classify::AbcThresholds;
    use inventory_abc_core::models::Item;

    #[test]
    fn test_parse_weight() {
        assert_eq!(parse_weight("cost=0.5").unwrap(), ("cost".to_string(), 0.5));
        assert_eq!(parse_weight(" cost = 2 ").unwrap(), ("cost".to_string(), 2.0));
        assert!(parse_weight("cost").is_err());
        assert!(parse_weight("=1").is_err());
        assert!(parse_weight("cost=heavy").is_err());
    }

    #[test]
    fn test_parse_criteria_list() {
        assert_eq!(parse_criteria_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_criteria_list(" , ").is_empty());
    }

    #[test]
    fn test_build_report_trends() {
        let items = vec![
            Item::new("p1").with_value("v", 50.0),
            Item::new("p2").with_value("v", 30.0),
            Item::new("p3").with_value("v", 20.0),
            Item::new("p4").with_value("v", 0.0),
        ];
        let criteria = CriterionSet::new(["v"]).unwrap();
        let weights = WeightMap::uniform(&criteria);
        let run = classify(&items, &criteria, &weights, &AbcThresholds::default()).unwrap();

        let previous: Classification = [
            ("p1".to_string(), ClassLabel::B),
            ("p2".to_string(), ClassLabel::B),
            ("p3".to_string(), ClassLabel::A),
        ]
        .into_iter()
        .collect();

        let report = build_report(&run, &previous);
        let trend_of = |id: &str| {
            report
                .items
                .iter()
                .find(|r| r.product_id == id)
                .and_then(|r| r.trend)
        };
        assert_eq!(report.items[0].product_id, "p1");
        assert_eq!(trend_of("p1"), Some(Trend::Up));
        assert_eq!(trend_of("p3"), Some(Trend::Down));
        assert_eq!(trend_of("p4"), None);
        assert_eq!(report.items.len(), 4);
    }
}
