//! Weighted combination of normalized criteria into one score per item.

use serde::Serialize;
use std::collections::HashMap;

use crate::models::{CriterionSet, Item, WeightMap};
use crate::normalize::NormalizedItem;

/// An item together with its weighted score for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredItem {
    #[serde(flatten)]
    pub item: Item,
    pub weighted_score: f64,
}

/// `Σ normalized[c] × weight[c]` over the active criteria, per item.
///
/// Normalized rows are matched to items by `product_id`. A criterion with
/// no weight contributes 0. Scores are only comparable within one run
/// since weights are not required to sum to 1.
pub fn weighted_scores(
    items: &[Item],
    normalized: &[NormalizedItem],
    weights: &WeightMap,
    criteria: &CriterionSet,
) -> Vec<ScoredItem> {
    let by_id: HashMap<&str, &NormalizedItem> = normalized
        .iter()
        .map(|n| (n.product_id.as_str(), n))
        .collect();

    items
        .iter()
        .map(|item| {
            let weighted_score = by_id
                .get(item.product_id.as_str())
                .map(|n| {
                    criteria
                        .iter()
                        .map(|c| n.value(c) * weights.weight(c))
                        .sum()
                })
                .unwrap_or(0.0);
            ScoredItem {
                item: item.clone(),
                weighted_score,
            }
        })
        .collect()
}
