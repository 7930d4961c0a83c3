//! ABC classification by cumulative share of the total weighted score.
//!
//! Items are ranked by weighted score (descending) and assigned a class
//! from the running share of the total:
//!
//! ```text
//! share ≤ a        → A   (default a = 0.60)
//! a < share ≤ b    → B   (default b = 0.85)
//! share > b        → C
//! ```
//!
//! When the total score is zero there is no meaningful share, and every
//! item is placed in the lowest tier, `C`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::models::{ClassLabel, Classification, CriterionSet, Item, WeightMap};
use crate::normalize::normalize;
use crate::weighting::{weighted_scores, ScoredItem};

/// Cumulative-share cut-offs for the A and B tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbcThresholds {
    pub a: f64,
    pub b: f64,
}

impl Default for AbcThresholds {
    fn default() -> Self {
        Self { a: 0.60, b: 0.85 }
    }
}

impl AbcThresholds {
    pub fn new(a: f64, b: f64) -> Result<Self, ValidationError> {
        let t = Self { a, b };
        t.validate()?;
        Ok(t)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let ok = self.a.is_finite()
            && self.b.is_finite()
            && self.a > 0.0
            && self.a <= self.b
            && self.b <= 1.0;
        if ok {
            Ok(())
        } else {
            Err(ValidationError::InvalidThresholds {
                a: self.a,
                b: self.b,
            })
        }
    }

    pub fn label(&self, share: f64) -> ClassLabel {
        if share <= self.a {
            ClassLabel::A
        } else if share <= self.b {
            ClassLabel::B
        } else {
            ClassLabel::C
        }
    }
}

/// Rank position and class for one scored item.
struct Ranked {
    index: usize,
    share: Option<f64>,
    class: ClassLabel,
}

fn rank(scored: &[ScoredItem], thresholds: &AbcThresholds) -> Vec<Ranked> {
    let mut order: Vec<usize> = (0..scored.len()).collect();
    // Stable: equal scores keep their input order.
    order.sort_by(|&i, &j| {
        scored[j]
            .weighted_score
            .partial_cmp(&scored[i].weighted_score)
            .unwrap_or(Ordering::Equal)
    });

    let total: f64 = scored.iter().map(|s| s.weighted_score).sum();
    let degenerate = !(total.is_finite() && total > 0.0);

    let mut cumulative = 0.0;
    order
        .into_iter()
        .map(|index| {
            if degenerate {
                return Ranked {
                    index,
                    share: None,
                    class: ClassLabel::C,
                };
            }
            cumulative += scored[index].weighted_score;
            let share = cumulative / total;
            Ranked {
                index,
                share: Some(share),
                class: thresholds.label(share),
            }
        })
        .collect()
}

/// Classify scored items into A/B/C. Pure; depends only on the current scores.
pub fn classify_abc(scored: &[ScoredItem], thresholds: &AbcThresholds) -> Classification {
    rank(scored, thresholds)
        .into_iter()
        .map(|r| (scored[r.index].item.product_id.clone(), r.class))
        .collect()
}

/// One row of a classification run, in rank order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedItem {
    pub rank: usize,
    pub product_id: String,
    pub values: BTreeMap<String, f64>,
    pub weighted_score: f64,
    /// `None` when the total score is zero.
    pub cumulative_share: Option<f64>,
    pub class: ClassLabel,
}

/// Result of the full normalize → weight → classify path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRun {
    pub criteria: Vec<String>,
    pub weights: WeightMap,
    pub total_score: f64,
    /// Items ranked by weighted score, highest first.
    pub items: Vec<ClassifiedItem>,
}

impl ClassificationRun {
    pub fn classification(&self) -> Classification {
        self.items
            .iter()
            .map(|i| (i.product_id.clone(), i.class))
            .collect()
    }

    /// Number of items per class, `A` first.
    pub fn counts(&self) -> BTreeMap<ClassLabel, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.class).or_insert(0) += 1;
        }
        counts
    }
}

/// Run the whole classification path over `items`.
///
/// Validates the thresholds, then normalizes, weights, and classifies.
/// The criterion set and weight map are validated on construction.
pub fn classify(
    items: &[Item],
    criteria: &CriterionSet,
    weights: &WeightMap,
    thresholds: &AbcThresholds,
) -> Result<ClassificationRun, ValidationError> {
    thresholds.validate()?;

    let normalized = normalize(items, criteria);
    let scored = weighted_scores(items, &normalized, weights, criteria);
    let total_score = scored.iter().map(|s| s.weighted_score).sum();

    let ranked = rank(&scored, thresholds);
    let items = ranked
        .into_iter()
        .enumerate()
        .map(|(pos, r)| {
            let s = &scored[r.index];
            ClassifiedItem {
                rank: pos + 1,
                product_id: s.item.product_id.clone(),
                values: s.item.values.clone(),
                weighted_score: s.weighted_score,
                cumulative_share: r.share,
                class: r.class,
            }
        })
        .collect();

    Ok(ClassificationRun {
        criteria: criteria.as_slice().to_vec(),
        weights: weights.clone(),
        total_score,
        items,
    })
}
