//! Min-max rescaling of raw criterion values to `[0, 1]`.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{CriterionSet, Item};

/// Per-item normalized criterion values. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedItem {
    pub product_id: String,
    pub values: BTreeMap<String, f64>,
}

impl NormalizedItem {
    pub fn value(&self, criterion: &str) -> f64 {
        self.values.get(criterion).copied().unwrap_or(0.0)
    }
}

/// Observed range of one criterion across all items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    /// `(v - min) / (max - min)`; 0 for a zero-width range.
    pub fn rescale(&self, v: f64) -> f64 {
        let span = self.max - self.min;
        if span == 0.0 || !span.is_finite() {
            0.0
        } else {
            (v - self.min) / span
        }
    }
}

/// Min and max of every criterion, with missing values read as 0.
pub fn criterion_ranges(items: &[Item], criteria: &CriterionSet) -> BTreeMap<String, Range> {
    criteria
        .iter()
        .map(|c| {
            let (min, max) = items.iter().map(|item| item.value(c)).fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), v| (lo.min(v), hi.max(v)),
            );
            (c.to_string(), Range { min, max })
        })
        .collect()
}

/// Rescale every item's criteria to `[0, 1]` relative to the other items.
///
/// A criterion with zero variance (including the single-item case)
/// normalizes to 0 for every item. Input items are not modified.
pub fn normalize(items: &[Item], criteria: &CriterionSet) -> Vec<NormalizedItem> {
    let ranges = criterion_ranges(items, criteria);

    items
        .iter()
        .map(|item| NormalizedItem {
            product_id: item.product_id.clone(),
            values: ranges
                .iter()
                .map(|(c, range)| (c.clone(), range.rescale(item.value(c))))
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<Item> {
        vec![
            Item::new("p1").with_value("cost", 10.0).with_value("risk", 3.0),
            Item::new("p2").with_value("cost", 5.0).with_value("risk", 3.0),
            Item::new("p3").with_value("cost", 0.0).with_value("risk", 3.0),
        ]
    }

    #[test]
    fn test_normalize_min_max() {
        let criteria = CriterionSet::new(["cost"]).unwrap();
        let norm = normalize(&items(), &criteria);
        assert!((norm[0].value("cost") - 1.0).abs() < 1e-12);
        assert!((norm[1].value("cost") - 0.5).abs() < 1e-12);
        assert!((norm[2].value("cost") - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_zero_variance_is_zero() {
        let criteria = CriterionSet::new(["risk"]).unwrap();
        let norm = normalize(&items(), &criteria);
        for n in &norm {
            assert_eq!(n.value("risk"), 0.0);
        }
    }

    #[test]
    fn test_normalize_single_item() {
        let criteria = CriterionSet::new(["cost"]).unwrap();
        let norm = normalize(&[Item::new("solo").with_value("cost", 42.0)], &criteria);
        assert_eq!(norm.len(), 1);
        assert_eq!(norm[0].value("cost"), 0.0);
    }

    #[test]
    fn test_missing_values_count_as_zero() {
        let criteria = CriterionSet::new(["cost"]).unwrap();
        let data = vec![
            Item::new("p1").with_value("cost", 8.0),
            Item::new("p2"),
            Item::new("p3").with_value("cost", 4.0),
        ];
        let norm = normalize(&data, &criteria);
        assert_eq!(norm[1].value("cost"), 0.0);
        assert!((norm[2].value("cost") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_negative_values_stay_in_unit() {
        let criteria = CriterionSet::new(["margin"]).unwrap();
        let data = vec![
            Item::new("p1").with_value("margin", -5.0),
            Item::new("p2").with_value("margin", 100.0),
            Item::new("p3").with_value("margin", 42.0),
        ];
        for n in normalize(&data, &criteria) {
            let v = n.value("margin");
            assert!((0.0..=1.0).contains(&v), "out of range: {}", v);
        }
    }

    #[test]
    fn test_normalize_keeps_raw_values() {
        let criteria = CriterionSet::new(["cost"]).unwrap();
        let data = items();
        let before = data.clone();
        let _ = normalize(&data, &criteria);
        assert_eq!(data, before);
    }

    #[test]
    fn test_normalize_empty_input() {
        let criteria = CriterionSet::new(["cost"]).unwrap();
        assert!(normalize(&[], &criteria).is_empty());
    }
}
