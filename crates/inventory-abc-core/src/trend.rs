//! Per-item movement between two classification runs.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::models::Classification;

/// Direction an item moved relative to the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// Moved toward `A`.
    Up,
    /// Moved toward `C`.
    Down,
    Same,
}

impl Trend {
    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Up => "↑",
            Trend::Down => "↓",
            Trend::Same => "=",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Same => "same",
        })
    }
}

/// Compare `current` against `previous`.
///
/// Only items present in both runs get an entry.
pub fn compare(previous: &Classification, current: &Classification) -> BTreeMap<String, Trend> {
    current
        .iter()
        .filter_map(|(product_id, now)| {
            let before = previous.get(product_id)?;
            let trend = match now.cmp(before) {
                Ordering::Equal => Trend::Same,
                Ordering::Less => Trend::Up,
                Ordering::Greater => Trend::Down,
            };
            Some((product_id.clone(), trend))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassLabel;

    fn classes(entries: &[(&str, ClassLabel)]) -> Classification {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_improvement_and_absent() {
        let previous = classes(&[("p1", ClassLabel::B)]);
        let current = classes(&[("p1", ClassLabel::A), ("p2", ClassLabel::C)]);
        let trend = compare(&previous, &current);
        assert_eq!(trend.get("p1"), Some(&Trend::Up));
        assert!(!trend.contains_key("p2"));
    }

    #[test]
    fn test_decline_and_same() {
        let previous = classes(&[("p1", ClassLabel::A), ("p2", ClassLabel::B)]);
        let current = classes(&[("p1", ClassLabel::C), ("p2", ClassLabel::B)]);
        let trend = compare(&previous, &current);
        assert_eq!(trend["p1"], Trend::Down);
        assert_eq!(trend["p2"], Trend::Same);
    }

    #[test]
    fn test_empty_previous() {
        let current = classes(&[("p1", ClassLabel::A)]);
        assert!(compare(&Classification::new(), &current).is_empty());
    }

    #[test]
    fn test_items_dropped_from_current_are_ignored() {
        let previous = classes(&[("gone", ClassLabel::A)]);
        let current = classes(&[("p1", ClassLabel::A)]);
        assert!(compare(&previous, &current).is_empty());
    }
}
