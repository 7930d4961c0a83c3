//! Core data models used throughout Inventory ABC.
//!
//! These types represent the items, criteria, weights, and classification
//! results that flow through the classification path and the criterion
//! scoring pipeline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Field name reserved for the item identifier; never usable as a criterion key.
pub const RESERVED_FIELD_KEY: &str = "product_id";

/// An inventory item (SKU) with its dynamic criterion values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub product_id: String,
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

impl Item {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style helper for setting one criterion value.
    pub fn with_value(mut self, criterion: impl Into<String>, value: f64) -> Self {
        self.values.insert(criterion.into(), value);
        self
    }

    /// Raw value for `criterion`; a missing value reads as 0.
    pub fn value(&self, criterion: &str) -> f64 {
        self.values.get(criterion).copied().unwrap_or(0.0)
    }
}

/// ABC class label. Ordering follows the label text: `A < B < C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClassLabel {
    A,
    B,
    C,
}

impl ClassLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassLabel::A => "A",
            ClassLabel::B => "B",
            ClassLabel::C => "C",
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ClassLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "A" | "a" => Ok(ClassLabel::A),
            "B" | "b" => Ok(ClassLabel::B),
            "C" | "c" => Ok(ClassLabel::C),
            other => anyhow::bail!("unknown class label: '{}'", other),
        }
    }
}

/// `product_id → class` for one classification run.
pub type Classification = BTreeMap<String, ClassLabel>;

/// The non-empty set of criteria selected for a classification run.
///
/// Insertion order is kept for display only; membership is what matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriterionSet {
    names: Vec<String>,
}

impl CriterionSet {
    pub fn new<I, S>(names: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for name in names {
            let name: String = name.into();
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ValidationError::BlankCriterion);
            }
            if !seen.insert(name.clone()) {
                return Err(ValidationError::DuplicateCriterion { name });
            }
            out.push(name);
        }
        if out.is_empty() {
            return Err(ValidationError::EmptyCriterionSet);
        }
        Ok(Self { names: out })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always `false`; construction rejects empty sets.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.names
    }
}

/// Non-negative per-criterion weights.
///
/// Weights are not required to sum to 1. A criterion without an entry
/// contributes nothing to the weighted score.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WeightMap {
    weights: BTreeMap<String, f64>,
}

impl WeightMap {
    /// `1 / |criteria|` for every criterion.
    pub fn uniform(criteria: &CriterionSet) -> Self {
        let w = 1.0 / criteria.len() as f64;
        Self {
            weights: criteria.iter().map(|c| (c.to_string(), w)).collect(),
        }
    }

    /// Uniform defaults with the given overrides applied.
    ///
    /// Overrides must name criteria in `criteria` and be non-negative and finite.
    pub fn with_overrides<I, S>(criteria: &CriterionSet, overrides: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut map = Self::uniform(criteria);
        for (name, value) in overrides {
            let name: String = name.into();
            if !criteria.contains(&name) {
                return Err(ValidationError::UnknownWeight { name });
            }
            validate_weight(&name, value)?;
            map.weights.insert(name, value);
        }
        Ok(map)
    }

    /// Exactly the given entries, validated. Criteria left out weigh 0.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut weights = BTreeMap::new();
        for (name, value) in entries {
            let name: String = name.into();
            validate_weight(&name, value)?;
            weights.insert(name, value);
        }
        Ok(Self { weights })
    }

    pub fn get(&self, criterion: &str) -> Option<f64> {
        self.weights.get(criterion).copied()
    }

    /// Weight for `criterion`, 0 when absent.
    pub fn weight(&self, criterion: &str) -> f64 {
        self.get(criterion).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

fn validate_weight(name: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidWeight {
            name: name.to_string(),
            value,
        });
    }
    Ok(())
}

/// Source collections a criterion may draw evidence from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Reviews,
    Products,
}

impl DataSource {
    pub const ALL: [DataSource; 2] = [DataSource::Reviews, DataSource::Products];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Reviews => "reviews",
            DataSource::Products => "products",
        }
    }
}

impl FromStr for DataSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reviews" => Ok(DataSource::Reviews),
            "products" => Ok(DataSource::Products),
            other => anyhow::bail!(
                "unknown data source: '{}'. Must be reviews or products.",
                other
            ),
        }
    }
}

/// A natural-language scoring dimension plus where its evidence comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDefinition {
    pub name: String,
    /// Key under which scores are stored on every item.
    pub field_key: String,
    pub definition: String,
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
}

impl CriterionDefinition {
    /// Build a definition whose field key is derived from `name`.
    pub fn from_generated(generated: GeneratedCriterion) -> Self {
        let field_key = field_key_from_name(&generated.criteria_name);
        Self {
            name: generated.criteria_name,
            field_key,
            definition: generated.criteria_definition,
            data_sources: generated.data_sources,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_field_key(&self.field_key)?;
        if self.definition.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "definition",
            });
        }
        Ok(())
    }
}

/// Derive a storage key from a display name: whitespace removed, first
/// character lowercased (`"Supplier Risk"` → `"supplierRisk"`).
pub fn field_key_from_name(name: &str) -> String {
    let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    let mut chars = compact.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn validate_field_key(key: &str) -> Result<(), ValidationError> {
    if key.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "field_key" });
    }
    if key == RESERVED_FIELD_KEY || key == "productId" {
        return Err(ValidationError::InvalidFieldKey {
            key: key.to_string(),
            reason: "reserved for the item identifier",
        });
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::InvalidFieldKey {
            key: key.to_string(),
            reason: "only ASCII letters, digits, '_' and '-' are allowed",
        });
    }
    Ok(())
}

/// A criterion prompt must have some non-whitespace content.
pub fn validate_prompt(prompt: &str) -> Result<(), ValidationError> {
    if prompt.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "prompt" });
    }
    Ok(())
}

/// Structured output of the criterion generation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCriterion {
    pub criteria_name: String,
    pub criteria_definition: String,
    pub data_sources: Vec<DataSource>,
}

/// A retrieved text passage belonging to one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnippet {
    pub product_id: String,
    pub title: Option<String>,
    pub text: String,
    /// Similarity of the snippet to the query vector.
    pub relevance: f64,
}

impl ContextSnippet {
    /// Title and body joined for prompting.
    pub fn render(&self) -> String {
        match &self.title {
            Some(title) if !title.trim().is_empty() => format!("{}\n{}", title.trim(), self.text),
            _ => self.text.clone(),
        }
    }
}
