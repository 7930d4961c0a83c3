//! TOML configuration parsing and validation.
//!
//! Every command reads one file (default `./config/abc.toml`). Only `[db]`
//! is required; the provider sections default to `provider = "disabled"`
//! and the tuning sections to the documented defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use inventory_abc_core::classify::AbcThresholds;
use inventory_abc_core::pipeline::PipelineOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Generative model used for criterion scoring and criterion generation.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_score_max_tokens")]
    pub score_max_tokens: u32,
    #[serde(default = "default_score_temperature")]
    pub score_temperature: f32,
    #[serde(default = "default_generate_max_tokens")]
    pub generate_max_tokens: u32,
    #[serde(default = "default_generate_temperature")]
    pub generate_temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout_secs(),
            score_max_tokens: default_score_max_tokens(),
            score_temperature: default_score_temperature(),
            generate_max_tokens: default_generate_max_tokens(),
            generate_temperature: default_generate_temperature(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_pool: default_candidate_pool(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Failure share above which `criteria score` exits non-zero.
    #[serde(default = "default_max_failure_ratio")]
    pub max_failure_ratio: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            max_failure_ratio: default_max_failure_ratio(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassificationConfig {
    #[serde(default = "default_a_threshold")]
    pub a_threshold: f64,
    #[serde(default = "default_b_threshold")]
    pub b_threshold: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            a_threshold: default_a_threshold(),
            b_threshold: default_b_threshold(),
        }
    }
}

impl ClassificationConfig {
    pub fn thresholds(&self) -> AbcThresholds {
        AbcThresholds {
            a: self.a_threshold,
            b: self.b_threshold,
        }
    }
}

impl Config {
    /// Options handed to the criterion scoring pipeline.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            top_k: self.retrieval.top_k,
            candidate_pool: self.retrieval.candidate_pool,
            max_in_flight: self.pipeline.max_in_flight,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_llm_retries() -> u32 {
    2
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_score_max_tokens() -> u32 {
    100
}
fn default_score_temperature() -> f32 {
    0.5
}
fn default_generate_max_tokens() -> u32 {
    1000
}
fn default_generate_temperature() -> f32 {
    0.7
}
fn default_top_k() -> usize {
    5
}
fn default_candidate_pool() -> usize {
    50
}
fn default_max_in_flight() -> usize {
    16
}
fn default_max_failure_ratio() -> f64 {
    1.0
}
fn default_a_threshold() -> f64 {
    0.60
}
fn default_b_threshold() -> f64 {
    0.85
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.candidate_pool < config.retrieval.top_k {
        anyhow::bail!("retrieval.candidate_pool must be >= retrieval.top_k");
    }

    // Validate pipeline
    if config.pipeline.max_in_flight == 0 {
        anyhow::bail!("pipeline.max_in_flight must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.pipeline.max_failure_ratio) {
        anyhow::bail!("pipeline.max_failure_ratio must be in [0.0, 1.0]");
    }

    // Validate classification
    config
        .classification
        .thresholds()
        .validate()
        .context("invalid [classification] thresholds")?;

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate llm
    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}
