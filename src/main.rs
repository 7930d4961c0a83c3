//! # Inventory ABC CLI (`abc`)
//!
//! The `abc` binary drives the whole workflow: database setup, data import,
//! review embedding, LLM-assisted criterion scoring, and multi-criteria ABC
//! classification.
//!
//! ## Usage
//!
//! ```bash
//! abc --config ./config/abc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `abc init` | Create the SQLite database and run schema migrations |
//! | `abc import items <file>` | Upsert items and their numeric criterion values |
//! | `abc import reviews <file>` | Insert reviews for existing items |
//! | `abc embed pending` | Embed reviews with missing or stale vectors |
//! | `abc embed rebuild` | Delete and regenerate all review vectors |
//! | `abc criteria define "<prompt>"` | Draft a criterion definition with the LLM |
//! | `abc criteria score --field-key <key>` | Score every item for one criterion |
//! | `abc criteria list` | List registered criteria |
//! | `abc classify` | Rank items and assign A/B/C classes |
//! | `abc stats` | Show database statistics |
//!
//! ## Examples
//!
//! ```bash
//! abc init
//! abc import items ./data/items.json
//! abc import reviews ./data/reviews.json
//! abc embed pending
//!
//! # Draft and register a new criterion, then score it
//! abc criteria define "how risky the supplier is, judging by complaints" --save
//! abc criteria score --field-key supplierRisk
//!
//! # Classify on two criteria, weighting cost double
//! abc classify --criteria annualValue,supplierRisk --weight annualValue=2
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use inventory_abc::{classify_cmd, config, criteria_cmd, embed_cmd, import, migrate, stats};

/// Inventory ABC: multi-criteria ABC inventory classification with
/// LLM-derived criteria.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/abc.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "abc",
    about = "Inventory ABC: multi-criteria ABC classification with LLM-derived criteria",
    version,
    long_about = "Inventory ABC stores items with numeric criteria, scores new qualitative \
    criteria per item with a generative model grounded on retrieved reviews, and ranks items \
    into A/B/C classes by their weighted, normalized score."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/abc.toml`.
    #[arg(long, global = true, default_value = "./config/abc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables.
    /// This command is idempotent.
    Init,

    /// Import items or reviews from a JSON file.
    Import {
        #[command(subcommand)]
        kind: ImportKind,
    },

    /// Manage review embeddings.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Generate, score, and list criteria.
    Criteria {
        #[command(subcommand)]
        action: CriteriaAction,
    },

    /// Classify items into A/B/C by weighted multi-criteria score.
    ///
    /// Prints one row per item in rank order with its movement since the
    /// previous run, then stores this run as the new baseline.
    Classify {
        /// Comma-separated criteria. Defaults to every criterion with stored values.
        #[arg(long)]
        criteria: Option<String>,

        /// Weight override as `name=value`. Repeatable. Unlisted criteria weigh 1/n.
        #[arg(long = "weight")]
        weights: Vec<String>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,

        /// Do not replace the stored baseline with this run.
        #[arg(long)]
        no_save: bool,
    },

    /// Show database statistics.
    Stats,
}

#[derive(Subcommand)]
enum ImportKind {
    /// Upsert items: `[{"productId": ..., "name"?: ..., "<criterion>": number}]`.
    Items {
        /// Path to the JSON file.
        file: PathBuf,
    },
    /// Insert reviews: `[{"id"?, "productId", "title"?, "message", "rating"?}]`.
    Reviews {
        /// Path to the JSON file.
        file: PathBuf,
    },
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed reviews that are missing vectors or whose text changed.
    Pending {
        /// Maximum number of reviews to embed.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the configured batch size.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show how many reviews need embedding without calling the provider.
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete all review vectors and embed everything again.
    Rebuild {
        /// Override the configured batch size.
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[derive(Subcommand)]
enum CriteriaAction {
    /// Draft a criterion definition from a natural-language prompt.
    Define {
        /// What the criterion should capture.
        prompt: String,

        /// Print the definition as JSON.
        #[arg(long)]
        json: bool,

        /// Register the definition.
        #[arg(long)]
        save: bool,

        /// Field key to store scores under. Defaults to the camelCased name.
        #[arg(long)]
        field_key: Option<String>,
    },
    /// Score every item for one criterion and store the values.
    ///
    /// Uses the registered definition unless `--definition` is given.
    Score {
        /// Item field that receives the scores.
        #[arg(long)]
        field_key: String,

        /// Scoring definition text.
        #[arg(long)]
        definition: Option<String>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List registered criteria and their value coverage.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { kind } => match kind {
            ImportKind::Items { file } => {
                import::run_import_items(&cfg, &file).await?;
            }
            ImportKind::Reviews { file } => {
                import::run_import_reviews(&cfg, &file).await?;
            }
        },
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(&cfg, limit, batch_size, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(&cfg, batch_size).await?;
            }
        },
        Commands::Criteria { action } => match action {
            CriteriaAction::Define {
                prompt,
                json,
                save,
                field_key,
            } => {
                criteria_cmd::run_criteria_define(&cfg, &prompt, json, save, field_key.as_deref())
                    .await?;
            }
            CriteriaAction::Score {
                field_key,
                definition,
                json,
            } => {
                criteria_cmd::run_criteria_score(&cfg, &field_key, definition.as_deref(), json)
                    .await?;
            }
            CriteriaAction::List => {
                criteria_cmd::run_criteria_list(&cfg).await?;
            }
        },
        Commands::Classify {
            criteria,
            weights,
            json,
            no_save,
        } => {
            classify_cmd::run_classify(&cfg, criteria.as_deref(), &weights, json, no_save).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
