//! # Inventory ABC
//!
//! Multi-criteria ABC inventory classification with LLM-derived criteria.
//!
//! Items carry numeric criterion values. New qualitative criteria are
//! drafted from a prompt, then scored per item by a generative model that
//! reads the item's most relevant reviews. Classification normalizes every
//! criterion, combines them with weights, and assigns A/B/C classes by
//! cumulative score share.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ JSON import │──▶│    SQLite    │◀──│ embed cmd   │
//! │ items/revs  │   │ items+vectors│   │ (reviews)   │
//! └─────────────┘   └──────┬───────┘   └─────────────┘
//!                          │
//!          ┌───────────────┼────────────────┐
//!          ▼                                ▼
//!   ┌──────────────┐                 ┌──────────────┐
//!   │ criteria     │  retrieve+score │  classify    │
//!   │ score (LLM)  │────writes──────▶│  A / B / C   │
//!   └──────────────┘                 └──────────────┘
//! ```
//!
//! The engine itself lives in `inventory-abc-core`; this crate wires it to
//! SQLite, OpenAI-compatible providers, and the `abc` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite item store and review retriever |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Criterion scorer and generator clients |
//! | [`import`] | JSON import of items and reviews |
//! | [`embed_cmd`] | Review embedding backfill |
//! | [`criteria_cmd`] | `abc criteria` commands |
//! | [`classify_cmd`] | `abc classify` command |
//! | [`stats`] | Database statistics |

pub mod classify_cmd;
pub mod config;
pub mod criteria_cmd;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod import;
pub mod llm;
pub mod migrate;
pub mod sqlite_store;
pub mod stats;
