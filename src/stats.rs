//! Database statistics and health overview.
//!
//! Summarizes what is stored: item, criterion, and review counts, embedding
//! coverage, per-criterion value coverage, and the last classification run.
//! Used by `abc stats`.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Value coverage for one criterion.
struct CriterionStats {
    criterion: String,
    item_count: i64,
    registered: bool,
    last_update_ts: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
        .fetch_one(&pool)
        .await?;

    let total_reviews: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews")
        .fetch_one(&pool)
        .await?;

    let total_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review_vectors")
        .fetch_one(&pool)
        .await?;

    let total_registered: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM criteria")
        .fetch_one(&pool)
        .await?;

    let last_run: Option<i64> = sqlx::query_scalar("SELECT MAX(run_at) FROM classification_snapshot")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Inventory ABC Database Stats");
    println!("============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Items:       {}", total_items);
    println!("  Criteria:    {} registered", total_registered);
    println!("  Reviews:     {}", total_reviews);
    println!(
        "  Embedded:    {} / {} ({}%)",
        total_embedded,
        total_reviews,
        if total_reviews > 0 {
            (total_embedded * 100) / total_reviews
        } else {
            0
        }
    );
    println!(
        "  Last run:    {}",
        match last_run {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        }
    );

    // Per-criterion breakdown, including registered criteria with no values yet
    let rows = sqlx::query(
        r#"
        SELECT criterion, COUNT(*) AS item_count, MAX(updated_at) AS last_update
        FROM item_values
        GROUP BY criterion
        ORDER BY criterion
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let registered: Vec<String> = sqlx::query_scalar("SELECT field_key FROM criteria")
        .fetch_all(&pool)
        .await?;

    let mut criterion_stats: Vec<CriterionStats> = rows
        .iter()
        .map(|row| {
            let criterion: String = row.get("criterion");
            CriterionStats {
                registered: registered.contains(&criterion),
                criterion,
                item_count: row.get("item_count"),
                last_update_ts: row.get("last_update"),
            }
        })
        .collect();

    for key in &registered {
        if !criterion_stats.iter().any(|s| &s.criterion == key) {
            criterion_stats.push(CriterionStats {
                criterion: key.clone(),
                item_count: 0,
                registered: true,
                last_update_ts: None,
            });
        }
    }
    criterion_stats.sort_by(|a, b| a.criterion.cmp(&b.criterion));

    if !criterion_stats.is_empty() {
        println!();
        println!("  By criterion:");
        println!(
            "  {:<24} {:>10} {:>6}   {}",
            "CRITERION", "COVERAGE", "DEF", "LAST UPDATE"
        );
        println!("  {}", "-".repeat(64));

        for s in &criterion_stats {
            let update_display = match s.last_update_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<24} {:>10} {:>6}   {}",
                s.criterion,
                format!("{}/{}", s.item_count, total_items),
                if s.registered { "yes" } else { "-" },
                update_display
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
