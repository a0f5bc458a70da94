//! CLI command implementations and terminal output.
//!
//! Each `run_*` function backs one subcommand: load whatever components the
//! command needs, do the work, print a human-readable summary (or JSON when
//! asked). These are the only places in the crate that print.

use anyhow::Result;
use std::sync::Arc;

use crate::agent::HttpToolAgent;
use crate::config::Config;
use crate::coordinator::{self, ScanCoordinator};
use crate::db;
use crate::models::{ResourceKind, ScanResult};
use crate::store::{RecordFilter, RecordStore};

async fn coordinator_from(config: &Config) -> Result<ScanCoordinator> {
    let agent = Arc::new(HttpToolAgent::new(&config.agent)?);
    Ok(coordinator::build_coordinator(config, agent).await?)
}

/// Run the scan command: execute a full session and print the outcome.
pub async fn run_scan(
    config: &Config,
    cluster: &str,
    static_only: bool,
    dynamic_only: bool,
    namespace: Option<&str>,
    json: bool,
) -> Result<()> {
    let include_static = !dynamic_only;
    let include_dynamic = !static_only;

    let coordinator = coordinator_from(config).await?;
    let result = coordinator
        .scan_cluster_full(cluster, include_static, include_dynamic, namespace)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_scan_summary(&result);
    }

    let requested = include_static as usize + include_dynamic as usize;
    let failed = [&result.static_tier, &result.dynamic_tier]
        .iter()
        .filter(|t| t.as_ref().map(|r| !r.success).unwrap_or(false))
        .count();
    if failed == requested {
        anyhow::bail!("scan failed for cluster '{}'", cluster);
    }

    Ok(())
}

fn print_scan_summary(result: &ScanResult) {
    println!("Scan of '{}'", result.cluster_name);
    println!("==========={}", "=".repeat(result.cluster_name.len() + 1));
    println!();
    println!("  Started:   {}", result.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Duration:  {}ms", result.duration_ms);
    println!();

    for (label, tier) in [
        ("Static", &result.static_tier),
        ("Dynamic", &result.dynamic_tier),
    ] {
        let Some(tier) = tier else {
            println!("  {:<8} skipped", format!("{}:", label));
            continue;
        };
        if tier.success {
            println!(
                "  {:<8} {} resources in {} attempt(s)",
                format!("{}:", label),
                tier.total(),
                tier.attempts
            );
        } else {
            println!(
                "  {:<8} FAILED after {} attempt(s)",
                format!("{}:", label),
                tier.attempts
            );
        }
    }

    println!();
    println!("  Resources: {}", result.statistics.total_resources);
    for (table, count) in &result.statistics.resource_breakdown {
        println!("    {:<14} {}", table, count);
    }

    if !result.errors.is_empty() {
        println!();
        println!("  Errors:");
        for error in &result.errors {
            println!("    - {}", error);
        }
    }
}

/// Run the list command: print cached records matching the filters.
pub async fn run_list(
    config: &Config,
    kind: Option<ResourceKind>,
    cluster: Option<String>,
    namespace: Option<String>,
    include_stale: bool,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = RecordStore::new(pool);

    let records = store
        .list(&RecordFilter {
            kind,
            cluster,
            namespace,
            include_stale,
            limit,
        })
        .await?;

    if json {
        let data: Vec<_> = records.iter().map(|r| &r.data).collect();
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No cached records match.");
        return Ok(());
    }

    println!(
        "{:<12} {:<16} {:<16} {:<32} {}",
        "KIND", "CLUSTER", "NAMESPACE", "NAME", "EXPIRES"
    );
    for record in &records {
        println!(
            "{:<12} {:<16} {:<16} {:<32} {}",
            record.kind,
            record.cluster_name,
            record.namespace.as_deref().unwrap_or("-"),
            record.name,
            record.ttl_expires_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
    println!("{} record(s)", records.len());

    Ok(())
}

/// Run the history command: print recent scan metadata for a cluster.
pub async fn run_history(config: &Config, cluster: &str, limit: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = RecordStore::new(pool);

    let history = store.list_metadata(cluster, limit).await?;
    if history.is_empty() {
        println!("No scan history for cluster '{}'.", cluster);
        return Ok(());
    }

    println!(
        "{:<14} {:<10} {:>8} {:>10}  {:<20} ERROR",
        "TIER", "STATUS", "RECORDS", "DURATION", "SCANNED AT"
    );
    for entry in &history {
        println!(
            "{:<14} {:<10} {:>8} {:>10}  {:<20} {}",
            entry.table_name,
            entry.scan_status,
            entry.record_count,
            entry
                .duration_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "-".to_string()),
            entry
                .last_scan_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            entry.error_message.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

/// Run the health command: component rollup with a process exit hint.
pub async fn run_health(config: &Config, json: bool) -> Result<()> {
    let coordinator = coordinator_from(config).await?;
    let report = coordinator.health_check().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Status: {}", report.status.as_str().to_uppercase());
        if report.issues.is_empty() {
            println!("No issues detected.");
        } else {
            for issue in &report.issues {
                println!("  - {}", issue);
            }
        }
        if let Some(store) = &report.store {
            println!();
            println!(
                "Cache: {} fresh / {} stale record(s)",
                store.total_fresh, store.total_stale
            );
        }
    }

    Ok(())
}

/// Run the cleanup command: sweep TTL-expired records from every kind.
pub async fn run_cleanup(config: &Config) -> Result<()> {
    let coordinator = coordinator_from(config).await?;
    let removed = coordinator.cleanup_expired_cache().await;

    let total: u64 = removed.values().sum();
    println!("Removed {} expired record(s)", total);
    for (table, count) in &removed {
        if *count > 0 {
            println!("  {:<14} {}", table, count);
        }
    }

    Ok(())
}

/// Run the stats command: cache contents and tool catalog overview.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = RecordStore::new(pool);
    let stats = store.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("kubecache — Cache Stats");
    println!("=======================");
    println!();
    println!("  Database:  {}", config.db.path.display());
    println!("  Size:      {}", format_bytes(db_size));
    println!();
    println!(
        "  Records:   {} fresh / {} stale",
        stats.total_fresh, stats.total_stale
    );
    for (table, kind_stats) in &stats.per_kind {
        println!(
            "    {:<14} {:>6} fresh {:>6} stale",
            table, kind_stats.fresh, kind_stats.stale
        );
    }

    let catalog = crate::catalog::ToolCatalog::with_overrides(&config.tools)?;
    println!();
    println!("  Tools:");
    for (kind, tool) in catalog.entries() {
        println!("    {:<14} {}", kind.table(), tool);
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_format() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
