use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables if they do not exist. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Cached resource records, one row per (kind, cluster, namespace, name).
    // Namespace is '' for cluster-scoped kinds so the UNIQUE constraint holds.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            kind TEXT NOT NULL,
            cluster_name TEXT NOT NULL,
            namespace TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            ttl_expires_at INTEGER NOT NULL,
            UNIQUE(kind, cluster_name, namespace, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_resources_expiry ON resources(kind, ttl_expires_at)",
    )
    .execute(pool)
    .await?;

    // Append-only scan history, one row per tier status transition.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_metadata (
            id TEXT PRIMARY KEY,
            table_name TEXT NOT NULL,
            cluster_name TEXT NOT NULL,
            scan_status TEXT NOT NULL,
            record_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            last_scan_at INTEGER,
            next_scan_at INTEGER,
            duration_ms INTEGER,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scan_metadata_cluster ON scan_metadata(cluster_name, last_scan_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
