//! Typed record store over SQLite.
//!
//! Records live in a single `resources` table keyed by natural identity
//! `(kind, cluster, namespace, name)`; writing the same resource again
//! overwrites the previous row. Reads exclude records whose TTL has passed
//! unless explicitly asked for stale rows, so "cached" always means "fresh"
//! for consumers. Scan history goes to the append-only `scan_metadata`
//! table.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{ErrorContext, ScanError};
use crate::models::{CacheRecord, ResourceKind, ScanMetadata, ScanStatus};

/// Filters for [`RecordStore::list`]. Defaults select everything fresh.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub kind: Option<ResourceKind>,
    pub cluster: Option<String>,
    pub namespace: Option<String>,
    /// Include records past their TTL. Off by default.
    pub include_stale: bool,
    pub limit: Option<i64>,
}

/// A cached record as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub kind: ResourceKind,
    pub cluster_name: String,
    pub namespace: Option<String>,
    pub name: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub ttl_expires_at: DateTime<Utc>,
}

/// Fresh/stale counts for one resource kind.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct KindStats {
    pub fresh: u64,
    pub stale: u64,
}

/// Store-wide statistics for `kubecache stats` and health checks.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub per_kind: BTreeMap<String, KindStats>,
    pub total_fresh: u64,
    pub total_stale: u64,
}

#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert one record with the given expiry. The previous row for the
    /// same natural identity, if any, is overwritten.
    pub async fn create<R: CacheRecord>(
        &self,
        record: &R,
        ttl_expires_at: DateTime<Utc>,
    ) -> Result<(), ScanError> {
        let data = serde_json::to_string(record).map_err(|e| ScanError::Parse {
            message: format!("failed to serialize record: {}", e),
            context: ErrorContext::new("store_create").tool(record.kind().table()),
        })?;

        sqlx::query(
            r#"
            INSERT INTO resources (kind, cluster_name, namespace, name, data, created_at, ttl_expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, cluster_name, namespace, name) DO UPDATE SET
                data = excluded.data,
                created_at = excluded.created_at,
                ttl_expires_at = excluded.ttl_expires_at
            "#,
        )
        .bind(record.kind().table())
        .bind(record.cluster_name())
        .bind(record.namespace().unwrap_or(""))
        .bind(record.name())
        .bind(data)
        .bind(Utc::now().timestamp())
        .bind(ttl_expires_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List records matching the filter, newest first.
    pub async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, ScanError> {
        let mut sql = String::from(
            "SELECT kind, cluster_name, namespace, name, data, created_at, ttl_expires_at \
             FROM resources WHERE 1=1",
        );
        if filter.kind.is_some() {
            sql.push_str(" AND kind = ?");
        }
        if filter.cluster.is_some() {
            sql.push_str(" AND cluster_name = ?");
        }
        if filter.namespace.is_some() {
            sql.push_str(" AND namespace = ?");
        }
        if !filter.include_stale {
            sql.push_str(" AND ttl_expires_at > ?");
        }
        sql.push_str(" ORDER BY created_at DESC, kind, namespace, name");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(kind) = filter.kind {
            query = query.bind(kind.table());
        }
        if let Some(cluster) = &filter.cluster {
            query = query.bind(cluster);
        }
        if let Some(namespace) = &filter.namespace {
            query = query.bind(namespace);
        }
        if !filter.include_stale {
            query = query.bind(Utc::now().timestamp());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    /// Delete records for a kind, optionally scoped to one cluster.
    pub async fn delete(
        &self,
        kind: ResourceKind,
        cluster: Option<&str>,
    ) -> Result<u64, ScanError> {
        let result = match cluster {
            Some(cluster) => {
                sqlx::query("DELETE FROM resources WHERE kind = ? AND cluster_name = ?")
                    .bind(kind.table())
                    .bind(cluster)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM resources WHERE kind = ?")
                    .bind(kind.table())
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    /// Delete TTL-expired records of one kind, returning how many went.
    pub async fn cleanup_expired(&self, kind: ResourceKind) -> Result<u64, ScanError> {
        let result = sqlx::query("DELETE FROM resources WHERE kind = ? AND ttl_expires_at <= ?")
            .bind(kind.table())
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Fresh/stale counts per kind.
    pub async fn stats(&self) -> Result<StoreStats, ScanError> {
        let now = Utc::now().timestamp();
        let rows = sqlx::query(
            "SELECT kind, \
                    SUM(CASE WHEN ttl_expires_at > ? THEN 1 ELSE 0 END) AS fresh, \
                    SUM(CASE WHEN ttl_expires_at <= ? THEN 1 ELSE 0 END) AS stale \
             FROM resources GROUP BY kind",
        )
        .bind(now)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = StoreStats::default();
        for row in rows {
            let kind: String = row.get("kind");
            let fresh: i64 = row.get("fresh");
            let stale: i64 = row.get("stale");
            stats.total_fresh += fresh as u64;
            stats.total_stale += stale as u64;
            stats.per_kind.insert(
                kind,
                KindStats {
                    fresh: fresh as u64,
                    stale: stale as u64,
                },
            );
        }
        Ok(stats)
    }

    /// Append one scan-metadata row. History is never updated in place.
    pub async fn record_metadata(&self, meta: &ScanMetadata) -> Result<(), ScanError> {
        sqlx::query(
            r#"
            INSERT INTO scan_metadata
                (id, table_name, cluster_name, scan_status, record_count,
                 error_message, last_scan_at, next_scan_at, duration_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&meta.table_name)
        .bind(&meta.cluster_name)
        .bind(meta.scan_status.as_str())
        .bind(meta.record_count)
        .bind(&meta.error_message)
        .bind(meta.last_scan_at.map(|t| t.timestamp()))
        .bind(meta.next_scan_at.map(|t| t.timestamp()))
        .bind(meta.duration_ms)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent metadata rows for a cluster, newest first. Rows without
    /// a `last_scan_at` (pending/running) sort after finished ones.
    pub async fn list_metadata(
        &self,
        cluster: &str,
        limit: i64,
    ) -> Result<Vec<ScanMetadata>, ScanError> {
        let rows = sqlx::query(
            "SELECT table_name, cluster_name, scan_status, record_count, \
                    error_message, last_scan_at, next_scan_at, duration_ms \
             FROM scan_metadata WHERE cluster_name = ? \
             ORDER BY last_scan_at IS NULL, last_scan_at DESC, created_at DESC \
             LIMIT ?",
        )
        .bind(cluster)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut history = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.get("scan_status");
            history.push(ScanMetadata {
                table_name: row.get("table_name"),
                cluster_name: row.get("cluster_name"),
                scan_status: status.parse::<ScanStatus>().map_err(|e| {
                    ScanError::Parse {
                        message: e,
                        context: ErrorContext::new("list_metadata"),
                    }
                })?,
                record_count: row.get("record_count"),
                error_message: row.get("error_message"),
                last_scan_at: timestamp_opt(row.get("last_scan_at")),
                next_scan_at: timestamp_opt(row.get("next_scan_at")),
                duration_ms: row.get("duration_ms"),
            });
        }
        Ok(history)
    }
}

fn timestamp_opt(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<StoredRecord, ScanError> {
    let kind: String = row.get("kind");
    let kind = kind.parse::<ResourceKind>().map_err(|e| ScanError::Parse {
        message: e,
        context: ErrorContext::new("list_records"),
    })?;
    let data: String = row.get("data");
    let data = serde_json::from_str(&data).map_err(|e| ScanError::Parse {
        message: format!("stored record is not valid JSON: {}", e),
        context: ErrorContext::new("list_records").tool(kind.table()),
    })?;
    let namespace: String = row.get("namespace");

    Ok(StoredRecord {
        kind,
        cluster_name: row.get("cluster_name"),
        namespace: if namespace.is_empty() {
            None
        } else {
            Some(namespace)
        },
        name: row.get("name"),
        data,
        created_at: timestamp_opt(Some(row.get("created_at"))).unwrap_or_else(Utc::now),
        ttl_expires_at: timestamp_opt(Some(row.get("ttl_expires_at"))).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;
    use crate::models::{NamespaceRecord, PodRecord};
    use chrono::Duration;
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, RecordStore) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("kubecache.sqlite"))
            .await
            .unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        (tmp, RecordStore::new(pool))
    }

    fn namespace(cluster: &str, name: &str, status: &str) -> NamespaceRecord {
        NamespaceRecord {
            cluster_name: cluster.to_string(),
            name: name.to_string(),
            status: status.to_string(),
            labels: Default::default(),
            annotations: Default::default(),
        }
    }

    fn pod(cluster: &str, ns: &str, name: &str) -> PodRecord {
        PodRecord {
            cluster_name: cluster.to_string(),
            namespace: ns.to_string(),
            name: name.to_string(),
            status: "Running".to_string(),
            phase: "Running".to_string(),
            node_name: None,
            labels: Default::default(),
            containers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn rescanning_same_resource_overwrites_not_duplicates() {
        let (_tmp, store) = test_store().await;
        let fresh = Utc::now() + Duration::seconds(300);

        store
            .create(&namespace("prod", "default", "Active"), fresh)
            .await
            .unwrap();
        store
            .create(&namespace("prod", "default", "Terminating"), fresh)
            .await
            .unwrap();

        let records = store
            .list(&RecordFilter {
                kind: Some(ResourceKind::Namespace),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data["status"], "Terminating");
    }

    #[tokio::test]
    async fn stale_records_are_invisible_unless_asked_for() {
        let (_tmp, store) = test_store().await;
        let expired = Utc::now() - Duration::seconds(60);
        let fresh = Utc::now() + Duration::seconds(300);

        store
            .create(&pod("prod", "app", "old"), expired)
            .await
            .unwrap();
        store
            .create(&pod("prod", "app", "new"), fresh)
            .await
            .unwrap();

        let visible = store
            .list(&RecordFilter {
                kind: Some(ResourceKind::Pod),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "new");

        let all = store
            .list(&RecordFilter {
                kind: Some(ResourceKind::Pod),
                include_stale: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_rows() {
        let (_tmp, store) = test_store().await;
        let expired = Utc::now() - Duration::seconds(60);
        let fresh = Utc::now() + Duration::seconds(300);

        store
            .create(&pod("prod", "app", "old"), expired)
            .await
            .unwrap();
        store
            .create(&pod("prod", "app", "older"), expired)
            .await
            .unwrap();
        store
            .create(&pod("prod", "app", "new"), fresh)
            .await
            .unwrap();

        let removed = store.cleanup_expired(ResourceKind::Pod).await.unwrap();
        assert_eq!(removed, 2);

        let remaining = store
            .list(&RecordFilter {
                kind: Some(ResourceKind::Pod),
                include_stale: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "new");
    }

    #[tokio::test]
    async fn filters_apply_by_cluster_and_namespace() {
        let (_tmp, store) = test_store().await;
        let fresh = Utc::now() + Duration::seconds(300);

        store.create(&pod("prod", "app", "a"), fresh).await.unwrap();
        store.create(&pod("prod", "web", "b"), fresh).await.unwrap();
        store.create(&pod("dev", "app", "c"), fresh).await.unwrap();

        let prod_app = store
            .list(&RecordFilter {
                cluster: Some("prod".to_string()),
                namespace: Some("app".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(prod_app.len(), 1);
        assert_eq!(prod_app[0].name, "a");
    }

    #[tokio::test]
    async fn metadata_history_is_newest_first() {
        let (_tmp, store) = test_store().await;
        let base = Utc::now();

        for (i, status) in [ScanStatus::Completed, ScanStatus::Failed, ScanStatus::Completed]
            .iter()
            .enumerate()
        {
            store
                .record_metadata(&ScanMetadata {
                    table_name: "static_scan".to_string(),
                    cluster_name: "prod".to_string(),
                    scan_status: *status,
                    record_count: i as i64,
                    error_message: None,
                    last_scan_at: Some(base + Duration::seconds(i as i64 * 10)),
                    next_scan_at: None,
                    duration_ms: Some(100),
                })
                .await
                .unwrap();
        }

        let history = store.list_metadata("prod", 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].record_count, 2);
        assert_eq!(history[1].record_count, 1);
        assert_eq!(history[1].scan_status, ScanStatus::Failed);
    }

    #[tokio::test]
    async fn stats_split_fresh_and_stale() {
        let (_tmp, store) = test_store().await;
        let expired = Utc::now() - Duration::seconds(60);
        let fresh = Utc::now() + Duration::seconds(300);

        store.create(&pod("prod", "app", "a"), fresh).await.unwrap();
        store
            .create(&namespace("prod", "default", "Active"), expired)
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_fresh, 1);
        assert_eq!(stats.total_stale, 1);
        assert_eq!(stats.per_kind["pods"].fresh, 1);
        assert_eq!(stats.per_kind["namespaces"].stale, 1);
    }
}
