//! Scan session orchestration.
//!
//! The coordinator drives both scan tiers end to end: scan, parse, validate,
//! persist, record metadata. Each tier runs its own bounded retry loop and
//! its failure is recorded into the [`ScanResult`] rather than raised, so a
//! broken dynamic tier never costs you the static records that already
//! landed (and vice versa).

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Config, ScanConfig};
use crate::error::ScanError;
use crate::models::{
    ResourceKind, ScanMetadata, ScanResult, ScanStatistics, ScanStatus, SecretRecord, Tier,
    TierResult,
};
use crate::parser::{self, ParserStats, ResourceParser};
use crate::scanner::{ClusterScanner, ScannerStats};
use crate::store::RecordStore;

/// Overall health verdict for `kubecache health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub scanner: ScannerStats,
    pub parser: ParserStats,
    pub store: Option<crate::store::StoreStats>,
}

/// Session counters for `kubecache stats`.
#[derive(Debug, Serialize)]
pub struct CoordinatorStats {
    pub sessions: u64,
    pub failed_sessions: u64,
    pub scanner: ScannerStats,
    pub parser: ParserStats,
}

pub struct ScanCoordinator {
    scanner: ClusterScanner,
    parser: ResourceParser,
    store: RecordStore,
    config: ScanConfig,
    sessions: AtomicU64,
    failed_sessions: AtomicU64,
}

impl ScanCoordinator {
    pub fn new(
        scanner: ClusterScanner,
        parser: ResourceParser,
        store: RecordStore,
        config: &ScanConfig,
    ) -> Self {
        Self {
            scanner,
            parser,
            store,
            config: config.clone(),
            sessions: AtomicU64::new(0),
            failed_sessions: AtomicU64::new(0),
        }
    }

    /// Run a full scan session against one cluster.
    ///
    /// Tiers are independent: each gets its own retry budget and its own
    /// metadata trail, and a tier that exhausts its retries contributes an
    /// error entry instead of aborting the session. The returned result is
    /// therefore always complete, possibly with empty tiers.
    pub async fn scan_cluster_full(
        &self,
        cluster_name: &str,
        include_static: bool,
        include_dynamic: bool,
        namespace: Option<&str>,
    ) -> ScanResult {
        let started_at = Utc::now();
        let started = Instant::now();
        self.sessions.fetch_add(1, Ordering::Relaxed);

        log::info!(
            "starting scan session for '{}' (static={}, dynamic={})",
            cluster_name,
            include_static,
            include_dynamic
        );

        let static_tier = if include_static {
            Some(
                self.run_tier(Tier::Static, cluster_name, || {
                    self.scan_and_store_static(cluster_name)
                })
                .await,
            )
        } else {
            None
        };

        let dynamic_tier = if include_dynamic {
            Some(
                self.run_tier(Tier::Dynamic, cluster_name, || {
                    self.scan_and_store_dynamic(cluster_name, namespace)
                })
                .await,
            )
        } else {
            None
        };

        let mut errors = Vec::new();
        for (tier, result) in [
            (Tier::Static, &static_tier),
            (Tier::Dynamic, &dynamic_tier),
        ] {
            if let Some(result) = result {
                if let Some(error) = &result.error {
                    errors.push(format!("{} tier: {}", tier, error));
                }
            }
        }

        let requested =
            static_tier.iter().count() + dynamic_tier.iter().count();
        let failed = [&static_tier, &dynamic_tier]
            .iter()
            .filter(|t| t.as_ref().map(|r| !r.success).unwrap_or(false))
            .count();
        if requested > 0 && failed == requested {
            self.failed_sessions.fetch_add(1, Ordering::Relaxed);
        }

        let statistics = aggregate_statistics(&static_tier, &dynamic_tier);

        log::info!(
            "scan session for '{}' finished: {} resources, {} error(s)",
            cluster_name,
            statistics.total_resources,
            errors.len()
        );

        ScanResult {
            cluster_name: cluster_name.to_string(),
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            static_tier,
            dynamic_tier,
            statistics,
            errors,
        }
    }

    /// Run one tier with bounded retries and a metadata trail.
    ///
    /// The tier gets `max_retries + 1` attempts with a linearly growing
    /// delay between them (`retry_delay_secs * attempt_number`). A `running`
    /// metadata row goes in before the first attempt and exactly one
    /// terminal row after the loop, whichever way it ended. Every row
    /// carries a `next_scan_at` so consumers can tell when a re-scan is
    /// due even after a failure.
    async fn run_tier<'a, F, Fut>(&'a self, tier: Tier, cluster_name: &'a str, attempt: F) -> TierResult
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<BTreeMap<String, u64>, ScanError>> + 'a,
    {
        let table_name = format!("{}_scan", tier);
        let started = Instant::now();
        let next_scan_at =
            || Some(Utc::now() + ChronoDuration::seconds(self.config.ttl_secs(tier) as i64));

        self.write_metadata(ScanMetadata {
            table_name: table_name.clone(),
            cluster_name: cluster_name.to_string(),
            scan_status: ScanStatus::Running,
            record_count: 0,
            error_message: None,
            last_scan_at: Some(Utc::now()),
            next_scan_at: next_scan_at(),
            duration_ms: None,
        })
        .await;

        let max_attempts = self.config.max_retries + 1;
        let mut last_error = String::new();

        for attempt_no in 1..=max_attempts {
            match attempt().await {
                Ok(counts) => {
                    let result = TierResult::succeeded(attempt_no, counts);
                    self.write_metadata(ScanMetadata {
                        table_name: table_name.clone(),
                        cluster_name: cluster_name.to_string(),
                        scan_status: ScanStatus::Completed,
                        record_count: result.total() as i64,
                        error_message: None,
                        last_scan_at: Some(Utc::now()),
                        next_scan_at: next_scan_at(),
                        duration_ms: Some(started.elapsed().as_millis() as i64),
                    })
                    .await;
                    return result;
                }
                Err(e) => {
                    last_error = e.to_string();
                    log::warn!(
                        "{} tier attempt {}/{} for '{}' failed: {}",
                        tier,
                        attempt_no,
                        max_attempts,
                        cluster_name,
                        e
                    );
                    if attempt_no < max_attempts {
                        let delay = self.config.retry_delay_secs * attempt_no as u64;
                        tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
                    }
                }
            }
        }

        self.write_metadata(ScanMetadata {
            table_name,
            cluster_name: cluster_name.to_string(),
            scan_status: ScanStatus::Failed,
            record_count: 0,
            error_message: Some(last_error.clone()),
            last_scan_at: Some(Utc::now()),
            next_scan_at: next_scan_at(),
            duration_ms: Some(started.elapsed().as_millis() as i64),
        })
        .await;

        TierResult::failed(max_attempts, last_error)
    }

    /// One static-tier attempt: scan, parse, validate, persist.
    async fn scan_and_store_static(
        &self,
        cluster_name: &str,
    ) -> Result<BTreeMap<String, u64>, ScanError> {
        let raw = self.scanner.scan_static_resources(cluster_name).await?;
        let expires = Utc::now() + ChronoDuration::seconds(self.config.ttl_secs(Tier::Static) as i64);

        let cluster_obj = parser::extract_object(&raw.cluster);
        let cluster = self
            .parser
            .parse_cluster_info(&cluster_obj, Some(cluster_name))?;
        self.parser.validate_parsed_data(
            &serde_json::to_value(&cluster).unwrap_or_default(),
            ResourceKind::Cluster,
            &["cluster_name", "version", "api_server"],
        )?;
        self.store.create(&cluster, expires).await?;

        let mut counts = BTreeMap::new();
        counts.insert(ResourceKind::Cluster.table().to_string(), 1u64);

        let namespaces = self.parser.parse_namespaces(&raw.namespaces, cluster_name);
        for ns in &namespaces {
            self.store.create(ns, expires).await?;
        }
        counts.insert(
            ResourceKind::Namespace.table().to_string(),
            namespaces.len() as u64,
        );

        let nodes = self.parser.parse_nodes(&raw.nodes, cluster_name);
        for node in &nodes {
            self.store.create(node, expires).await?;
        }
        counts.insert(ResourceKind::Node.table().to_string(), nodes.len() as u64);

        Ok(counts)
    }

    /// One dynamic-tier attempt: scan, parse, validate, persist.
    ///
    /// Validation failures propagate out like scanner errors, so the retry
    /// loop consumes them and the tier fails visibly rather than dropping
    /// records. Secrets are reduced to name, key count, and labels before
    /// anything touches the store.
    async fn scan_and_store_dynamic(
        &self,
        cluster_name: &str,
        namespace: Option<&str>,
    ) -> Result<BTreeMap<String, u64>, ScanError> {
        let raw = self
            .scanner
            .scan_dynamic_resources(cluster_name, namespace)
            .await?;
        let expires =
            Utc::now() + ChronoDuration::seconds(self.config.ttl_secs(Tier::Dynamic) as i64);

        let mut counts = BTreeMap::new();

        let pods = self.parser.parse_pods(&raw.pods, cluster_name);
        for pod in &pods {
            self.parser.validate_parsed_data(
                &serde_json::to_value(pod).unwrap_or_default(),
                ResourceKind::Pod,
                &["cluster_name", "namespace", "name", "phase"],
            )?;
            self.store.create(pod, expires).await?;
        }
        counts.insert(ResourceKind::Pod.table().to_string(), pods.len() as u64);

        let services = self.parser.parse_services(&raw.services, cluster_name);
        for svc in &services {
            self.parser.validate_parsed_data(
                &serde_json::to_value(svc).unwrap_or_default(),
                ResourceKind::Service,
                &["cluster_name", "namespace", "name", "service_type"],
            )?;
            self.store.create(svc, expires).await?;
        }
        counts.insert(
            ResourceKind::Service.table().to_string(),
            services.len() as u64,
        );

        let deployments = self.parser.parse_deployments(&raw.deployments, cluster_name);
        for deploy in &deployments {
            self.store.create(deploy, expires).await?;
        }
        counts.insert(
            ResourceKind::Deployment.table().to_string(),
            deployments.len() as u64,
        );

        let configmaps = self.parser.parse_configmaps(&raw.configmaps, cluster_name);
        for cm in &configmaps {
            self.store.create(cm, expires).await?;
        }
        counts.insert(
            ResourceKind::ConfigMap.table().to_string(),
            configmaps.len() as u64,
        );

        // Secrets go through the configmap key-counting path and are then
        // stripped to counts and labels. Key names never reach the store.
        let secrets: Vec<SecretRecord> = self
            .parser
            .parse_configmaps(&raw.secrets, cluster_name)
            .into_iter()
            .map(|cm| SecretRecord {
                cluster_name: cm.cluster_name,
                namespace: cm.namespace,
                name: cm.name,
                total_keys: cm.total_keys,
                labels: cm.labels,
            })
            .collect();
        for secret in &secrets {
            self.store.create(secret, expires).await?;
        }
        counts.insert(ResourceKind::Secret.table().to_string(), secrets.len() as u64);

        Ok(counts)
    }

    /// Scan history for a cluster, newest first.
    pub async fn get_scan_history(
        &self,
        cluster_name: &str,
        limit: i64,
    ) -> Result<Vec<ScanMetadata>, ScanError> {
        self.store.list_metadata(cluster_name, limit).await
    }

    /// Drop TTL-expired records, kind by kind. A kind whose cleanup fails is
    /// logged and skipped so the others still get swept.
    pub async fn cleanup_expired_cache(&self) -> BTreeMap<String, u64> {
        let mut removed = BTreeMap::new();
        for kind in ResourceKind::ALL {
            match self.store.cleanup_expired(kind).await {
                Ok(count) => {
                    removed.insert(kind.table().to_string(), count);
                }
                Err(e) => {
                    log::warn!("cleanup of {} failed: {}", kind.table(), e);
                }
            }
        }
        removed
    }

    /// Component health rollup.
    ///
    /// One issue per unhealthy component: an unreachable store, a scanner
    /// succeeding on fewer than half its scans, a parser succeeding on fewer
    /// than 90% of its records. No issues is healthy, one or two is
    /// degraded, more is unhealthy.
    pub async fn health_check(&self) -> HealthReport {
        let mut issues = Vec::new();

        let store_stats = match self.store.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                issues.push(format!("cache store unreachable: {}", e));
                None
            }
        };

        let scanner_stats = self.scanner.stats();
        if scanner_stats.scan_count > 0 && scanner_stats.success_rate < 50.0 {
            issues.push(format!(
                "scanner success rate {:.1}% across {} scans",
                scanner_stats.success_rate, scanner_stats.scan_count
            ));
        }

        let parser_stats = self.parser.stats();
        if parser_stats.parsed_count > 0 && parser_stats.success_rate < 90.0 {
            issues.push(format!(
                "parser success rate {:.1}% across {} records",
                parser_stats.success_rate, parser_stats.parsed_count
            ));
        }

        let status = match issues.len() {
            0 => HealthStatus::Healthy,
            1 | 2 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        };

        HealthReport {
            status,
            issues,
            scanner: scanner_stats,
            parser: parser_stats,
            store: store_stats,
        }
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            sessions: self.sessions.load(Ordering::Relaxed),
            failed_sessions: self.failed_sessions.load(Ordering::Relaxed),
            scanner: self.scanner.stats(),
            parser: self.parser.stats(),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Metadata writes are best-effort: a history row that fails to land
    /// must not fail the scan that produced it.
    async fn write_metadata(&self, meta: ScanMetadata) {
        if let Err(e) = self.store.record_metadata(&meta).await {
            log::warn!(
                "failed to record scan metadata for '{}' ({}): {}",
                meta.cluster_name,
                meta.table_name,
                e
            );
        }
    }
}

fn aggregate_statistics(
    static_tier: &Option<TierResult>,
    dynamic_tier: &Option<TierResult>,
) -> ScanStatistics {
    let mut stats = ScanStatistics::default();

    if let Some(tier) = static_tier {
        stats.static_resources = tier.total();
        for (table, count) in &tier.counts {
            *stats.resource_breakdown.entry(table.clone()).or_insert(0) += count;
        }
    }
    if let Some(tier) = dynamic_tier {
        stats.dynamic_resources = tier.total();
        for (table, count) in &tier.counts {
            *stats.resource_breakdown.entry(table.clone()).or_insert(0) += count;
        }
    }
    stats.total_resources = stats.static_resources + stats.dynamic_resources;
    stats
}

/// Wire up a coordinator from loaded config and an agent implementation.
pub async fn build_coordinator(
    config: &Config,
    agent: Arc<dyn crate::agent::ToolAgent>,
) -> anyhow::Result<ScanCoordinator> {
    let catalog = crate::catalog::ToolCatalog::with_overrides(&config.tools)?;
    let pool = crate::db::connect(config).await?;
    let scanner = ClusterScanner::new(agent, catalog, &config.scan);
    Ok(ScanCoordinator::new(
        scanner,
        ResourceParser::new(),
        RecordStore::new(pool),
        &config.scan,
    ))
}
