//! Cluster scanning: translate (cluster, kind, namespace) requests into
//! tool-agent calls and hand back the raw replies.
//!
//! Each call is a single attempt bounded by a wall-clock timeout; retries
//! belong to the coordinator. The scanner resolves the tool id through the
//! catalog, builds the instruction text, dispatches it, and extracts the
//! item list from whatever shape the reply arrived in.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::agent::ToolAgent;
use crate::catalog::ToolCatalog;
use crate::config::ScanConfig;
use crate::error::{ErrorContext, ScanError};
use crate::models::ResourceKind;
use crate::parser;

/// Raw static-tier replies: cluster identity plus namespace and node lists.
#[derive(Debug, Clone)]
pub struct StaticResources {
    pub cluster: Value,
    pub namespaces: Vec<Value>,
    pub nodes: Vec<Value>,
}

/// Raw dynamic-tier replies, one item list per kind.
#[derive(Debug, Clone)]
pub struct DynamicResources {
    pub pods: Vec<Value>,
    pub services: Vec<Value>,
    pub deployments: Vec<Value>,
    pub configmaps: Vec<Value>,
    pub secrets: Vec<Value>,
}

/// Snapshot of scanner counters for health checks.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScannerStats {
    pub scan_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub total_scan_ms: u64,
    pub avg_scan_ms: u64,
}

pub struct ClusterScanner {
    agent: Arc<dyn ToolAgent>,
    catalog: ToolCatalog,
    timeout: Duration,
    max_steps: u32,
    scan_count: AtomicU64,
    error_count: AtomicU64,
    total_scan_ms: AtomicU64,
}

impl ClusterScanner {
    pub fn new(agent: Arc<dyn ToolAgent>, catalog: ToolCatalog, config: &ScanConfig) -> Self {
        Self {
            agent,
            catalog,
            timeout: Duration::from_secs(config.timeout_secs),
            max_steps: config.max_steps,
            scan_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_scan_ms: AtomicU64::new(0),
        }
    }

    /// Scan the static tier: cluster identity, namespaces, nodes.
    pub async fn scan_static_resources(
        &self,
        cluster_name: &str,
    ) -> Result<StaticResources, ScanError> {
        let started = Instant::now();

        let result = async {
            let cluster = self
                .call_tool(
                    ResourceKind::Cluster,
                    cluster_name,
                    &[("cluster", cluster_name.to_string())],
                )
                .await?;

            let namespaces = self.list_kind(ResourceKind::Namespace, cluster_name, None);
            let nodes = self.list_kind(ResourceKind::Node, cluster_name, None);

            Ok(StaticResources {
                cluster,
                namespaces: namespaces.await?,
                nodes: nodes.await?,
            })
        }
        .await;

        self.record_outcome(started, result.is_ok());
        result
    }

    /// Scan the dynamic tier: pods, services, deployments, configmaps,
    /// secrets. `namespace` limits the scan; `None` means all namespaces.
    pub async fn scan_dynamic_resources(
        &self,
        cluster_name: &str,
        namespace: Option<&str>,
    ) -> Result<DynamicResources, ScanError> {
        let started = Instant::now();

        let result = async {
            Ok(DynamicResources {
                pods: self
                    .list_kind(ResourceKind::Pod, cluster_name, namespace)
                    .await?,
                services: self
                    .list_kind(ResourceKind::Service, cluster_name, namespace)
                    .await?,
                deployments: self
                    .list_kind(ResourceKind::Deployment, cluster_name, namespace)
                    .await?,
                configmaps: self
                    .list_kind(ResourceKind::ConfigMap, cluster_name, namespace)
                    .await?,
                secrets: self
                    .list_kind(ResourceKind::Secret, cluster_name, namespace)
                    .await?,
            })
        }
        .await;

        self.record_outcome(started, result.is_ok());
        result
    }

    /// List one resource kind and extract its item array.
    async fn list_kind(
        &self,
        kind: ResourceKind,
        cluster_name: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>, ScanError> {
        let mut params = vec![
            ("apiVersion", kind.api_version().to_string()),
            ("cluster", cluster_name.to_string()),
            ("kind", kind.kind_name().to_string()),
        ];
        if let Some(ns) = namespace {
            params.push(("namespace", ns.to_string()));
        }

        let reply = self.call_tool(kind, cluster_name, &params).await?;
        Ok(parser::extract_items(&reply))
    }

    /// Resolve the tool, build the instruction, and run one attempt under
    /// the wall-clock timeout.
    async fn call_tool(
        &self,
        kind: ResourceKind,
        cluster_name: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ScanError> {
        let tool = self.catalog.resolve(kind)?;
        let param_str = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        let instruction = format!(
            "Use the {} tool with parameters: {}",
            tool, param_str
        );

        log::debug!(
            "dispatching {} for {} (max_steps={}, timeout={}s)",
            tool,
            kind,
            self.max_steps,
            self.timeout.as_secs()
        );

        let started = Instant::now();
        let context = || {
            ErrorContext::new("call_tool")
                .cluster(cluster_name)
                .tool(tool)
                .params(param_str.clone())
                .elapsed_ms(started.elapsed().as_millis() as u64)
        };

        match tokio::time::timeout(self.timeout, self.agent.run(&instruction, self.max_steps))
            .await
        {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(ScanError::Connection { message, .. })) => Err(ScanError::Connection {
                message,
                context: context(),
            }),
            Ok(Err(other)) => Err(other),
            Err(_elapsed) => Err(ScanError::Timeout {
                timeout_secs: self.timeout.as_secs(),
                context: context(),
            }),
        }
    }

    fn record_outcome(&self, started: Instant, success: bool) {
        self.scan_count.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_scan_ms
            .fetch_add(started.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ScannerStats {
        let scans = self.scan_count.load(Ordering::Relaxed);
        let errors = self.error_count.load(Ordering::Relaxed);
        let total_ms = self.total_scan_ms.load(Ordering::Relaxed);
        ScannerStats {
            scan_count: scans,
            error_count: errors,
            success_rate: (scans.saturating_sub(errors)) as f64 / (scans.max(1)) as f64 * 100.0,
            total_scan_ms: total_ms,
            avg_scan_ms: total_ms / scans.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Agent stub that answers from a tool-id → reply table and records
    /// every instruction it receives.
    struct StubAgent {
        replies: BTreeMap<&'static str, Value>,
        instructions: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl StubAgent {
        fn new(replies: BTreeMap<&'static str, Value>) -> Self {
            Self {
                replies,
                instructions: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                replies: BTreeMap::new(),
                instructions: Mutex::new(Vec::new()),
                delay: Some(delay),
            }
        }
    }

    #[async_trait]
    impl ToolAgent for StubAgent {
        async fn run(&self, instruction: &str, _max_steps: u32) -> Result<Value, ScanError> {
            self.instructions
                .lock()
                .unwrap()
                .push(instruction.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            for (tool, reply) in &self.replies {
                if instruction.contains(tool) {
                    return Ok(reply.clone());
                }
            }
            Ok(json!({"items": []}))
        }
    }

    fn test_config() -> ScanConfig {
        ScanConfig {
            timeout_secs: 1,
            ..ScanConfig::default()
        }
    }

    fn scanner_with(agent: StubAgent) -> (Arc<StubAgent>, ClusterScanner) {
        let agent = Arc::new(agent);
        let scanner = ClusterScanner::new(
            agent.clone() as Arc<dyn ToolAgent>,
            ToolCatalog::builtin(),
            &test_config(),
        );
        (agent, scanner)
    }

    #[tokio::test]
    async fn static_scan_collects_cluster_namespaces_and_nodes() {
        let mut replies = BTreeMap::new();
        replies.insert("GET_CLUSTER_INFO", json!({"version": "v1.29.0", "nodeCount": 2}));
        replies.insert(
            "LIST_NAMESPACES",
            json!({"items": [{"metadata": {"name": "default"}}]}),
        );
        replies.insert(
            "LIST_NODES",
            json!({"items": [{"metadata": {"name": "n1"}}, {"metadata": {"name": "n2"}}]}),
        );

        let (_, scanner) = scanner_with(StubAgent::new(replies));
        let resources = scanner.scan_static_resources("prod").await.unwrap();
        assert_eq!(resources.cluster["version"], "v1.29.0");
        assert_eq!(resources.namespaces.len(), 1);
        assert_eq!(resources.nodes.len(), 2);
        assert_eq!(scanner.stats().scan_count, 1);
        assert_eq!(scanner.stats().error_count, 0);
    }

    #[tokio::test]
    async fn instructions_name_tool_and_parameters() {
        let (agent, scanner) = scanner_with(StubAgent::new(BTreeMap::new()));
        scanner
            .scan_dynamic_resources("prod", Some("app"))
            .await
            .unwrap();

        let instructions = agent.instructions.lock().unwrap();
        assert_eq!(instructions.len(), 5);
        let pod_call = &instructions[0];
        assert!(pod_call.contains("LIST_CORE_RESOURCES"));
        assert!(pod_call.contains("apiVersion=v1"));
        assert!(pod_call.contains("kind=Pod"));
        assert!(pod_call.contains("cluster=prod"));
        assert!(pod_call.contains("namespace=app"));
        let deploy_call = &instructions[2];
        assert!(deploy_call.contains("LIST_APPS_RESOURCES"));
        assert!(deploy_call.contains("apiVersion=apps/v1"));
    }

    #[tokio::test]
    async fn slow_agent_surfaces_timeout() {
        let agent = Arc::new(StubAgent::slow(Duration::from_secs(5)));
        let config = ScanConfig {
            timeout_secs: 1,
            ..ScanConfig::default()
        };
        let scanner = ClusterScanner::new(
            agent as Arc<dyn ToolAgent>,
            ToolCatalog::builtin(),
            &config,
        );

        tokio::time::pause();
        let scan = scanner.scan_static_resources("prod");
        tokio::pin!(scan);
        // Advancing past the budget fires the timeout inside the scan.
        let result = tokio::select! {
            r = &mut scan => r,
            _ = async {
                tokio::time::advance(Duration::from_secs(10)).await;
                std::future::pending::<()>().await;
            } => unreachable!(),
        };

        match result {
            Err(ScanError::Timeout { timeout_secs, context }) => {
                assert_eq!(timeout_secs, 1);
                assert_eq!(context.cluster.as_deref(), Some("prod"));
            }
            other => panic!("expected Timeout, got {:?}", other.map(|_| ())),
        }
        assert_eq!(scanner.stats().error_count, 1);
    }

    #[tokio::test]
    async fn disabled_tool_surfaces_tool_not_found() {
        let mut overrides = BTreeMap::new();
        overrides.insert("secret".to_string(), "".to_string());
        let catalog = ToolCatalog::with_overrides(&overrides).unwrap();
        let scanner = ClusterScanner::new(
            Arc::new(StubAgent::new(BTreeMap::new())) as Arc<dyn ToolAgent>,
            catalog,
            &test_config(),
        );

        let result = scanner.scan_dynamic_resources("prod", None).await;
        assert!(matches!(result, Err(ScanError::ToolNotFound { .. })));
    }
}
