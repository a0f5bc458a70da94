//! Core data models for the scan pipeline.
//!
//! These types represent the resource kinds kubecache tracks, the typed
//! records the parser produces, and the metadata/result types that flow
//! through a scan session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Freshness class of a resource kind. Static resources change rarely and
/// get a long TTL; dynamic resources churn and get a short one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Static,
    Dynamic,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Static => "static",
            Tier::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the cluster object types kubecache tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cluster,
    Namespace,
    Node,
    Pod,
    Service,
    Deployment,
    ConfigMap,
    Secret,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Cluster,
        ResourceKind::Namespace,
        ResourceKind::Node,
        ResourceKind::Pod,
        ResourceKind::Service,
        ResourceKind::Deployment,
        ResourceKind::ConfigMap,
        ResourceKind::Secret,
    ];

    /// Which freshness tier this kind belongs to.
    pub fn tier(&self) -> Tier {
        match self {
            ResourceKind::Cluster | ResourceKind::Namespace | ResourceKind::Node => Tier::Static,
            ResourceKind::Pod
            | ResourceKind::Service
            | ResourceKind::Deployment
            | ResourceKind::ConfigMap
            | ResourceKind::Secret => Tier::Dynamic,
        }
    }

    /// Plural, snake_case name used for tables and result breakdowns.
    pub fn table(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "clusters",
            ResourceKind::Namespace => "namespaces",
            ResourceKind::Node => "nodes",
            ResourceKind::Pod => "pods",
            ResourceKind::Service => "services",
            ResourceKind::Deployment => "deployments",
            ResourceKind::ConfigMap => "configmaps",
            ResourceKind::Secret => "secrets",
        }
    }

    /// API group/version the kind lives under.
    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "apps/v1",
            _ => "v1",
        }
    }

    /// Upstream kind name as it appears in list replies.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "Cluster",
            ResourceKind::Namespace => "Namespace",
            ResourceKind::Node => "Node",
            ResourceKind::Pod => "Pod",
            ResourceKind::Service => "Service",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
        }
    }

    /// True for kinds scoped to a namespace.
    pub fn namespaced(&self) -> bool {
        !matches!(
            self,
            ResourceKind::Cluster | ResourceKind::Namespace | ResourceKind::Node
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Cluster => "cluster",
            ResourceKind::Namespace => "namespace",
            ResourceKind::Node => "node",
            ResourceKind::Pod => "pod",
            ResourceKind::Service => "service",
            ResourceKind::Deployment => "deployment",
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::Secret => "secret",
        };
        f.write_str(s)
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    /// Accepts singular or plural, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cluster" | "clusters" => Ok(ResourceKind::Cluster),
            "namespace" | "namespaces" => Ok(ResourceKind::Namespace),
            "node" | "nodes" => Ok(ResourceKind::Node),
            "pod" | "pods" => Ok(ResourceKind::Pod),
            "service" | "services" => Ok(ResourceKind::Service),
            "deployment" | "deployments" => Ok(ResourceKind::Deployment),
            "configmap" | "configmaps" => Ok(ResourceKind::ConfigMap),
            "secret" | "secrets" => Ok(ResourceKind::Secret),
            other => Err(format!("unknown resource kind: '{}'", other)),
        }
    }
}

/// Natural identity of a cached record. The store keys upserts by
/// `(kind, cluster, namespace, name)`, so scanning the same resource twice
/// overwrites rather than duplicates.
pub trait CacheRecord: Serialize {
    fn kind(&self) -> ResourceKind;
    fn cluster_name(&self) -> &str;
    fn namespace(&self) -> Option<&str> {
        None
    }
    fn name(&self) -> &str;
}

/// Cluster identity and version info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub cluster_name: String,
    pub version: String,
    pub api_server: String,
    pub node_count: i64,
}

impl CacheRecord for ClusterRecord {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Cluster
    }
    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
    fn name(&self) -> &str {
        &self.cluster_name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceRecord {
    pub cluster_name: String,
    pub name: String,
    pub status: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl CacheRecord for NamespaceRecord {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Namespace
    }
    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub cluster_name: String,
    pub name: String,
    /// `Ready`, `NotReady`, or `Unknown`, derived from the Ready condition.
    pub status: String,
    /// Roles inferred from `node-role.kubernetes.io/*` labels; `["worker"]`
    /// when no role label is present.
    pub roles: Vec<String>,
    /// Copied verbatim from `status.capacity`.
    pub capacity: Value,
    /// Copied verbatim from `status.allocatable`.
    pub allocatable: Value,
    pub labels: BTreeMap<String, String>,
    /// Copied verbatim from `spec.taints`.
    pub taints: Value,
}

impl CacheRecord for NodeRecord {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Node
    }
    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// Per-container view merged from pod spec and container statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub image: String,
    pub ready: bool,
    pub restart_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRecord {
    pub cluster_name: String,
    pub namespace: String,
    pub name: String,
    /// Derived status: `Running` only when the phase is Running and every
    /// container reports ready; `NotReady` when Running but not all ready;
    /// otherwise the phase itself.
    pub status: String,
    pub phase: String,
    pub node_name: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<ContainerStatus>,
}

impl CacheRecord for PodRecord {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Pod
    }
    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub cluster_name: String,
    pub namespace: String,
    pub name: String,
    pub service_type: String,
    pub cluster_ip: Option<String>,
    /// Populated only for `LoadBalancer` services, from the first ingress IP.
    pub external_ip: Option<String>,
    pub ports: Value,
    pub selector: BTreeMap<String, String>,
}

impl CacheRecord for ServiceRecord {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Service
    }
    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub cluster_name: String,
    pub namespace: String,
    pub name: String,
    pub replicas: i64,
    pub ready_replicas: i64,
    pub available_replicas: i64,
    pub selector: Value,
    pub labels: BTreeMap<String, String>,
}

impl CacheRecord for DeploymentRecord {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Deployment
    }
    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// ConfigMap metadata. Key names are retained; values never are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMapRecord {
    pub cluster_name: String,
    pub namespace: String,
    pub name: String,
    pub data_keys: Vec<String>,
    pub binary_data_keys: Vec<String>,
    pub total_keys: usize,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl CacheRecord for ConfigMapRecord {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ConfigMap
    }
    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// Secret metadata. Neither values nor key names are persisted; only the
/// key count and labels survive. This is a deliberate redaction policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub cluster_name: String,
    pub namespace: String,
    pub name: String,
    pub total_keys: usize,
    pub labels: BTreeMap<String, String>,
}

impl CacheRecord for SecretRecord {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Secret
    }
    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }
    fn name(&self) -> &str {
        &self.name
    }
}

/// Lifecycle state of one tier scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }

    /// True once the tier has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "running" => Ok(ScanStatus::Running),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(format!("unknown scan status: '{}'", other)),
        }
    }
}

/// One row of scan history. Rows are appended, never updated, so the most
/// recent row by `last_scan_at` is the current status for a tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetadata {
    pub table_name: String,
    pub cluster_name: String,
    pub scan_status: ScanStatus,
    pub record_count: i64,
    pub error_message: Option<String>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub next_scan_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// Outcome of one tier's retry loop.
#[derive(Debug, Clone, Serialize)]
pub struct TierResult {
    pub success: bool,
    /// Attempts consumed, including the successful one (1-based).
    pub attempts: u32,
    /// Records persisted per resource table, e.g. `{"pods": 12}`.
    pub counts: BTreeMap<String, u64>,
    pub error: Option<String>,
}

impl TierResult {
    pub fn succeeded(attempts: u32, counts: BTreeMap<String, u64>) -> Self {
        Self {
            success: true,
            attempts,
            counts,
            error: None,
        }
    }

    pub fn failed(attempts: u32, error: String) -> Self {
        Self {
            success: false,
            attempts,
            counts: BTreeMap::new(),
            error: Some(error),
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Aggregate counts across both tiers of a scan session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStatistics {
    pub total_resources: u64,
    pub static_resources: u64,
    pub dynamic_resources: u64,
    pub resource_breakdown: BTreeMap<String, u64>,
}

/// The structured outcome of `scan_cluster_full`. Returned even when one or
/// both tiers fail: a failed tier contributes a failure entry and zero
/// records, never placeholder data.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub cluster_name: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub static_tier: Option<TierResult>,
    pub dynamic_tier: Option<TierResult>,
    pub statistics: ScanStatistics,
    pub errors: Vec<String>,
}
