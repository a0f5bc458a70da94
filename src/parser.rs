//! Resource parsing: raw tool-call replies → typed records.
//!
//! The tool-invocation agent returns whatever the underlying tool produced,
//! sometimes wrapped in prose. Everything here is defensive: missing fields
//! get documented defaults, unnamed entries are skipped, and only structurally
//! unusable replies become errors. Parsing is pure (no I/O, no clock), so
//! the same reply always yields the same records.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ErrorContext, ScanError};
use crate::models::{
    ClusterRecord, ConfigMapRecord, ContainerStatus, DeploymentRecord, NamespaceRecord,
    NodeRecord, PodRecord, ResourceKind, ServiceRecord,
};

const NODE_ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";

const VALID_POD_PHASES: [&str; 5] = ["Pending", "Running", "Succeeded", "Failed", "Unknown"];
const VALID_SERVICE_TYPES: [&str; 4] = ["ClusterIP", "NodePort", "LoadBalancer", "ExternalName"];

/// Converts raw replies into typed records for one resource kind at a time.
/// Stateless per call; the counters only feed health reporting.
#[derive(Debug, Default)]
pub struct ResourceParser {
    parsed_count: AtomicU64,
    error_count: AtomicU64,
}

/// Snapshot of parser counters for health checks.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ParserStats {
    pub parsed_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
}

impl ResourceParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse cluster identity info.
    ///
    /// Name comes from the explicit `cluster_name` argument, falling back to
    /// the reply's `name`; version from `version`/`serverVersion`; API
    /// endpoint from `server`/`apiServer`; node count from the length of a
    /// `nodes` list or an explicit `nodeCount`.
    pub fn parse_cluster_info(
        &self,
        raw: &Value,
        cluster_name: Option<&str>,
    ) -> Result<ClusterRecord, ScanError> {
        if !raw.is_object() && !raw.is_null() {
            self.error_count.fetch_add(1, Ordering::Relaxed);
            return Err(ScanError::Parse {
                message: format!("cluster reply is not an object: {}", type_name(raw)),
                context: ErrorContext::new("parse_cluster_info"),
            });
        }

        let name = cluster_name
            .map(str::to_string)
            .or_else(|| str_at(raw, &["name"]).map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());

        let version = str_at(raw, &["version"])
            .or_else(|| str_at(raw, &["serverVersion"]))
            .unwrap_or("unknown")
            .to_string();

        let api_server = str_at(raw, &["server"])
            .or_else(|| str_at(raw, &["apiServer"]))
            .unwrap_or("unknown")
            .to_string();

        let node_count = match raw.get("nodes").and_then(Value::as_array) {
            Some(nodes) => nodes.len() as i64,
            None => raw.get("nodeCount").and_then(Value::as_i64).unwrap_or(0),
        };

        self.parsed_count.fetch_add(1, Ordering::Relaxed);
        Ok(ClusterRecord {
            cluster_name: name,
            version,
            api_server,
            node_count,
        })
    }

    /// Parse a namespace list. Entries without a name are skipped.
    pub fn parse_namespaces(&self, raw: &[Value], cluster_name: &str) -> Vec<NamespaceRecord> {
        let mut namespaces = Vec::new();

        for ns in raw {
            let Some(name) = item_name(ns) else {
                continue;
            };

            namespaces.push(NamespaceRecord {
                cluster_name: cluster_name.to_string(),
                name: name.to_string(),
                status: str_at(ns, &["status", "phase"])
                    .unwrap_or("Unknown")
                    .to_string(),
                labels: string_map_at(ns, &["metadata", "labels"]),
                annotations: string_map_at(ns, &["metadata", "annotations"]),
            });
        }

        self.parsed_count
            .fetch_add(namespaces.len() as u64, Ordering::Relaxed);
        namespaces
    }

    /// Parse a node list. Entries without a name are skipped.
    pub fn parse_nodes(&self, raw: &[Value], cluster_name: &str) -> Vec<NodeRecord> {
        let mut nodes = Vec::new();

        for node in raw {
            let Some(name) = item_name(node) else {
                continue;
            };

            let labels = string_map_at(node, &["metadata", "labels"]);

            nodes.push(NodeRecord {
                cluster_name: cluster_name.to_string(),
                name: name.to_string(),
                status: node_status(node),
                roles: node_roles(&labels),
                capacity: value_at(node, &["status", "capacity"]),
                allocatable: value_at(node, &["status", "allocatable"]),
                labels,
                taints: value_at(node, &["spec", "taints"]),
            });
        }

        self.parsed_count
            .fetch_add(nodes.len() as u64, Ordering::Relaxed);
        nodes
    }

    /// Parse a pod list. Entries without a name are skipped.
    pub fn parse_pods(&self, raw: &[Value], cluster_name: &str) -> Vec<PodRecord> {
        let mut pods = Vec::new();

        for pod in raw {
            let Some(name) = str_at(pod, &["metadata", "name"]) else {
                continue;
            };

            pods.push(PodRecord {
                cluster_name: cluster_name.to_string(),
                namespace: str_at(pod, &["metadata", "namespace"])
                    .unwrap_or("default")
                    .to_string(),
                name: name.to_string(),
                status: pod_status(pod),
                phase: str_at(pod, &["status", "phase"])
                    .unwrap_or("Unknown")
                    .to_string(),
                node_name: str_at(pod, &["spec", "nodeName"]).map(str::to_string),
                labels: string_map_at(pod, &["metadata", "labels"]),
                containers: pod_containers(pod),
            });
        }

        self.parsed_count
            .fetch_add(pods.len() as u64, Ordering::Relaxed);
        pods
    }

    /// Parse a service list. Entries without a name are skipped.
    pub fn parse_services(&self, raw: &[Value], cluster_name: &str) -> Vec<ServiceRecord> {
        let mut services = Vec::new();

        for svc in raw {
            let Some(name) = str_at(svc, &["metadata", "name"]) else {
                continue;
            };

            let service_type = str_at(svc, &["spec", "type"])
                .unwrap_or("ClusterIP")
                .to_string();

            // External IPs only exist for load balancers, from the first
            // ingress entry.
            let external_ip = if service_type == "LoadBalancer" {
                value_at(svc, &["status", "loadBalancer", "ingress"])
                    .as_array()
                    .and_then(|ingress| ingress.first())
                    .and_then(|entry| entry.get("ip"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            } else {
                None
            };

            services.push(ServiceRecord {
                cluster_name: cluster_name.to_string(),
                namespace: str_at(svc, &["metadata", "namespace"])
                    .unwrap_or("default")
                    .to_string(),
                name: name.to_string(),
                service_type,
                cluster_ip: str_at(svc, &["spec", "clusterIP"]).map(str::to_string),
                external_ip,
                ports: value_at(svc, &["spec", "ports"]),
                selector: string_map_at(svc, &["spec", "selector"]),
            });
        }

        self.parsed_count
            .fetch_add(services.len() as u64, Ordering::Relaxed);
        services
    }

    /// Parse a deployment list. Entries without a name are skipped.
    pub fn parse_deployments(&self, raw: &[Value], cluster_name: &str) -> Vec<DeploymentRecord> {
        let mut deployments = Vec::new();

        for deploy in raw {
            let Some(name) = str_at(deploy, &["metadata", "name"]) else {
                continue;
            };

            deployments.push(DeploymentRecord {
                cluster_name: cluster_name.to_string(),
                namespace: str_at(deploy, &["metadata", "namespace"])
                    .unwrap_or("default")
                    .to_string(),
                name: name.to_string(),
                replicas: int_at(deploy, &["spec", "replicas"]).unwrap_or(1),
                ready_replicas: int_at(deploy, &["status", "readyReplicas"]).unwrap_or(0),
                available_replicas: int_at(deploy, &["status", "availableReplicas"]).unwrap_or(0),
                selector: value_at(deploy, &["spec", "selector"]),
                labels: string_map_at(deploy, &["metadata", "labels"]),
            });
        }

        self.parsed_count
            .fetch_add(deployments.len() as u64, Ordering::Relaxed);
        deployments
    }

    /// Parse a configmap (or secret) list into key-name metadata. Values are
    /// never copied out of the reply; only key names and counts survive.
    /// Secrets reuse this and are further redacted by the coordinator.
    pub fn parse_configmaps(&self, raw: &[Value], cluster_name: &str) -> Vec<ConfigMapRecord> {
        let mut configmaps = Vec::new();

        for cm in raw {
            let Some(name) = str_at(cm, &["metadata", "name"]) else {
                continue;
            };

            let data_keys = key_names(cm.get("data"));
            let binary_data_keys = key_names(cm.get("binaryData"));

            configmaps.push(ConfigMapRecord {
                cluster_name: cluster_name.to_string(),
                namespace: str_at(cm, &["metadata", "namespace"])
                    .unwrap_or("default")
                    .to_string(),
                name: name.to_string(),
                total_keys: data_keys.len() + binary_data_keys.len(),
                data_keys,
                binary_data_keys,
                labels: string_map_at(cm, &["metadata", "labels"]),
                annotations: string_map_at(cm, &["metadata", "annotations"]),
            });
        }

        self.parsed_count
            .fetch_add(configmaps.len() as u64, Ordering::Relaxed);
        configmaps
    }

    /// Check a serialized record against required fields and kind-specific
    /// invariants. Returns a validation error naming what failed.
    pub fn validate_parsed_data(
        &self,
        data: &Value,
        kind: ResourceKind,
        required_fields: &[&str],
    ) -> Result<(), ScanError> {
        let fail = |message: String| {
            self.error_count.fetch_add(1, Ordering::Relaxed);
            Err(ScanError::Validation {
                message,
                context: ErrorContext::new("validate_parsed_data").params(format!(
                    "kind={} required=[{}]",
                    kind,
                    required_fields.join(",")
                )),
            })
        };

        let Some(obj) = data.as_object() else {
            return fail(format!("record is not an object: {}", type_name(data)));
        };

        let missing: Vec<&str> = required_fields
            .iter()
            .filter(|f| obj.get(**f).map(Value::is_null).unwrap_or(true))
            .copied()
            .collect();
        if !missing.is_empty() {
            return fail(format!("missing required fields: {}", missing.join(", ")));
        }

        match kind {
            ResourceKind::Cluster => {
                match obj.get("node_count").and_then(Value::as_i64) {
                    Some(n) if n >= 0 => {}
                    _ => return fail("node_count must be a non-negative integer".to_string()),
                }
            }
            ResourceKind::Pod => {
                let phase = obj.get("phase").and_then(Value::as_str).unwrap_or("");
                if !VALID_POD_PHASES.contains(&phase) {
                    return fail(format!("invalid pod phase: '{}'", phase));
                }
            }
            ResourceKind::Service => {
                let ty = obj.get("service_type").and_then(Value::as_str).unwrap_or("");
                if !VALID_SERVICE_TYPES.contains(&ty) {
                    return fail(format!("invalid service type: '{}'", ty));
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub fn stats(&self) -> ParserStats {
        let parsed = self.parsed_count.load(Ordering::Relaxed);
        let errors = self.error_count.load(Ordering::Relaxed);
        ParserStats {
            parsed_count: parsed,
            error_count: errors,
            success_rate: (parsed.saturating_sub(errors)) as f64 / (parsed.max(1)) as f64 * 100.0,
        }
    }
}

/// Pull the item list out of a reply, whatever shape it arrived in.
///
/// Accepts a bare JSON array, an object carrying an `items` array, or a
/// string reply containing JSON, possibly wrapped in prose from the agent.
/// Anything else yields an empty list.
pub fn extract_items(reply: &Value) -> Vec<Value> {
    match reply {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get("items") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        Value::String(text) => match json_from_text(text) {
            Some(parsed) => extract_items(&parsed),
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Unwrap a reply expected to be a single object, tolerating prose wrapping.
pub fn extract_object(reply: &Value) -> Value {
    match reply {
        Value::Object(_) => reply.clone(),
        Value::String(text) => match json_from_text(text) {
            Some(Value::Object(map)) => Value::Object(map),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

/// Find and parse the first JSON value embedded in free-form text.
fn json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    let start = trimmed.find(['{', '['])?;
    let bytes = trimmed.as_bytes();
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&trimmed[start..=i]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Walk a path of object keys, returning the value at the end.
fn value_at_ref<'a>(v: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = v;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

fn str_at<'a>(v: &'a Value, path: &[&str]) -> Option<&'a str> {
    value_at_ref(v, path).and_then(Value::as_str)
}

fn int_at(v: &Value, path: &[&str]) -> Option<i64> {
    value_at_ref(v, path).and_then(Value::as_i64)
}

/// Clone the value at a path, defaulting to `Null` when absent.
fn value_at(v: &Value, path: &[&str]) -> Value {
    value_at_ref(v, path).cloned().unwrap_or(Value::Null)
}

/// String-valued map at a path; non-string values are dropped.
fn string_map_at(v: &Value, path: &[&str]) -> BTreeMap<String, String> {
    value_at_ref(v, path)
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Identity for list items: `metadata.name`, falling back to a bare `name`.
fn item_name(v: &Value) -> Option<&str> {
    str_at(v, &["metadata", "name"]).or_else(|| str_at(v, &["name"]))
}

fn key_names(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_object)
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default()
}

/// Node readiness from the `Ready` condition; `Unknown` when absent.
fn node_status(node: &Value) -> String {
    let conditions = value_at(node, &["status", "conditions"]);
    if let Some(conditions) = conditions.as_array() {
        for condition in conditions {
            if str_at(condition, &["type"]) == Some("Ready") {
                return if str_at(condition, &["status"]) == Some("True") {
                    "Ready".to_string()
                } else {
                    "NotReady".to_string()
                };
            }
        }
    }
    "Unknown".to_string()
}

/// Roles from `node-role.kubernetes.io/*` labels, defaulting to worker.
fn node_roles(labels: &BTreeMap<String, String>) -> Vec<String> {
    let roles: Vec<String> = labels
        .keys()
        .filter_map(|key| key.strip_prefix(NODE_ROLE_LABEL_PREFIX))
        .filter(|role| !role.is_empty())
        .map(str::to_string)
        .collect();

    if roles.is_empty() {
        vec!["worker".to_string()]
    } else {
        roles
    }
}

/// Derived pod status: Running requires the phase and every container ready.
fn pod_status(pod: &Value) -> String {
    let phase = str_at(pod, &["status", "phase"]).unwrap_or("Unknown");
    let statuses = value_at(pod, &["status", "containerStatuses"]);

    if let Some(statuses) = statuses.as_array() {
        if !statuses.is_empty() && phase == "Running" {
            let all_ready = statuses
                .iter()
                .all(|cs| cs.get("ready").and_then(Value::as_bool).unwrap_or(false));
            return if all_ready {
                "Running".to_string()
            } else {
                "NotReady".to_string()
            };
        }
    }

    phase.to_string()
}

/// Merge `spec.containers` with matching `status.containerStatuses` by name.
fn pod_containers(pod: &Value) -> Vec<ContainerStatus> {
    let empty = Vec::new();
    let spec_containers = value_at(pod, &["spec", "containers"]);
    let spec_containers = spec_containers.as_array().unwrap_or(&empty);
    let status_containers = value_at(pod, &["status", "containerStatuses"]);
    let status_containers = status_containers.as_array().unwrap_or(&empty);

    spec_containers
        .iter()
        .filter_map(|container| {
            let name = container.get("name").and_then(Value::as_str)?;
            let status = status_containers
                .iter()
                .find(|cs| cs.get("name").and_then(Value::as_str) == Some(name));

            Some(ContainerStatus {
                name: name.to_string(),
                image: container
                    .get("image")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                ready: status
                    .and_then(|cs| cs.get("ready"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                restart_count: status
                    .and_then(|cs| cs.get("restartCount"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser() -> ResourceParser {
        ResourceParser::new()
    }

    #[test]
    fn cluster_info_prefers_explicit_name_and_counts_nodes() {
        let raw = json!({
            "name": "reported",
            "serverVersion": "v1.29.2",
            "apiServer": "https://10.0.0.1:6443",
            "nodes": [{}, {}, {}]
        });
        let rec = parser().parse_cluster_info(&raw, Some("prod")).unwrap();
        assert_eq!(rec.cluster_name, "prod");
        assert_eq!(rec.version, "v1.29.2");
        assert_eq!(rec.api_server, "https://10.0.0.1:6443");
        assert_eq!(rec.node_count, 3);
    }

    #[test]
    fn cluster_info_falls_back_to_node_count_field() {
        let raw = json!({"version": "v1.28.0", "server": "https://api", "nodeCount": 5});
        let rec = parser().parse_cluster_info(&raw, Some("dev")).unwrap();
        assert_eq!(rec.node_count, 5);
        assert_eq!(rec.api_server, "https://api");
    }

    #[test]
    fn cluster_info_rejects_non_object_reply() {
        let err = parser().parse_cluster_info(&json!(42), Some("dev"));
        assert!(matches!(err, Err(ScanError::Parse { .. })));
    }

    #[test]
    fn namespaces_skip_unnamed_entries() {
        let raw = vec![
            json!({"metadata": {"name": "default"}, "status": {"phase": "Active"}}),
            json!({"status": {"phase": "Active"}}),
            json!({"metadata": {"name": "kube-system"}}),
        ];
        let records = parser().parse_namespaces(&raw, "prod");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "default");
        assert_eq!(records[0].status, "Active");
        assert_eq!(records[1].status, "Unknown");
    }

    #[test]
    fn node_ready_condition_drives_status() {
        let ready = json!({
            "metadata": {"name": "n1"},
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        });
        let not_ready = json!({
            "metadata": {"name": "n2"},
            "status": {"conditions": [{"type": "Ready", "status": "False"}]}
        });
        let no_condition = json!({"metadata": {"name": "n3"}});

        let p = parser();
        assert_eq!(p.parse_nodes(&[ready], "c")[0].status, "Ready");
        assert_eq!(p.parse_nodes(&[not_ready], "c")[0].status, "NotReady");
        assert_eq!(p.parse_nodes(&[no_condition], "c")[0].status, "Unknown");
    }

    #[test]
    fn node_without_role_labels_defaults_to_worker() {
        let raw = json!({
            "metadata": {"name": "n1", "labels": {"kubernetes.io/hostname": "n1"}}
        });
        let records = parser().parse_nodes(&[raw], "c");
        assert_eq!(records[0].roles, vec!["worker".to_string()]);
    }

    #[test]
    fn node_role_labels_are_extracted() {
        let raw = json!({
            "metadata": {"name": "n1", "labels": {
                "node-role.kubernetes.io/control-plane": "",
                "node-role.kubernetes.io/master": ""
            }}
        });
        let records = parser().parse_nodes(&[raw], "c");
        assert_eq!(records[0].roles, vec!["control-plane", "master"]);
    }

    #[test]
    fn node_capacity_and_taints_copied_verbatim() {
        let raw = json!({
            "metadata": {"name": "n1"},
            "status": {
                "capacity": {"cpu": "4", "memory": "16Gi"},
                "allocatable": {"cpu": "3800m"}
            },
            "spec": {"taints": [{"key": "dedicated", "effect": "NoSchedule"}]}
        });
        let records = parser().parse_nodes(&[raw], "c");
        assert_eq!(records[0].capacity["cpu"], "4");
        assert_eq!(records[0].allocatable["cpu"], "3800m");
        assert_eq!(records[0].taints[0]["key"], "dedicated");
    }

    #[test]
    fn pod_running_requires_all_containers_ready() {
        let all_ready = json!({
            "metadata": {"name": "p1", "namespace": "app"},
            "status": {
                "phase": "Running",
                "containerStatuses": [{"name": "a", "ready": true}, {"name": "b", "ready": true}]
            }
        });
        let one_unready = json!({
            "metadata": {"name": "p2"},
            "status": {
                "phase": "Running",
                "containerStatuses": [{"name": "a", "ready": true}, {"name": "b", "ready": false}]
            }
        });
        let pending = json!({
            "metadata": {"name": "p3"},
            "status": {"phase": "Pending"}
        });

        let p = parser();
        assert_eq!(p.parse_pods(&[all_ready], "c")[0].status, "Running");
        assert_eq!(p.parse_pods(&[one_unready], "c")[0].status, "NotReady");
        assert_eq!(p.parse_pods(&[pending], "c")[0].status, "Pending");
    }

    #[test]
    fn pod_containers_merge_spec_and_status_by_name() {
        let raw = json!({
            "metadata": {"name": "p1"},
            "spec": {
                "nodeName": "n1",
                "containers": [
                    {"name": "app", "image": "app:1.2"},
                    {"name": "sidecar", "image": "envoy:1.30"}
                ]
            },
            "status": {
                "phase": "Running",
                "containerStatuses": [
                    {"name": "sidecar", "ready": true, "restartCount": 2},
                    {"name": "app", "ready": true, "restartCount": 0}
                ]
            }
        });
        let records = parser().parse_pods(&[raw], "c");
        let containers = &records[0].containers;
        assert_eq!(records[0].node_name.as_deref(), Some("n1"));
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "app");
        assert_eq!(containers[0].restart_count, 0);
        assert_eq!(containers[1].name, "sidecar");
        assert_eq!(containers[1].restart_count, 2);
        assert!(containers[1].ready);
    }

    #[test]
    fn service_type_defaults_to_cluster_ip() {
        let raw = json!({"metadata": {"name": "svc"}, "spec": {"clusterIP": "10.96.0.10"}});
        let records = parser().parse_services(&[raw], "c");
        assert_eq!(records[0].service_type, "ClusterIP");
        assert_eq!(records[0].external_ip, None);
    }

    #[test]
    fn load_balancer_external_ip_from_first_ingress() {
        let raw = json!({
            "metadata": {"name": "lb"},
            "spec": {"type": "LoadBalancer"},
            "status": {"loadBalancer": {"ingress": [{"ip": "203.0.113.7"}, {"ip": "203.0.113.8"}]}}
        });
        let records = parser().parse_services(&[raw], "c");
        assert_eq!(records[0].external_ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn non_load_balancer_never_gets_external_ip() {
        let raw = json!({
            "metadata": {"name": "np"},
            "spec": {"type": "NodePort"},
            "status": {"loadBalancer": {"ingress": [{"ip": "203.0.113.7"}]}}
        });
        let records = parser().parse_services(&[raw], "c");
        assert_eq!(records[0].external_ip, None);
    }

    #[test]
    fn deployment_replica_counts() {
        let raw = json!({
            "metadata": {"name": "web", "namespace": "app", "labels": {"app": "web"}},
            "spec": {"replicas": 3, "selector": {"matchLabels": {"app": "web"}}},
            "status": {"readyReplicas": 2, "availableReplicas": 2}
        });
        let records = parser().parse_deployments(&[raw], "c");
        assert_eq!(records[0].replicas, 3);
        assert_eq!(records[0].ready_replicas, 2);
        assert_eq!(records[0].available_replicas, 2);
        assert_eq!(records[0].selector["matchLabels"]["app"], "web");
    }

    #[test]
    fn configmap_counts_keys_without_retaining_values() {
        let raw = json!({
            "metadata": {"name": "cfg", "namespace": "app"},
            "data": {"config.yaml": "a: 1", "extra": "x"},
            "binaryData": {"blob": "aGVsbG8="}
        });
        let records = parser().parse_configmaps(&[raw], "c");
        assert_eq!(records[0].total_keys, 3);
        assert_eq!(records[0].data_keys, vec!["config.yaml", "extra"]);
        assert_eq!(records[0].binary_data_keys, vec!["blob"]);
        let serialized = serde_json::to_string(&records[0]).unwrap();
        assert!(!serialized.contains("a: 1"));
        assert!(!serialized.contains("aGVsbG8="));
    }

    #[test]
    fn secret_values_never_surface() {
        let raw = json!({
            "metadata": {"name": "db-credentials", "namespace": "app"},
            "data": {"password": "aHVudGVyMg=="}
        });
        let records = parser().parse_configmaps(&[raw], "c");
        let serialized = serde_json::to_string(&records[0]).unwrap();
        assert!(serialized.contains("password"));
        assert!(!serialized.contains("aHVudGVyMg=="));
    }

    #[test]
    fn parsing_is_deterministic() {
        let raw = vec![json!({
            "metadata": {"name": "p", "labels": {"b": "2", "a": "1"}},
            "status": {"phase": "Running"}
        })];
        let p = parser();
        let first = p.parse_pods(&raw, "c");
        let second = p.parse_pods(&raw, "c");
        assert_eq!(first, second);
    }

    #[test]
    fn validation_catches_missing_fields_and_bad_enums() {
        let p = parser();

        let pod = json!({"name": "p", "phase": "Sideways"});
        assert!(matches!(
            p.validate_parsed_data(&pod, ResourceKind::Pod, &["name", "phase"]),
            Err(ScanError::Validation { .. })
        ));

        let svc = json!({"name": "s", "service_type": "LoadBalancer"});
        assert!(p
            .validate_parsed_data(&svc, ResourceKind::Service, &["name", "service_type"])
            .is_ok());

        let cluster = json!({"cluster_name": "c", "node_count": -1});
        assert!(matches!(
            p.validate_parsed_data(&cluster, ResourceKind::Cluster, &["cluster_name"]),
            Err(ScanError::Validation { .. })
        ));

        let incomplete = json!({"cluster_name": null, "node_count": 2});
        assert!(matches!(
            p.validate_parsed_data(&incomplete, ResourceKind::Cluster, &["cluster_name"]),
            Err(ScanError::Validation { .. })
        ));
    }

    #[test]
    fn extract_items_handles_all_reply_shapes() {
        assert_eq!(extract_items(&json!([1, 2])).len(), 2);
        assert_eq!(extract_items(&json!({"items": [1, 2, 3]})).len(), 3);
        assert_eq!(extract_items(&json!({"no_items": true})).len(), 0);
        assert_eq!(extract_items(&json!(null)).len(), 0);

        let prose = json!(
            "Here are the namespaces I found:\n{\"items\": [{\"metadata\": {\"name\": \"default\"}}]}\nLet me know if you need more."
        );
        let items = extract_items(&prose);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["metadata"]["name"], "default");
    }

    #[test]
    fn extract_object_unwraps_prose() {
        let prose = json!("The cluster reports: {\"version\": \"v1.29.0\", \"nodeCount\": 2} as of now.");
        let obj = extract_object(&prose);
        assert_eq!(obj["version"], "v1.29.0");
        assert_eq!(extract_object(&json!([1])), Value::Null);
    }

    #[test]
    fn json_from_text_respects_strings_with_braces() {
        let text = r#"result: {"note": "contains } brace", "ok": true} trailing"#;
        let v = json_from_text(text).unwrap();
        assert_eq!(v["ok"], true);
    }

    #[test]
    fn parser_stats_track_counts() {
        let p = parser();
        let raw = vec![json!({"metadata": {"name": "default"}})];
        p.parse_namespaces(&raw, "c");
        p.parse_namespaces(&raw, "c");
        let stats = p.stats();
        assert_eq!(stats.parsed_count, 2);
        assert_eq!(stats.error_count, 0);
        assert!(stats.success_rate > 99.0);
    }
}
