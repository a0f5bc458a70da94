//! Capability lookup: resource kind → concrete tool identifier.
//!
//! The catalog ships with the built-in mapping the agent side exposes and
//! accepts per-kind overrides from `[tools]` in the config. A kind whose
//! mapping has been blanked out surfaces as [`ScanError::ToolNotFound`],
//! which the coordinator records like any other tier failure.

use std::collections::BTreeMap;

use crate::error::{ErrorContext, ScanError};
use crate::models::ResourceKind;

/// Maps each resource kind to the tool id embedded in scan instructions.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    entries: BTreeMap<ResourceKind, String>,
}

impl ToolCatalog {
    /// Built-in tool ids for the list/get operations the scanner issues.
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(ResourceKind::Cluster, "GET_CLUSTER_INFO".to_string());
        entries.insert(ResourceKind::Namespace, "LIST_NAMESPACES".to_string());
        entries.insert(ResourceKind::Node, "LIST_NODES".to_string());
        entries.insert(ResourceKind::Pod, "LIST_CORE_RESOURCES".to_string());
        entries.insert(ResourceKind::Service, "LIST_CORE_RESOURCES".to_string());
        entries.insert(ResourceKind::Deployment, "LIST_APPS_RESOURCES".to_string());
        entries.insert(ResourceKind::ConfigMap, "LIST_CORE_RESOURCES".to_string());
        entries.insert(ResourceKind::Secret, "LIST_CORE_RESOURCES".to_string());
        Self { entries }
    }

    /// Built-in mapping with config overrides applied. Keys must already be
    /// validated as resource kinds (load_config does this); unparseable keys
    /// are reported as a discovery error for callers that bypass it.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, ScanError> {
        let mut catalog = Self::builtin();
        for (kind_str, tool) in overrides {
            let kind: ResourceKind =
                kind_str
                    .parse()
                    .map_err(|e: String| ScanError::Discovery {
                        message: e,
                        context: ErrorContext::new("catalog_overrides"),
                    })?;
            if tool.trim().is_empty() {
                // Blank override disables the kind; resolve() reports it.
                catalog.entries.remove(&kind);
            } else {
                catalog.entries.insert(kind, tool.clone());
            }
        }
        Ok(catalog)
    }

    /// Look up the tool id for a kind.
    pub fn resolve(&self, kind: ResourceKind) -> Result<&str, ScanError> {
        self.entries
            .get(&kind)
            .map(String::as_str)
            .ok_or_else(|| ScanError::ToolNotFound {
                tool: format!("list_{}", kind.table()),
                context: ErrorContext::new("catalog_resolve"),
            })
    }

    /// All (kind, tool id) pairs, for `kubecache stats`-style listings.
    pub fn entries(&self) -> impl Iterator<Item = (ResourceKind, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_resolves_every_kind() {
        let catalog = ToolCatalog::builtin();
        for kind in ResourceKind::ALL {
            assert!(catalog.resolve(kind).is_ok(), "no tool for {}", kind);
        }
        assert_eq!(
            catalog.resolve(ResourceKind::Deployment).unwrap(),
            "LIST_APPS_RESOURCES"
        );
    }

    #[test]
    fn override_replaces_builtin() {
        let mut overrides = BTreeMap::new();
        overrides.insert("pod".to_string(), "LIST_PODS_V2".to_string());
        let catalog = ToolCatalog::with_overrides(&overrides).unwrap();
        assert_eq!(catalog.resolve(ResourceKind::Pod).unwrap(), "LIST_PODS_V2");
        assert_eq!(
            catalog.resolve(ResourceKind::Service).unwrap(),
            "LIST_CORE_RESOURCES"
        );
    }

    #[test]
    fn blank_override_surfaces_tool_not_found() {
        let mut overrides = BTreeMap::new();
        overrides.insert("secret".to_string(), "".to_string());
        let catalog = ToolCatalog::with_overrides(&overrides).unwrap();
        match catalog.resolve(ResourceKind::Secret) {
            Err(ScanError::ToolNotFound { .. }) => {}
            other => panic!("expected ToolNotFound, got {:?}", other.map(|s| s.to_string())),
        }
    }

    #[test]
    fn unknown_kind_is_discovery_error() {
        let mut overrides = BTreeMap::new();
        overrides.insert("daemonset".to_string(), "X".to_string());
        assert!(matches!(
            ToolCatalog::with_overrides(&overrides),
            Err(ScanError::Discovery { .. })
        ));
    }
}
