use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::Tier;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    pub agent: AgentConfig,
    /// Per-kind tool id overrides, e.g. `pod = "LIST_CORE_RESOURCES_V2"`.
    #[serde(default)]
    pub tools: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// TTL for slow-changing resources (cluster, namespaces, nodes).
    #[serde(default = "default_static_ttl_secs")]
    pub static_ttl_secs: u64,
    /// TTL for fast-changing resources (pods, services, deployments, config objects).
    #[serde(default = "default_dynamic_ttl_secs")]
    pub dynamic_ttl_secs: u64,
    /// Retries per tier after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff; the delay before retry N is `retry_delay_secs * N`.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Wall-clock budget for a single tool call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Step budget handed to the tool-invocation agent per call.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            static_ttl_secs: default_static_ttl_secs(),
            dynamic_ttl_secs: default_dynamic_ttl_secs(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
            max_steps: default_max_steps(),
        }
    }
}

impl ScanConfig {
    /// TTL in seconds for records of the given tier.
    pub fn ttl_secs(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Static => self.static_ttl_secs,
            Tier::Dynamic => self.dynamic_ttl_secs,
        }
    }
}

fn default_static_ttl_secs() -> u64 {
    1800
}
fn default_dynamic_ttl_secs() -> u64 {
    300
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    5
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_steps() -> u32 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// HTTP endpoint of the tool-invocation agent.
    pub endpoint: String,
    /// Transport-level backstop; the scanner enforces the real scan timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    300
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.scan.static_ttl_secs == 0 || config.scan.dynamic_ttl_secs == 0 {
        anyhow::bail!("scan TTLs must be > 0");
    }

    if config.scan.timeout_secs == 0 {
        anyhow::bail!("scan.timeout_secs must be > 0");
    }

    if config.scan.max_steps == 0 {
        anyhow::bail!("scan.max_steps must be > 0");
    }

    if config.agent.endpoint.is_empty() {
        anyhow::bail!("agent.endpoint must be set");
    }

    for kind in config.tools.keys() {
        if kind.parse::<crate::models::ResourceKind>().is_err() {
            anyhow::bail!("Unknown resource kind in [tools]: '{}'", kind);
        }
    }

    Ok(config)
}

impl Config {
    /// Minimal in-memory config for tooling and tests.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/kubecache.sqlite"),
            },
            scan: ScanConfig::default(),
            agent: AgentConfig {
                endpoint: "http://127.0.0.1:7410/run".to_string(),
                request_timeout_secs: default_request_timeout_secs(),
            },
            tools: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_defaults() {
        let scan = ScanConfig::default();
        assert_eq!(scan.static_ttl_secs, 1800);
        assert_eq!(scan.dynamic_ttl_secs, 300);
        assert_eq!(scan.max_retries, 3);
        assert_eq!(scan.retry_delay_secs, 5);
        assert_eq!(scan.timeout_secs, 120);
    }

    #[test]
    fn ttl_by_tier() {
        let scan = ScanConfig::default();
        assert_eq!(scan.ttl_secs(Tier::Static), 1800);
        assert_eq!(scan.ttl_secs(Tier::Dynamic), 300);
    }
}
