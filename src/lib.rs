//! # kubecache
//!
//! A TTL-cached Kubernetes cluster scanner. kubecache drives an external
//! tool-invocation agent to enumerate cluster resources, parses the replies
//! into typed records, and persists them in SQLite with per-tier TTLs so
//! downstream consumers read fresh data without hammering the cluster.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐
//! │ Tool Agent │──▶│  Scanner  │──▶│  Parser   │──▶│  SQLite  │
//! │   (HTTP)   │   │ 2 tiers   │   │ typed     │   │ TTL rows │
//! └────────────┘   └───────────┘   └───────────┘   └────┬─────┘
//!                        ▲                              │
//!                        └────────── Coordinator ◀──────┘
//!                                  retries + metadata
//! ```
//!
//! Static resources (cluster, namespaces, nodes) are cached for 30 minutes;
//! dynamic ones (pods, services, deployments, configmaps, secrets) for 5.
//! Each tier retries independently and records its outcome in a scan-history
//! table, so one broken tier never blocks the other.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Resource kinds, typed records, scan results |
//! | [`agent`] | Tool-invocation agent boundary |
//! | [`catalog`] | Resource kind → tool id mapping |
//! | [`scanner`] | Tiered resource scanning with timeouts |
//! | [`parser`] | Reply extraction into typed records |
//! | [`store`] | TTL-aware record store and scan history |
//! | [`coordinator`] | Scan sessions, retries, health |
//! | [`report`] | CLI command implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agent;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod parser;
pub mod report;
pub mod scanner;
pub mod store;
