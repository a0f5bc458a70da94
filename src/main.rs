//! # kubecache CLI
//!
//! The `kubecache` binary scans Kubernetes clusters through a tool-invocation
//! agent and maintains a local TTL-expiring cache of the results.
//!
//! ## Usage
//!
//! ```bash
//! kubecache --config ./config/kubecache.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kubecache init` | Create the SQLite database and run schema migrations |
//! | `kubecache scan <cluster>` | Run a full two-tier scan of a cluster |
//! | `kubecache list` | Show cached records, filtered by kind/cluster/namespace |
//! | `kubecache history <cluster>` | Show recent scan outcomes for a cluster |
//! | `kubecache health` | Component health rollup |
//! | `kubecache cleanup` | Remove TTL-expired records |
//! | `kubecache stats` | Cache contents and tool catalog overview |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! kubecache init
//!
//! # Scan everything in one cluster
//! kubecache scan prod-east
//!
//! # Re-scan only the fast-changing tier, one namespace
//! kubecache scan prod-east --dynamic-only --namespace payments
//!
//! # Inspect what's cached
//! kubecache list --kind pod --cluster prod-east
//! kubecache history prod-east
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kubecache::{config, migrate, models::ResourceKind, report};

/// kubecache — a TTL-cached Kubernetes cluster scanner driven by a
/// tool-invocation agent.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kubecache.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kubecache",
    about = "kubecache — TTL-cached Kubernetes cluster scanning through a tool-invocation agent",
    version,
    long_about = "kubecache scans Kubernetes clusters in two freshness tiers (static: cluster, \
    namespaces, nodes; dynamic: pods, services, deployments, configmaps, secrets), parses agent \
    replies into typed records, and caches them in SQLite with per-tier TTLs. Failed tiers retry \
    with bounded backoff and never block each other."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/kubecache.toml`. Database, scan, agent, and
    /// tool-override settings are read from this file.
    #[arg(long, global = true, default_value = "./config/kubecache.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the resources and scan_metadata
    /// tables. This command is idempotent; running it multiple times is safe.
    Init,

    /// Scan a cluster and cache the results.
    ///
    /// Runs the static tier (cluster info, namespaces, nodes) and the dynamic
    /// tier (pods, services, deployments, configmaps, secrets) with
    /// independent retry budgets. A tier that fails after all retries is
    /// reported in the summary; the other tier's records still land.
    Scan {
        /// Cluster name to scan, as the agent's tools understand it.
        cluster: String,

        /// Scan only the static tier.
        #[arg(long, conflicts_with = "dynamic_only")]
        static_only: bool,

        /// Scan only the dynamic tier.
        #[arg(long)]
        dynamic_only: bool,

        /// Limit the dynamic tier to one namespace.
        #[arg(long)]
        namespace: Option<String>,

        /// Print the full scan result as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// List cached records.
    ///
    /// Expired records are hidden unless `--include-stale` is given.
    List {
        /// Filter by resource kind (e.g. `pod`, `service`, `node`).
        #[arg(long)]
        kind: Option<ResourceKind>,

        /// Filter by cluster name.
        #[arg(long)]
        cluster: Option<String>,

        /// Filter by namespace.
        #[arg(long)]
        namespace: Option<String>,

        /// Include records past their TTL.
        #[arg(long)]
        include_stale: bool,

        /// Maximum number of records to print.
        #[arg(long)]
        limit: Option<i64>,

        /// Print record data as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show recent scan outcomes for a cluster, newest first.
    History {
        /// Cluster name.
        cluster: String,

        /// Maximum number of history rows.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Component health rollup (store, scanner, parser).
    Health {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove TTL-expired records from the cache.
    Cleanup,

    /// Cache contents and tool catalog overview.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Scan {
            cluster,
            static_only,
            dynamic_only,
            namespace,
            json,
        } => {
            report::run_scan(
                &cfg,
                &cluster,
                static_only,
                dynamic_only,
                namespace.as_deref(),
                json,
            )
            .await?;
        }
        Commands::List {
            kind,
            cluster,
            namespace,
            include_stale,
            limit,
            json,
        } => {
            report::run_list(&cfg, kind, cluster, namespace, include_stale, limit, json).await?;
        }
        Commands::History { cluster, limit } => {
            report::run_history(&cfg, &cluster, limit).await?;
        }
        Commands::Health { json } => {
            report::run_health(&cfg, json).await?;
        }
        Commands::Cleanup => {
            report::run_cleanup(&cfg).await?;
        }
        Commands::Stats => {
            report::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
