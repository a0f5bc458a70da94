//! Error taxonomy for the scan pipeline.
//!
//! Every error carries an [`ErrorContext`] describing the operation that
//! failed: which cluster, which tool, how long the call ran. The coordinator
//! catches all of these per tier and records them into the scan result
//! instead of aborting the session, so the variants exist mainly to let
//! callers (and tests) distinguish timeouts from connectivity problems from
//! bad data.

use serde::Serialize;
use std::fmt;

/// Structured context attached to every scan error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorContext {
    /// The operation that failed (e.g. `"scan_static_resources"`).
    pub operation: String,
    /// Target cluster, when known.
    pub cluster: Option<String>,
    /// Resolved tool identifier, when the failure happened at the tool boundary.
    pub tool: Option<String>,
    /// Instruction parameters, rendered as `key=value` pairs.
    pub params: Option<String>,
    /// Wall-clock time spent before the failure, in milliseconds.
    pub elapsed_ms: Option<u64>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn params(mut self, params: impl Into<String>) -> Self {
        self.params = Some(params.into());
        self
    }

    pub fn elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op={}", self.operation)?;
        if let Some(cluster) = &self.cluster {
            write!(f, " cluster={}", cluster)?;
        }
        if let Some(tool) = &self.tool {
            write!(f, " tool={}", tool)?;
        }
        if let Some(params) = &self.params {
            write!(f, " params=[{}]", params)?;
        }
        if let Some(ms) = self.elapsed_ms {
            write!(f, " elapsed={}ms", ms)?;
        }
        Ok(())
    }
}

/// Errors produced by the scanner, parser, catalog, and coordinator.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A tool call exceeded the wall-clock timeout.
    #[error("scan timed out after {timeout_secs}s ({context})")]
    Timeout {
        timeout_secs: u64,
        context: ErrorContext,
    },

    /// The agent could not reach the cluster or the agent endpoint.
    #[error("cluster connection failed: {message} ({context})")]
    Connection {
        message: String,
        context: ErrorContext,
    },

    /// Capability lookup found no tool for the requested operation.
    #[error("no tool available for {tool} ({context})")]
    ToolNotFound { tool: String, context: ErrorContext },

    /// The tool catalog itself is unusable.
    #[error("tool discovery failed: {message} ({context})")]
    Discovery {
        message: String,
        context: ErrorContext,
    },

    /// A reply could not be turned into typed records.
    #[error("resource parse failed: {message} ({context})")]
    Parse {
        message: String,
        context: ErrorContext,
    },

    /// A parsed record violated a kind-specific invariant.
    #[error("validation failed: {message} ({context})")]
    Validation {
        message: String,
        context: ErrorContext,
    },

    /// The record store rejected an operation.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Anything that does not fit the variants above.
    #[error("scan failed: {message} ({context})")]
    Other {
        message: String,
        context: ErrorContext,
    },
}

impl ScanError {
    /// The context attached to this error, if the variant carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            ScanError::Timeout { context, .. }
            | ScanError::Connection { context, .. }
            | ScanError::ToolNotFound { context, .. }
            | ScanError::Discovery { context, .. }
            | ScanError::Parse { context, .. }
            | ScanError::Validation { context, .. }
            | ScanError::Other { context, .. } => Some(context),
            ScanError::Store(_) => None,
        }
    }

    pub fn other(message: impl Into<String>, context: ErrorContext) -> Self {
        ScanError::Other {
            message: message.into(),
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_display_includes_all_fields() {
        let ctx = ErrorContext::new("call_tool")
            .cluster("prod")
            .tool("LIST_NODES")
            .params("cluster=prod")
            .elapsed_ms(42);
        let s = ctx.to_string();
        assert!(s.contains("op=call_tool"));
        assert!(s.contains("cluster=prod"));
        assert!(s.contains("tool=LIST_NODES"));
        assert!(s.contains("elapsed=42ms"));
    }

    #[test]
    fn timeout_error_mentions_budget() {
        let err = ScanError::Timeout {
            timeout_secs: 120,
            context: ErrorContext::new("call_tool").tool("LIST_PODS"),
        };
        assert!(err.to_string().contains("120s"));
        assert_eq!(err.context().unwrap().tool.as_deref(), Some("LIST_PODS"));
    }
}
