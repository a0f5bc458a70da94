//! Tool-invocation agent boundary.
//!
//! The scanner never talks to a cluster directly; it hands a natural-language
//! instruction naming a resolved tool id to a [`ToolAgent`] and gets back an
//! opaque reply. The default implementation, [`HttpToolAgent`], posts the
//! instruction to an agent endpoint and returns whatever JSON comes back,
//! possibly a structured list, possibly prose wrapping one. Tolerating that
//! is the parser's job, not the agent's.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::AgentConfig;
use crate::error::{ErrorContext, ScanError};

/// External capability that resolves a named operation against the cluster.
///
/// Implementations must not retry: the coordinator owns retry policy, so a
/// single `run` call is a single attempt. Wall-clock timeouts are enforced
/// by the scanner around this call.
#[async_trait]
pub trait ToolAgent: Send + Sync {
    /// Execute one instruction with the given step budget and return the
    /// raw reply.
    async fn run(&self, instruction: &str, max_steps: u32) -> Result<Value, ScanError>;
}

/// [`ToolAgent`] backed by an HTTP agent endpoint.
///
/// Sends `POST {endpoint}` with `{"instruction": ..., "max_steps": ...}` and
/// returns the response body as JSON. If the body is not JSON it is returned
/// as a JSON string, which the parser's reply coercion handles downstream.
pub struct HttpToolAgent {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpToolAgent {
    pub fn new(config: &AgentConfig) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ScanError::Connection {
                message: format!("failed to build HTTP client: {}", e),
                context: ErrorContext::new("agent_init"),
            })?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            client,
        })
    }
}

#[async_trait]
impl ToolAgent for HttpToolAgent {
    async fn run(&self, instruction: &str, max_steps: u32) -> Result<Value, ScanError> {
        let started = std::time::Instant::now();
        let ctx = || {
            ErrorContext::new("agent_run").elapsed_ms(started.elapsed().as_millis() as u64)
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "instruction": instruction,
                "max_steps": max_steps,
            }))
            .send()
            .await
            .map_err(|e| ScanError::Connection {
                message: format!("agent request failed: {}", e),
                context: ctx(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ScanError::Connection {
            message: format!("failed to read agent response: {}", e),
            context: ctx(),
        })?;

        if !status.is_success() {
            return Err(ScanError::Connection {
                message: format!("agent returned HTTP {}: {}", status, truncate(&body, 200)),
                context: ctx(),
            });
        }

        // Prefer structured JSON; fall back to the body as a string reply.
        let reply = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));

        // Some agent frontends wrap the payload in {"result": ...}.
        if let Value::Object(map) = &reply {
            if let Some(result) = map.get("result") {
                return Ok(result.clone());
            }
        }

        Ok(reply)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 2), "he");
        assert_eq!(truncate("héllo", 2), "hé");
    }
}
