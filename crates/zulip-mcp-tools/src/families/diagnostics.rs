// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Diagnostics: a single read-only tool exposing the process-wide metrics
//! snapshot (spec §9 "Metric duplication caution" — one metrics system,
//! surfaced here rather than over a separate scrape endpoint since the
//! only transport this process speaks is MCP stdio).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::registry::{Tool, ToolCall, ToolOutput};

pub struct StatusTool;

#[async_trait]
impl Tool for StatusTool {
    fn name(&self) -> &str {
        "diagnostics.status"
    }
    fn description(&self) -> &str {
        "Report process metrics: tool invocation counts, HTTP request durations, cache hit/miss, listener re-registrations, and AFK transitions."
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "additionalProperties": false })
    }

    async fn execute(&self, _ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        ToolOutput::ok(&call.id, json!({ "metrics": zulip_mcp_config::Metrics::global().snapshot() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ToolContext;
    use std::sync::Arc;
    use zulip_mcp_config::{CacheConfig, Credentials, RestConfig};
    use zulip_mcp_rest::{IdentityRegistry, RestClient};
    use zulip_mcp_store::Store;

    fn test_ctx() -> (tempfile::TempDir, ToolContext) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::init(dir.path().join("s.db")).unwrap());
        let identities = Arc::new(IdentityRegistry::new(Credentials::default()));
        let rest = Arc::new(RestClient::new(identities, store.clone(), RestConfig::default(), CacheConfig::default()).unwrap());
        (dir, ToolContext::new(rest, store, Default::default()))
    }

    #[tokio::test]
    async fn status_reports_a_metrics_object() {
        let (_dir, ctx) = test_ctx();
        let out = StatusTool.execute(&ctx, &ToolCall { id: "1".into(), name: "diagnostics.status".into(), args: json!({}) }).await;
        assert!(!out.is_error);
        assert!(out.value["metrics"].get("cache").is_some());
    }
}
