// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! The tool trait and registry (spec §4.5, §4.9). Each tool is one named
//! operation within one of the seven families; the MCP Dispatcher routes
//! calls here by name and never embeds business logic of its own.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::validator::drop_nulls;

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// A tool's result: already-normalized JSON (the `{status: "success", ...}`
/// shape on the happy path, or `{status: "error", error: {...}}` per spec
/// §4.4 on failure).
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub value: Value,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, data: Value) -> Self {
        let mut value = serde_json::json!({ "status": "success" });
        if let Value::Object(data_map) = data {
            if let Value::Object(map) = &mut value {
                map.extend(data_map);
            }
        } else {
            value["data"] = data;
        }
        Self { call_id: call_id.into(), value, is_error: false }
    }

    pub fn partial(call_id: impl Into<String>, data: Value, note: impl Into<String>) -> Self {
        let mut out = Self::ok(call_id, data);
        out.value["status"] = Value::String("partial_success".to_string());
        out.value["capability_note"] = Value::String(note.into());
        out
    }

    pub fn skipped(call_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            value: serde_json::json!({ "status": "skipped", "reason": reason.into() }),
            is_error: false,
        }
    }

    pub fn err(call_id: impl Into<String>, error: ToolError) -> Self {
        Self { call_id: call_id.into(), value: error.into_response(), is_error: true }
    }
}

/// Describes a tool for the MCP handshake (spec §4.9 "Advertises tool
/// names, parameter schemas, and human descriptions").
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput;
}

/// Central registry of every tool across all seven families.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema { name: t.name().to_string(), description: t.description().to_string(), parameters: t.parameters_schema() })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Dispatch a call: drop nulls (spec §4.4), then route to the named
    /// tool. Unknown tool names return a structured error rather than a
    /// panic or bare string.
    pub async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let cleaned = ToolCall { id: call.id.clone(), name: call.name.clone(), args: drop_nulls(&call.args) };
        match self.tools.get(&cleaned.name) {
            Some(tool) => tool.execute(ctx, &cleaned).await,
            None => ToolOutput::err(&cleaned.id, ToolError::new("unknown_tool", format!("no such tool: {}", cleaned.name))),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, _ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, call.args.clone())
        }
    }

    fn test_ctx() -> (tempfile::TempDir, ToolContext) {
        use zulip_mcp_config::{CacheConfig, Credentials, RestConfig};
        use zulip_mcp_rest::{IdentityRegistry, RestClient};

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(zulip_mcp_store::Store::init(dir.path().join("s.db")).unwrap());
        let identities = Arc::new(IdentityRegistry::new(Credentials::default()));
        let rest = Arc::new(RestClient::new(identities, store.clone(), RestConfig::default(), CacheConfig::default()).unwrap());
        (dir, ToolContext::new(rest, store, Default::default()))
    }

    #[tokio::test]
    async fn execute_known_tool_drops_nulls_first() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let (_dir, ctx) = test_ctx();
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({"a": 1, "b": null}) };
        let out = registry.execute(&ctx, &call).await;
        assert!(!out.is_error);
        assert!(out.value.get("b").is_none());
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_structured_error() {
        let registry = ToolRegistry::new();
        let (_dir, ctx) = test_ctx();
        let call = ToolCall { id: "1".into(), name: "nope".into(), args: json!({}) };
        let out = registry.execute(&ctx, &call).await;
        assert!(out.is_error);
        assert_eq!(out.value["error"]["code"], "unknown_tool");
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert_eq!(registry.names(), vec!["echo".to_string()]);
    }
}
