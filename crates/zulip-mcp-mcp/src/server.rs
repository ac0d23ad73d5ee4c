// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! [`ZulipMcpServer`] — the rmcp [`ServerHandler`] implementation (spec
//! §4.9 C9 MCP Dispatcher). On each invocation it drops null parameters
//! (delegated to [`zulip_mcp_tools::ToolRegistry::execute`]), validates via
//! C4 inside the tool itself, routes to the named tool, and wraps the
//! result into an MCP content payload. No business logic lives here.

use std::sync::Arc;

use rmcp::{
    handler::server::ServerHandler,
    model::{CallToolRequestParams, CallToolResult, ListToolsResult, PaginatedRequestParams, ServerCapabilities, ServerInfo},
    service::{RequestContext, RoleServer},
    ErrorData as McpError,
};
use uuid::Uuid;
use zulip_mcp_tools::{ToolCall, ToolContext, ToolRegistry};

use crate::bridge::{output_to_call_result, schema_to_mcp_tool};

/// The MCP server — wraps a [`ToolRegistry`] plus the [`ToolContext`]
/// (store, REST client, agents config) every tool needs, and speaks the
/// MCP protocol over whatever transport `rmcp::ServiceExt::serve` is given.
#[derive(Clone)]
pub struct ZulipMcpServer {
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
}

impl ZulipMcpServer {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self { registry, ctx }
    }
}

impl ServerHandler for ZulipMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo { capabilities: ServerCapabilities::builder().enable_tools().build(), ..ServerInfo::default() }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let registry = self.registry.clone();
        async move {
            let tools = registry.schemas().into_iter().map(schema_to_mcp_tool).collect();
            Ok(ListToolsResult { tools, next_cursor: None, meta: None })
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request
            .arguments
            .map(|m| serde_json::Value::Object(m.into_iter().collect()))
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let call = ToolCall { id: Uuid::new_v4().to_string(), name: request.name.to_string(), args };

        let start = std::time::Instant::now();
        let output = self.registry.execute(&self.ctx, &call).await;
        let status = if output.is_error { "error" } else { "success" };
        tracing::info!(tool = %call.name, status, duration_ms = start.elapsed().as_millis() as u64, "tool invocation");
        zulip_mcp_config::Metrics::global().record_tool_invocation(&call.name, status);
        Ok(output_to_call_result(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use zulip_mcp_config::{CacheConfig, Credentials, RestConfig};
    use zulip_mcp_rest::{IdentityRegistry, RestClient};

    fn test_server() -> (tempfile::TempDir, ZulipMcpServer) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(zulip_mcp_store::Store::init(dir.path().join("s.db")).unwrap());
        let identities = Arc::new(IdentityRegistry::new(Credentials::default()));
        let rest = Arc::new(RestClient::new(identities, store.clone(), RestConfig::default(), CacheConfig::default()).unwrap());
        let ctx = ToolContext::new(rest, store, Default::default());
        let server = ZulipMcpServer::new(Arc::new(ToolRegistry::new()), ctx);
        (dir, server)
    }

    #[test]
    fn get_info_enables_tools_capability() {
        let (_dir, server) = test_server();
        let info = server.get_info();
        assert!(info.capabilities.tools.is_some(), "tools capability must be enabled");
    }

    #[test]
    fn get_info_has_no_resources_or_prompts_capability() {
        let (_dir, server) = test_server();
        let info = server.get_info();
        assert!(info.capabilities.resources.is_none());
        assert!(info.capabilities.prompts.is_none());
    }

    #[test]
    fn server_is_cloneable() {
        let (_dir, server) = test_server();
        let _clone = server.clone();
    }

    #[test]
    fn empty_registry_server_reports_no_tools_in_schema() {
        let (_dir, server) = test_server();
        assert!(server.registry.schemas().is_empty());
    }
}
