// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `zulip-mcp-mcp` — the MCP (Model Context Protocol) stdio dispatcher
//! (spec §4.9, C9).
//!
//! Exposes the full `zulip-mcp-tools` tool surface to any MCP-compatible
//! host (Claude Desktop, Cursor, etc.) over **stdio** transport using
//! line-delimited JSON-RPC. All log output must go to stderr: stdout is
//! the transport.
//!
//! # Architecture
//!
//! ```text
//! MCP host (stdio JSON-RPC)
//!       │
//!       ▼
//! ZulipMcpServer (rmcp ServerHandler)
//!       │
//!       ▼
//! ToolRegistry ──► Tool::execute(ctx, call)
//! ```

pub mod bridge;
pub mod server;

pub use server::ZulipMcpServer;

use std::sync::Arc;

use anyhow::Result;
use rmcp::ServiceExt;
use zulip_mcp_tools::{ToolContext, ToolRegistry};

/// Start an MCP stdio server serving `registry` against `ctx`. Blocks until
/// the client disconnects (stdin EOF) or the process is terminated — this
/// is the sole operation of the default `zulip-mcp serve` command (spec
/// §4.12 bootstrap).
pub async fn serve_stdio(registry: Arc<ToolRegistry>, ctx: ToolContext) -> Result<()> {
    let server = ZulipMcpServer::new(registry, ctx);
    let running = server
        .serve((tokio::io::stdin(), tokio::io::stdout()))
        .await
        .map_err(|e| anyhow::anyhow!("MCP server init error: {e}"))?;
    running.waiting().await.map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;
    Ok(())
}
