// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! End-to-end integration tests for the zulip-mcp MCP server.
//!
//! Each test drives a real [`ZulipMcpServer`] over in-memory duplex pipes,
//! sending raw JSON-RPC 2.0 messages and validating the responses. This
//! exercises the full rmcp dispatch path and confirms the tool-surface ↔
//! MCP bridge behaves correctly from a client's perspective, using raw JSON
//! rather than an rmcp client so tests stay independent of that API.

use std::sync::Arc;

use rmcp::ServiceExt;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, WriteHalf};
use zulip_mcp_config::{CacheConfig, Credentials, RestConfig};
use zulip_mcp_mcp::ZulipMcpServer;
use zulip_mcp_rest::{IdentityRegistry, RestClient};
use zulip_mcp_store::Store;
use zulip_mcp_tools::ToolContext;

fn test_ctx(dir: &std::path::Path) -> ToolContext {
    let store = Arc::new(Store::init(dir.join("s.db")).unwrap());
    let identities = Arc::new(IdentityRegistry::new(Credentials::default()));
    let rest = Arc::new(RestClient::new(identities, store.clone(), RestConfig::default(), CacheConfig::default()).unwrap());
    ToolContext::new(rest, store, Default::default())
}

async fn start_test_server(ctx: ToolContext) -> (WriteHalf<DuplexStream>, BufReader<tokio::io::ReadHalf<DuplexStream>>) {
    let (client_stream, server_stream) = tokio::io::duplex(65536);
    let registry = Arc::new(zulip_mcp_tools::build_registry());

    tokio::spawn(async move {
        let server = ZulipMcpServer::new(registry, ctx);
        if let Ok(running) = server.serve(server_stream).await {
            let _ = running.waiting().await;
        }
    });

    let (client_read, client_write) = tokio::io::split(client_stream);
    let reader = BufReader::new(client_read);
    (client_write, reader)
}

async fn send_msg(writer: &mut WriteHalf<DuplexStream>, msg: &Value) {
    let line = serde_json::to_string(msg).expect("message must serialize");
    writer.write_all(line.as_bytes()).await.expect("write failed");
    writer.write_all(b"\n").await.expect("newline write failed");
    writer.flush().await.expect("flush failed");
}

async fn recv_msg(reader: &mut BufReader<tokio::io::ReadHalf<DuplexStream>>) -> Value {
    let mut line = String::new();
    tokio::time::timeout(std::time::Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for server response")
        .expect("read error");
    serde_json::from_str(line.trim()).expect("server response must be valid JSON")
}

async fn initialize(writer: &mut WriteHalf<DuplexStream>, reader: &mut BufReader<tokio::io::ReadHalf<DuplexStream>>) -> Value {
    send_msg(
        writer,
        &json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "zulip-mcp-test-client", "version": "0.0.0" }
            }
        }),
    )
    .await;

    let init_resp = recv_msg(reader).await;
    assert_eq!(init_resp["jsonrpc"], "2.0", "initialize response must be JSON-RPC 2.0");
    assert!(init_resp["result"].is_object(), "initialize must return a result object");

    send_msg(writer, &json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })).await;

    init_resp["result"].clone()
}

#[tokio::test]
async fn initialize_declares_tools_capability() {
    let dir = tempfile::tempdir().unwrap();
    let (mut writer, mut reader) = start_test_server(test_ctx(dir.path())).await;
    let result = initialize(&mut writer, &mut reader).await;
    assert!(result["capabilities"]["tools"].is_object(), "server must advertise tools capability; got: {result}");
}

/// `tools/list` returns the full ~40-45 tool surface (spec §6) including
/// representative names from each of the seven families.
#[tokio::test]
async fn tools_list_returns_full_surface() {
    let dir = tempfile::tempdir().unwrap();
    let (mut writer, mut reader) = start_test_server(test_ctx(dir.path())).await;
    initialize(&mut writer, &mut reader).await;

    send_msg(&mut writer, &json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {} })).await;

    let resp = recv_msg(&mut reader).await;
    let tools = resp["result"]["tools"].as_array().expect("tools must be an array");
    assert!(tools.len() >= 35, "expected at least 35 registered tools; got {}", tools.len());

    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    for expected in ["messaging.send", "streams.manage_streams", "events.register", "users.list", "search.advanced_search", "files.upload", "agents.register_agent", "chain.execute"] {
        assert!(names.contains(&expected), "expected {expected} in tools/list; got {names:?}");
    }
}

#[tokio::test]
async fn tools_list_includes_input_schema() {
    let dir = tempfile::tempdir().unwrap();
    let (mut writer, mut reader) = start_test_server(test_ctx(dir.path())).await;
    initialize(&mut writer, &mut reader).await;

    send_msg(&mut writer, &json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {} })).await;

    let resp = recv_msg(&mut reader).await;
    let tools = resp["result"]["tools"].as_array().unwrap();
    let send_tool = tools.iter().find(|t| t["name"] == "messaging.send").expect("messaging.send must be present");
    let schema = &send_tool["inputSchema"];
    assert_eq!(schema["type"], "object");
    assert!(schema["properties"]["content"].is_object());
}

/// A tool-level validation error (spec §4.4) surfaces as `isError: true`
/// with the structured `{status:"error", error:{...}}` body serialized as
/// the content text, not a JSON-RPC protocol-level error.
#[tokio::test]
async fn tools_call_validation_error_sets_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let (mut writer, mut reader) = start_test_server(test_ctx(dir.path())).await;
    initialize(&mut writer, &mut reader).await;

    send_msg(
        &mut writer,
        &json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": { "name": "messaging.send", "arguments": { "type": "stream", "to": "general", "content": "hi" } }
        }),
    )
    .await;

    let resp = recv_msg(&mut reader).await;
    assert_eq!(resp["result"]["isError"], true, "missing required 'topic' must fail validation; got {resp}");
    let content = resp["result"]["content"].as_array().expect("content must be an array");
    let text = content[0]["text"].as_str().unwrap_or("");
    let body: Value = serde_json::from_str(text).expect("error body must be valid JSON");
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["code"], "validation_error");
}

/// AFK status is a read-only store query — no network call needed — a good
/// end-to-end smoke test of a successful `tools/call`.
#[tokio::test]
async fn tools_call_afk_status_succeeds_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let (mut writer, mut reader) = start_test_server(test_ctx(dir.path())).await;
    initialize(&mut writer, &mut reader).await;

    send_msg(
        &mut writer,
        &json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": { "name": "agents.afk_status", "arguments": {} } }),
    )
    .await;

    let resp = recv_msg(&mut reader).await;
    assert_eq!(resp["result"]["isError"], false, "afk_status must succeed; got {resp}");
    let content = resp["result"]["content"].as_array().unwrap();
    let body: Value = serde_json::from_str(content[0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["is_afk"], false);
}

/// Calling an unknown tool name returns a result with `isError: true`
/// (not a JSON-RPC protocol error) — the registry wraps it as a structured
/// `ToolOutput::err`.
#[tokio::test]
async fn tools_call_unknown_tool_is_tool_level_error() {
    let dir = tempfile::tempdir().unwrap();
    let (mut writer, mut reader) = start_test_server(test_ctx(dir.path())).await;
    initialize(&mut writer, &mut reader).await;

    send_msg(
        &mut writer,
        &json!({ "jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": { "name": "nope.nonexistent", "arguments": {} } }),
    )
    .await;

    let resp = recv_msg(&mut reader).await;
    assert!(resp["error"].is_null(), "unknown tool must not be a JSON-RPC protocol error");
    assert_eq!(resp["result"]["isError"], true);
}
