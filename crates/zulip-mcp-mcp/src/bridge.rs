// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Type conversions between `zulip-mcp-tools`'s tool types and rmcp's MCP
//! model types (spec §4.9: the dispatcher is a thin translator, no business
//! logic of its own).

use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, JsonObject, Tool as McpTool};
use zulip_mcp_tools::{ToolOutput, ToolSchema};

/// Convert a [`ToolSchema`] into an rmcp [`Tool`] descriptor. The JSON
/// Schema each tool returns from `parameters_schema` is passed through as
/// `input_schema` unchanged.
pub fn schema_to_mcp_tool(schema: ToolSchema) -> McpTool {
    let input_schema: JsonObject = value_to_object(schema.parameters);
    McpTool::new(
        std::borrow::Cow::Owned(schema.name),
        std::borrow::Cow::Owned(schema.description),
        Arc::new(input_schema),
    )
}

fn value_to_object(v: serde_json::Value) -> JsonObject {
    use serde_json::{Map, Value};
    match v {
        Value::Object(m) => m,
        other => {
            let mut m = Map::new();
            m.insert("type".to_string(), Value::String("object".to_string()));
            m.insert("value".to_string(), other);
            m
        }
    }
}

/// Convert a [`ToolOutput`] into an rmcp [`CallToolResult`]. Every tool
/// result is a single JSON object (the `{status: ..., ...}` shape from spec
/// §4.4/§7); it is serialized as one text content part so MCP clients that
/// only render text still see the full structured payload.
pub fn output_to_call_result(output: ToolOutput) -> CallToolResult {
    let text = serde_json::to_string(&output.value).unwrap_or_else(|_| output.value.to_string());
    let content = vec![Content::text(text)];
    if output.is_error {
        CallToolResult { content, is_error: Some(true), structured_content: None, meta: None }
    } else {
        CallToolResult::success(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_schema(name: &str, desc: &str, params: serde_json::Value) -> ToolSchema {
        ToolSchema { name: name.to_string(), description: desc.to_string(), parameters: params }
    }

    #[test]
    fn schema_to_mcp_tool_preserves_name_and_description() {
        let schema = make_schema("messaging.send", "Send a message", json!({"type":"object"}));
        let tool = schema_to_mcp_tool(schema);
        assert_eq!(tool.name.as_ref(), "messaging.send");
        assert_eq!(tool.description.as_deref(), Some("Send a message"));
    }

    #[test]
    fn schema_to_mcp_tool_object_schema_passes_through() {
        let schema = make_schema(
            "messaging.search",
            "Search messages",
            json!({"type": "object", "properties": {"stream": {"type": "string"}}}),
        );
        let tool = schema_to_mcp_tool(schema);
        assert!(tool.input_schema.contains_key("type"));
        assert!(tool.input_schema.contains_key("properties"));
    }

    #[test]
    fn schema_to_mcp_tool_non_object_schema_gets_wrapped() {
        let schema = make_schema("echo", "Echoes", json!("not an object"));
        let tool = schema_to_mcp_tool(schema);
        assert_eq!(tool.input_schema.get("type"), Some(&serde_json::Value::String("object".to_string())));
    }

    #[test]
    fn output_to_call_result_success_serializes_value_as_text() {
        let out = ToolOutput::ok("id1", json!({"message_id": 42}));
        let result = output_to_call_result(out);
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn output_to_call_result_error_flag_set() {
        let out = ToolOutput::err("id2", zulip_mcp_tools::ToolError::new("validation_error", "bad input"));
        let result = output_to_call_result(out);
        assert_eq!(result.is_error, Some(true));
    }
}
