// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Scheduler (C11, spec §4.11): create/list/update/cancel scheduled
//! messages, delegating entirely to Zulip's native scheduled-messages
//! endpoints. The validator rejects timestamps at or before the current
//! wall clock — Zulip itself accepts past timestamps and simply never
//! delivers them, which would surface as a silent no-op rather than a
//! diagnosable error.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use zulip_mcp_config::ToolFamily;

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCall, ToolOutput};
use crate::validator::{coerce_int, narrow_enum, optional_str, require_int, require_str};

const MAX_CONTENT_LEN: usize = 10_000;

fn trim_content(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() > MAX_CONTENT_LEN {
        trimmed.chars().take(MAX_CONTENT_LEN).collect()
    } else {
        trimmed.to_string()
    }
}

pub struct CreateScheduledMessageTool;

#[async_trait]
impl Tool for CreateScheduledMessageTool {
    fn name(&self) -> &str {
        "scheduler.create"
    }
    fn description(&self) -> &str {
        "Schedule a message for future delivery via Zulip's native scheduled-messages endpoint."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": ["stream", "private"]},
                "to": {"description": "stream name, or list of recipient emails for private messages"},
                "topic": {"type": "string"},
                "content": {"type": "string"},
                "scheduled_delivery_timestamp": {"type": "integer", "description": "unix epoch seconds, must be in the future"}
            },
            "required": ["type", "to", "content", "scheduled_delivery_timestamp"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match create(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

fn require_future_timestamp(args: &Value, param: &str) -> crate::error::Result<i64> {
    let ts = require_int(args, param)?;
    if ts <= Utc::now().timestamp() {
        return Err(ToolError::validation(param, "must be a future unix timestamp", Utc::now().timestamp() + 3600));
    }
    Ok(ts)
}

async fn create(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let msg_type = narrow_enum(args, "type", &["stream", "private"])?;
    let content = trim_content(require_str(args, "content")?);
    if msg_type == "stream" && optional_str(args, "topic").is_none() {
        return Err(ToolError::validation("topic", "is required when type is 'stream'", "\"reminders\""));
    }
    let timestamp = require_future_timestamp(args, "scheduled_delivery_timestamp")?;

    let to = match args.get("to") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => serde_json::to_string(items).unwrap_or_default(),
        _ => return Err(ToolError::validation("to", "must be a stream name or a list of recipients", "\"general\"")),
    };

    let mut form = json!({
        "type": msg_type,
        "to": to,
        "content": content,
        "scheduled_delivery_timestamp": timestamp,
    });
    if let Some(topic) = optional_str(args, "topic") {
        form["topic"] = Value::String(topic.to_string());
    }

    let response = ctx
        .rest
        .call(ToolFamily::Scheduled, None, Method::POST, "/scheduled_messages", None, Some(&form))
        .await?;
    Ok(json!({ "scheduled_message_id": response.get("scheduled_message_id").cloned().unwrap_or(Value::Null) }))
}

pub struct ListScheduledMessagesTool;

#[async_trait]
impl Tool for ListScheduledMessagesTool {
    fn name(&self) -> &str {
        "scheduler.list"
    }
    fn description(&self) -> &str {
        "List this identity's pending scheduled messages."
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "additionalProperties": false })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match ctx.rest.call(ToolFamily::Scheduled, None, Method::GET, "/scheduled_messages", None, None).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err.into()),
        }
    }
}

pub struct UpdateScheduledMessageTool;

#[async_trait]
impl Tool for UpdateScheduledMessageTool {
    fn name(&self) -> &str {
        "scheduler.update"
    }
    fn description(&self) -> &str {
        "Update the content, topic, or delivery time of a pending scheduled message."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "scheduled_message_id": {"type": "integer"},
                "content": {"type": "string"},
                "topic": {"type": "string"},
                "scheduled_delivery_timestamp": {"type": "integer"}
            },
            "required": ["scheduled_message_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match update(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn update(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let scheduled_message_id = require_int(args, "scheduled_message_id")?;
    let mut form = json!({});
    if let Some(content) = optional_str(args, "content") {
        form["content"] = Value::String(trim_content(content));
    }
    if let Some(topic) = optional_str(args, "topic") {
        form["topic"] = Value::String(topic.to_string());
    }
    if args.get("scheduled_delivery_timestamp").is_some() {
        form["scheduled_delivery_timestamp"] = json!(require_future_timestamp(args, "scheduled_delivery_timestamp")?);
    }

    ctx.rest
        .call(
            ToolFamily::Scheduled,
            None,
            Method::PATCH,
            &format!("/scheduled_messages/{scheduled_message_id}"),
            None,
            Some(&form),
        )
        .await
        .map_err(Into::into)
}

pub struct CancelScheduledMessageTool;

#[async_trait]
impl Tool for CancelScheduledMessageTool {
    fn name(&self) -> &str {
        "scheduler.cancel"
    }
    fn description(&self) -> &str {
        "Cancel a pending scheduled message."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "scheduled_message_id": {"type": "integer"} },
            "required": ["scheduled_message_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let scheduled_message_id = match coerce_int(&call.args, "scheduled_message_id") {
            Ok(Some(id)) => id,
            Ok(None) => return ToolOutput::err(&call.id, ToolError::validation("scheduled_message_id", "is required", 1234)),
            Err(err) => return ToolOutput::err(&call.id, err),
        };
        match ctx
            .rest
            .call(ToolFamily::Scheduled, None, Method::DELETE, &format!("/scheduled_messages/{scheduled_message_id}"), None, None)
            .await
        {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_past_timestamp() {
        let args = json!({"scheduled_delivery_timestamp": 1});
        let err = require_future_timestamp(&args, "scheduled_delivery_timestamp").unwrap_err();
        assert_eq!(err.code, "validation_error");
    }

    #[test]
    fn accepts_future_timestamp() {
        let future = Utc::now().timestamp() + 600;
        let args = json!({"scheduled_delivery_timestamp": future});
        assert_eq!(require_future_timestamp(&args, "scheduled_delivery_timestamp").unwrap(), future);
    }
}
