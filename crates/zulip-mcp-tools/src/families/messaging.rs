// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Messaging family (spec §4.5 "Messaging"): send, search, edit, bulk_ops,
//! react/unreact, history, cross_post.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use zulip_mcp_config::{IdentityKind, ToolFamily};
use zulip_mcp_rest::{NarrowBuilder, NarrowTerm, TimeBound};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCall, ToolOutput};
use crate::validator::{coerce_int, narrow_enum, narrow_enum_opt, optional_str, require_int, require_str, validate_emoji};

/// Zulip's own content length ceiling; content beyond this is trimmed (spec
/// §4.5 messaging.send "content is trimmed and length-limited").
const MAX_CONTENT_LEN: usize = 10_000;

fn preferred_kind(args: &Value) -> Option<IdentityKind> {
    match args.get("preferred_kind").and_then(Value::as_str) {
        Some("user") => Some(IdentityKind::User),
        Some("bot") => Some(IdentityKind::Bot),
        Some("admin") => Some(IdentityKind::Admin),
        _ => None,
    }
}

fn trim_content(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() > MAX_CONTENT_LEN {
        trimmed.chars().take(MAX_CONTENT_LEN).collect()
    } else {
        trimmed.to_string()
    }
}

pub struct SendMessageTool;

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "messaging.send"
    }
    fn description(&self) -> &str {
        "Send a message to a stream+topic or to a list of private recipients."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": ["stream", "private"]},
                "to": {"description": "stream name, or list of recipient emails for private messages"},
                "topic": {"type": "string"},
                "content": {"type": "string"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["type", "to", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match send(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

pub(crate) async fn send(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let msg_type = narrow_enum(args, "type", &["stream", "private"])?;
    let content = trim_content(require_str(args, "content")?);
    if msg_type == "stream" && optional_str(args, "topic").is_none() {
        return Err(ToolError::validation("topic", "is required when type is 'stream'", "\"general updates\""));
    }

    let to = match args.get("to") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => serde_json::to_string(items).unwrap_or_default(),
        _ => return Err(ToolError::validation("to", "must be a stream name or a list of recipients", "\"general\"")),
    };

    let mut form = json!({ "type": msg_type, "to": to, "content": content });
    if let Some(topic) = optional_str(args, "topic") {
        form["topic"] = Value::String(topic.to_string());
    }

    let response = ctx
        .rest
        .call(ToolFamily::Send, preferred_kind(args), Method::POST, "/messages", None, Some(&form))
        .await?;
    Ok(json!({ "message_id": response.get("id").cloned().unwrap_or(Value::Null) }))
}

pub struct SearchMessagesTool;

#[async_trait]
impl Tool for SearchMessagesTool {
    fn name(&self) -> &str {
        "messaging.search"
    }
    fn description(&self) -> &str {
        "Search messages by narrow list and/or simple shortcuts (stream/topic/sender/time window)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "narrow": {"type": "array"},
                "stream": {"type": "string"},
                "topic": {"type": "string"},
                "sender": {"type": "string"},
                "since_seconds_ago": {"type": "integer"},
                "anchor": {"type": "string", "description": "newest | oldest | first_unread | a message id"},
                "num_before": {"type": "integer"},
                "num_after": {"type": "integer"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match search(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

pub(crate) async fn search(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let anchor = optional_str(args, "anchor").unwrap_or("newest").to_string();
    let num_before = coerce_int(args, "num_before")?.unwrap_or(20).max(0) as u32;
    let num_after = coerce_int(args, "num_after")?.unwrap_or(0).max(0) as u32;
    let kind = preferred_kind(args);

    let mut builder = NarrowBuilder::new();
    if let Some(stream) = optional_str(args, "stream") {
        builder = builder.stream(stream);
    }
    if let Some(topic) = optional_str(args, "topic") {
        builder = builder.topic(topic);
    }
    if let Some(sender) = optional_str(args, "sender") {
        let resolved = ctx.rest.resolve_user(sender, kind.unwrap_or(IdentityKind::User)).await?;
        builder = builder.sender(resolved.email);
    }
    if let Some(secs) = coerce_int(args, "since_seconds_ago")? {
        builder = builder.time_window(Some(TimeBound::RelativeSecondsAgo(secs)), None, Utc::now());
    }

    let user_narrow: Vec<NarrowTerm> = match args.get("narrow") {
        Some(Value::Array(items)) => serde_json::from_value(Value::Array(items.clone())).unwrap_or_default(),
        _ => Vec::new(),
    };
    let narrow = builder.merge_user_narrow(user_narrow).build();

    let response = ctx.rest.search_messages(kind, &narrow, &anchor, num_before, num_after).await?;
    let messages = response.get("messages").cloned().unwrap_or(Value::Array(vec![]));
    let returned_count = messages.as_array().map(|a| a.len()).unwrap_or(0);
    let requested_count = (num_before + num_after).max(1) as usize;
    Ok(json!({
        "messages": messages,
        "has_more": returned_count >= requested_count,
    }))
}

pub struct EditMessageTool;

#[async_trait]
impl Tool for EditMessageTool {
    fn name(&self) -> &str {
        "messaging.edit"
    }
    fn description(&self) -> &str {
        "Edit a message's content and/or topic, optionally moving it to another stream."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message_id": {"type": "integer"},
                "content": {"type": "string"},
                "topic": {"type": "string"},
                "stream_id": {"type": "integer"},
                "propagate_mode": {"type": "string", "enum": ["change_one", "change_later", "change_all"]},
                "send_notification_to_old_thread": {"type": "boolean"},
                "send_notification_to_new_thread": {"type": "boolean"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["message_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match edit(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn edit(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let message_id = require_int(args, "message_id")?;
    let propagate_mode = narrow_enum_opt(args, "propagate_mode", &["change_one", "change_later", "change_all"])?.unwrap_or("change_one");

    let mut form = json!({ "propagate_mode": propagate_mode });
    if let Some(content) = optional_str(args, "content") {
        form["content"] = Value::String(trim_content(content));
    }
    if let Some(topic) = optional_str(args, "topic") {
        form["topic"] = Value::String(topic.to_string());
    }
    if let Some(stream_id) = coerce_int(args, "stream_id")? {
        form["stream_id"] = json!(stream_id);
    }
    if let Some(n) = args.get("send_notification_to_old_thread") {
        form["send_notification_to_old_thread"] = n.clone();
    }
    if let Some(n) = args.get("send_notification_to_new_thread") {
        form["send_notification_to_new_thread"] = n.clone();
    }

    ctx.rest
        .call(ToolFamily::EditOwn, preferred_kind(args), Method::PATCH, &format!("/messages/{message_id}"), None, Some(&form))
        .await
        .map_err(Into::into)
}

pub struct BulkOpsTool;

#[async_trait]
impl Tool for BulkOpsTool {
    fn name(&self) -> &str {
        "messaging.bulk_ops"
    }
    fn description(&self) -> &str {
        "Apply an action (e.g. mark read, flag, delete) across an explicit id list or a narrow selection."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["mark_read", "mark_unread", "flag", "unflag", "delete", "mark_all_read"]},
                "message_ids": {"type": "array", "items": {"type": "integer"}},
                "narrow": {"type": "array"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match bulk_ops(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn bulk_ops(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let action = narrow_enum(args, "action", &["mark_read", "mark_unread", "flag", "unflag", "delete", "mark_all_read"])?;
    let has_ids = matches!(args.get("message_ids"), Some(Value::Array(items)) if !items.is_empty());
    let has_narrow = matches!(args.get("narrow"), Some(Value::Array(items)) if !items.is_empty());
    let implies_all = action == "mark_all_read";

    if has_ids && has_narrow {
        return Err(ToolError::new("validation_error", "message_ids and narrow are mutually exclusive"));
    }
    if !has_ids && !has_narrow && !implies_all {
        return Err(ToolError::new("validation_error", "one of message_ids or narrow is required for this action"));
    }

    let mut form = json!({ "op": action });
    if has_ids {
        form["messages"] = args["message_ids"].clone();
    }
    if has_narrow {
        form["narrow"] = args["narrow"].clone();
    }

    let path = if implies_all { "/mark_all_as_read" } else { "/messages/flags" };
    ctx.rest
        .call(ToolFamily::BulkRead, preferred_kind(args), Method::POST, path, None, Some(&form))
        .await
        .map_err(Into::into)
}

pub struct ReactTool {
    pub negate: bool,
}

#[async_trait]
impl Tool for ReactTool {
    fn name(&self) -> &str {
        if self.negate {
            "messaging.unreact"
        } else {
            "messaging.react"
        }
    }
    fn description(&self) -> &str {
        if self.negate {
            "Remove an emoji reaction from a message."
        } else {
            "Add an emoji reaction to a message."
        }
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message_id": {"type": "integer"},
                "emoji": {"type": "string"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["message_id", "emoji"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match react(ctx, &call.args, self.negate).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn react(ctx: &ToolContext, args: &Value, negate: bool) -> crate::error::Result<Value> {
    let message_id = require_int(args, "message_id")?;
    let emoji = validate_emoji(args, "emoji")?;
    let form = json!({ "emoji_name": emoji });
    let method = if negate { Method::DELETE } else { Method::POST };
    ctx.rest
        .call(ToolFamily::React, preferred_kind(args), method, &format!("/messages/{message_id}/reactions"), None, Some(&form))
        .await
        .map_err(Into::into)
}

pub struct MessageHistoryTool;

#[async_trait]
impl Tool for MessageHistoryTool {
    fn name(&self) -> &str {
        "messaging.history"
    }
    fn description(&self) -> &str {
        "Return prior content and edit timestamps for a message."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message_id": {"type": "integer"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["message_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match history(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn history(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let message_id = require_int(args, "message_id")?;
    ctx.rest
        .call(ToolFamily::Read, preferred_kind(args), Method::GET, &format!("/messages/{message_id}/history"), None, None)
        .await
        .map_err(Into::into)
}

pub struct CrossPostTool;

#[async_trait]
impl Tool for CrossPostTool {
    fn name(&self) -> &str {
        "messaging.cross_post"
    }
    fn description(&self) -> &str {
        "Repost a source message into a target stream/topic with attribution."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source_message_id": {"type": "integer"},
                "target_stream": {"type": "string"},
                "target_topic": {"type": "string"},
                "prefix": {"type": "string"},
                "include_reference_link": {"type": "boolean"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["source_message_id", "target_stream", "target_topic"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match cross_post(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn cross_post(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let source_id = require_int(args, "source_message_id")?;
    let target_stream = require_str(args, "target_stream")?;
    let target_topic = require_str(args, "target_topic")?;
    let prefix = optional_str(args, "prefix").unwrap_or("Cross-posted");
    let include_link = args.get("include_reference_link").and_then(Value::as_bool).unwrap_or(true);
    let kind = preferred_kind(args);

    let source = ctx
        .rest
        .call(ToolFamily::Read, kind, Method::GET, &format!("/messages/{source_id}"), None, None)
        .await?;
    let message = source.get("message").cloned().unwrap_or(source);
    let original_content = message.get("content").and_then(Value::as_str).unwrap_or("").to_string();
    let sender = message.get("sender_full_name").and_then(Value::as_str).unwrap_or("someone");

    let mut content = format!("{prefix} from **{sender}**:\n\n{original_content}");
    if include_link {
        content.push_str(&format!("\n\n[original message](#narrow/near/{source_id})"));
    }

    let form = json!({ "type": "stream", "to": target_stream, "topic": target_topic, "content": trim_content(&content) });
    let response = ctx.rest.call(ToolFamily::Send, kind, Method::POST, "/messages", None, Some(&form)).await?;
    Ok(json!({ "message_id": response.get("id").cloned().unwrap_or(Value::Null) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_content_limits_length() {
        let long = "x".repeat(MAX_CONTENT_LEN + 500);
        let trimmed = trim_content(&long);
        assert_eq!(trimmed.chars().count(), MAX_CONTENT_LEN);
    }

    #[test]
    fn trim_content_trims_whitespace() {
        assert_eq!(trim_content("  hello  "), "hello");
    }
}
