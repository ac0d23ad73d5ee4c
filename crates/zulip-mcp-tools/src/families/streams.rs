// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Streams & topics family (spec §4.5 "Streams & topics"): manage_streams,
//! manage_topics, get_stream_info, stream_analytics, manage_stream_settings.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use zulip_mcp_config::{IdentityKind, ToolFamily};
use zulip_mcp_rest::{NarrowBuilder, NarrowTerm};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCall, ToolOutput};
use crate::validator::{coerce_int, narrow_enum, narrow_enum_opt, optional_str, require_str};

fn preferred_kind(args: &Value) -> Option<IdentityKind> {
    match args.get("preferred_kind").and_then(Value::as_str) {
        Some("user") => Some(IdentityKind::User),
        Some("bot") => Some(IdentityKind::Bot),
        Some("admin") => Some(IdentityKind::Admin),
        _ => None,
    }
}

pub struct ManageStreamsTool;

#[async_trait]
impl Tool for ManageStreamsTool {
    fn name(&self) -> &str {
        "streams.manage"
    }
    fn description(&self) -> &str {
        "List / create / update / delete / subscribe / unsubscribe streams, by bulk id or name lists."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "op": {"type": "string", "enum": ["list", "create", "update", "delete", "subscribe", "unsubscribe"]},
                "stream_names": {"type": "array", "items": {"type": "string"}},
                "stream_ids": {"type": "array", "items": {"type": "integer"}},
                "description": {"type": "string"},
                "invite_only": {"type": "boolean"},
                "include_all": {"type": "boolean"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["op"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match manage_streams(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn manage_streams(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let op = narrow_enum(args, "op", &["list", "create", "update", "delete", "subscribe", "unsubscribe"])?;
    let kind = preferred_kind(args);

    match op {
        "list" => {
            let include_all = args.get("include_all").and_then(Value::as_bool).unwrap_or(false);
            ctx.rest.cached_streams(kind.unwrap_or(IdentityKind::User), include_all).await.map_err(Into::into)
        }
        "create" | "subscribe" => {
            let names = stream_name_list(args)?;
            let subscriptions: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
            let mut form = json!({ "subscriptions": serde_json::to_string(&subscriptions).unwrap_or_default() });
            if op == "create" {
                if let Some(desc) = optional_str(args, "description") {
                    form["subscriptions"] = serde_json::to_string(
                        &names.iter().map(|n| json!({ "name": n, "description": desc })).collect::<Vec<_>>(),
                    )
                    .unwrap_or_default()
                    .into();
                }
                if let Some(invite_only) = args.get("invite_only").and_then(Value::as_bool) {
                    form["invite_only"] = json!(invite_only);
                }
            }
            ctx.rest.call(ToolFamily::Subscribe, kind, Method::POST, "/users/me/subscriptions", None, Some(&form)).await.map_err(Into::into)
        }
        "unsubscribe" => {
            let names = stream_name_list(args)?;
            let form = json!({ "subscriptions": serde_json::to_string(&names).unwrap_or_default() });
            ctx.rest.call(ToolFamily::Subscribe, kind, Method::DELETE, "/users/me/subscriptions", None, Some(&form)).await.map_err(Into::into)
        }
        "update" => {
            let stream_id = single_stream_id(args)?;
            let mut form = json!({});
            if let Some(desc) = optional_str(args, "description") {
                form["description"] = Value::String(desc.to_string());
            }
            if let Some(invite_only) = args.get("invite_only").and_then(Value::as_bool) {
                form["is_private"] = json!(invite_only);
            }
            ctx.rest
                .call(ToolFamily::Subscribe, kind, Method::PATCH, &format!("/streams/{stream_id}"), None, Some(&form))
                .await
                .map_err(Into::into)
        }
        "delete" => {
            let stream_id = single_stream_id(args)?;
            ctx.rest.call(ToolFamily::Subscribe, kind, Method::DELETE, &format!("/streams/{stream_id}"), None, None).await.map_err(Into::into)
        }
        _ => unreachable!("narrow_enum restricts to known ops"),
    }
}

fn stream_name_list(args: &Value) -> crate::error::Result<Vec<String>> {
    match args.get("stream_names") {
        Some(Value::Array(items)) if !items.is_empty() => Ok(items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()),
        _ => Err(ToolError::validation("stream_names", "is required and must be a non-empty list", "[\"general\"]")),
    }
}

fn single_stream_id(args: &Value) -> crate::error::Result<i64> {
    match coerce_int(args, "stream_id")? {
        Some(id) => Ok(id),
        None => match args.get("stream_ids").and_then(Value::as_array).and_then(|a| a.first()).and_then(Value::as_i64) {
            Some(id) => Ok(id),
            None => Err(ToolError::validation("stream_id", "is required", 42)),
        },
    }
}

pub struct ManageTopicsTool;

#[async_trait]
impl Tool for ManageTopicsTool {
    fn name(&self) -> &str {
        "topics.manage"
    }
    fn description(&self) -> &str {
        "List / move / delete / mark_read / mute / unmute topics within a stream."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "op": {"type": "string", "enum": ["list", "move", "delete", "mark_read", "mute", "unmute"]},
                "stream_id": {"type": "integer"},
                "topic": {"type": "string"},
                "target_topic": {"type": "string"},
                "target_stream_id": {"type": "integer"},
                "propagate_mode": {"type": "string", "enum": ["change_one", "change_later", "change_all"]},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["op", "stream_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match manage_topics(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn manage_topics(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let op = narrow_enum(args, "op", &["list", "move", "delete", "mark_read", "mute", "unmute"])?;
    let stream_id = coerce_int(args, "stream_id")?.ok_or_else(|| ToolError::validation("stream_id", "is required", 42))?;
    let kind = preferred_kind(args);

    match op {
        "list" => ctx
            .rest
            .call(ToolFamily::Read, kind, Method::GET, &format!("/users/me/{stream_id}/topics"), None, None)
            .await
            .map_err(Into::into),
        "move" => {
            let topic = require_str(args, "topic")?;
            let propagate_mode = narrow_enum_opt(args, "propagate_mode", &["change_one", "change_later", "change_all"])?.unwrap_or("change_all");
            let target_topic = optional_str(args, "target_topic").unwrap_or(topic);
            let mut form = json!({ "topic": target_topic, "propagate_mode": propagate_mode, "send_notification_to_new_thread": true });
            if let Some(target_stream_id) = coerce_int(args, "target_stream_id")? {
                form["stream_id"] = json!(target_stream_id);
            }
            // Zulip models topic move as an edit of the topic's first message; this tool
            // resolves it by re-narrowing on (stream_id, topic) and editing every match,
            // honoring propagate_mode via the underlying PATCH /messages/{id} call.
            let narrow = NarrowBuilder::new()
                .stream(stream_id.to_string())
                .topic(topic)
                .build();
            let messages = ctx.rest.search_messages(kind, &narrow, "oldest", 0, 1).await?;
            let first_id = messages
                .get("messages")
                .and_then(Value::as_array)
                .and_then(|a| a.first())
                .and_then(|m| m.get("id"))
                .and_then(Value::as_i64)
                .ok_or_else(|| ToolError::new("not_found", format!("no messages found in topic '{topic}'")))?;
            ctx.rest
                .call(ToolFamily::EditOwn, kind, Method::PATCH, &format!("/messages/{first_id}"), None, Some(&form))
                .await
                .map_err(Into::into)
        }
        "delete" => {
            let topic = require_str(args, "topic")?;
            let form = json!({ "topic_name": topic });
            ctx.rest
                .call(ToolFamily::TopicDelete, kind, Method::POST, &format!("/streams/{stream_id}/delete_topic"), None, Some(&form))
                .await
                .map_err(Into::into)
        }
        "mark_read" => {
            let topic = require_str(args, "topic")?;
            let narrow: Vec<NarrowTerm> = NarrowBuilder::new().stream(stream_id.to_string()).topic(topic).build();
            let form = json!({ "op": "mark_read", "narrow": serde_json::to_value(&narrow).unwrap_or(Value::Array(vec![])) });
            ctx.rest.call(ToolFamily::BulkRead, kind, Method::POST, "/messages/flags/narrow", None, Some(&form)).await.map_err(Into::into)
        }
        "mute" | "unmute" => {
            let topic = require_str(args, "topic")?;
            let form = json!({ "stream_id": stream_id, "topic": topic, "op": if op == "mute" { "add" } else { "remove" } });
            ctx.rest.call(ToolFamily::Subscribe, kind, Method::PATCH, "/user_topics", None, Some(&form)).await.map_err(Into::into)
        }
        _ => unreachable!("narrow_enum restricts to known ops"),
    }
}

pub struct GetStreamInfoTool;

#[async_trait]
impl Tool for GetStreamInfoTool {
    fn name(&self) -> &str {
        "streams.get_info"
    }
    fn description(&self) -> &str {
        "Fetch stream info by id or name, with optional inclusions (topics, subscribers, settings)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "stream_id": {"type": "integer"},
                "stream_name": {"type": "string"},
                "include": {"type": "array", "items": {"type": "string", "enum": ["topics", "subscribers", "settings"]}},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match get_stream_info(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn get_stream_info(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let kind = preferred_kind(args);
    let stream_id = match coerce_int(args, "stream_id")? {
        Some(id) => id,
        None => {
            let name = require_str(args, "stream_name")?;
            let streams = ctx.rest.cached_streams(kind.unwrap_or(IdentityKind::User), false).await?;
            streams
                .get("streams")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .find(|s| s.get("name").and_then(Value::as_str) == Some(name))
                .and_then(|s| s.get("stream_id"))
                .and_then(Value::as_i64)
                .ok_or_else(|| ToolError::new("not_found", format!("no stream named '{name}'")))?
        }
    };

    let mut result = json!({ "stream_id": stream_id });
    let includes: Vec<String> = args
        .get("include")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    if includes.iter().any(|i| i == "topics") {
        let topics = ctx.rest.call(ToolFamily::Read, kind, Method::GET, &format!("/users/me/{stream_id}/topics"), None, None).await?;
        result["topics"] = topics.get("topics").cloned().unwrap_or(Value::Array(vec![]));
    }
    if includes.iter().any(|i| i == "subscribers") {
        let subs = ctx.rest.call(ToolFamily::Read, kind, Method::GET, &format!("/streams/{stream_id}/members"), None, None).await?;
        result["subscribers"] = subs.get("subscribers").cloned().unwrap_or(Value::Array(vec![]));
    }
    if includes.iter().any(|i| i == "settings") {
        let streams = ctx.rest.cached_streams(kind.unwrap_or(IdentityKind::User), true).await?;
        if let Some(entry) = streams
            .get("streams")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|s| s.get("stream_id").and_then(Value::as_i64) == Some(stream_id))
        {
            result["settings"] = entry.clone();
        }
    }
    Ok(result)
}

pub struct StreamAnalyticsTool;

#[async_trait]
impl Tool for StreamAnalyticsTool {
    fn name(&self) -> &str {
        "streams.analytics"
    }
    fn description(&self) -> &str {
        "Computed aggregates over a time window: message count, unique senders, topic count, hourly/daily activity buckets."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "stream": {"type": "string"},
                "since_seconds_ago": {"type": "integer"},
                "bucket": {"type": "string", "enum": ["hour", "day"]},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["stream"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match stream_analytics(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn stream_analytics(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let stream = require_str(args, "stream")?;
    let since = coerce_int(args, "since_seconds_ago")?.unwrap_or(86_400);
    let bucket = narrow_enum_opt(args, "bucket", &["hour", "day"])?.unwrap_or("day");
    let kind = preferred_kind(args);

    let narrow = NarrowBuilder::new()
        .stream(stream)
        .time_window(Some(zulip_mcp_rest::TimeBound::RelativeSecondsAgo(since)), None, chrono::Utc::now())
        .build();
    let response = ctx.rest.search_messages(kind, &narrow, "oldest", 0, 5000).await?;
    let messages = response.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
    Ok(compute_stream_aggregates(&messages, bucket))
}

/// Pure aggregation over a message list, network-free so it can be unit
/// tested directly (spec §1.5 test-tooling approach for network-calling
/// logic: extract the pure transformation).
fn compute_stream_aggregates(messages: &[Value], bucket: &str) -> Value {
    let mut senders = std::collections::HashSet::new();
    let mut topics = std::collections::HashSet::new();
    let mut buckets: HashMap<String, u64> = HashMap::new();

    for m in messages {
        if let Some(sender) = m.get("sender_email").and_then(Value::as_str) {
            senders.insert(sender.to_string());
        }
        if let Some(topic) = m.get("subject").and_then(Value::as_str) {
            topics.insert(topic.to_string());
        }
        if let Some(ts) = m.get("timestamp").and_then(Value::as_i64) {
            if let Some(dt) = chrono::DateTime::from_timestamp(ts, 0) {
                let key = if bucket == "hour" {
                    dt.format("%Y-%m-%dT%H:00:00Z").to_string()
                } else {
                    dt.format("%Y-%m-%d").to_string()
                };
                *buckets.entry(key).or_insert(0) += 1;
            }
        }
    }

    json!({
        "message_count": messages.len(),
        "unique_senders": senders.len(),
        "topic_count": topics.len(),
        "activity": buckets,
    })
}

pub struct ManageStreamSettingsTool;

#[async_trait]
impl Tool for ManageStreamSettingsTool {
    fn name(&self) -> &str {
        "streams.manage_settings"
    }
    fn description(&self) -> &str {
        "Update per-user notification preferences and color for a subscribed stream. Never mutates shared stream state."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "stream_id": {"type": "integer"},
                "property": {"type": "string", "enum": ["color", "is_muted", "desktop_notifications", "push_notifications", "audible_notifications", "pin_to_top"]},
                "value": {},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["stream_id", "property", "value"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match manage_stream_settings(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn manage_stream_settings(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let stream_id = coerce_int(args, "stream_id")?.ok_or_else(|| ToolError::validation("stream_id", "is required", 42))?;
    let property = require_str(args, "property")?;
    let value = args.get("value").cloned().ok_or_else(|| ToolError::validation("value", "is required", "true"))?;
    let kind = preferred_kind(args);

    let form = json!({
        "subscription_data": serde_json::to_string(&[json!({ "stream_id": stream_id, "property": property, "value": value })]).unwrap_or_default(),
    });
    ctx.rest
        .call(ToolFamily::Subscribe, kind, Method::PATCH, "/users/me/subscriptions/properties", None, Some(&form))
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_stream_aggregates_counts_unique_senders_and_topics() {
        let messages = vec![
            json!({"sender_email": "a@x.com", "subject": "rust", "timestamp": 1_700_000_000i64}),
            json!({"sender_email": "a@x.com", "subject": "rust", "timestamp": 1_700_003_600i64}),
            json!({"sender_email": "b@x.com", "subject": "go", "timestamp": 1_700_003_700i64}),
        ];
        let agg = compute_stream_aggregates(&messages, "day");
        assert_eq!(agg["message_count"], 3);
        assert_eq!(agg["unique_senders"], 2);
        assert_eq!(agg["topic_count"], 2);
    }

    #[test]
    fn compute_stream_aggregates_buckets_by_hour() {
        let messages = vec![
            json!({"sender_email": "a@x.com", "subject": "rust", "timestamp": 1_700_000_000i64}),
            json!({"sender_email": "a@x.com", "subject": "rust", "timestamp": 1_700_000_100i64}),
        ];
        let agg = compute_stream_aggregates(&messages, "hour");
        let activity = agg["activity"].as_object().unwrap();
        assert_eq!(activity.len(), 1, "both messages fall in the same hour bucket");
    }

    #[test]
    fn stream_name_list_rejects_empty() {
        let err = stream_name_list(&json!({"stream_names": []})).unwrap_err();
        assert_eq!(err.code, "validation_error");
    }
}
