// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Agents family (spec §4.5 "Agents"): register_agent, agent_message,
//! request_user_input, wait_for_response, start_task,
//! update_task_progress, complete_task, list_instances, and the AFK
//! controls (enable/disable/status).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::warn;
use zulip_mcp_config::ToolFamily;
use zulip_mcp_store::{RequestStatus, TaskStatus};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCall, ToolOutput};
use crate::validator::{coerce_int, narrow_enum, optional_str, require_int, require_str};

/// Developer override: force outbound agent messages to send even while
/// AFK is disabled, e.g. during local testing. Unset in normal operation.
const AFK_OVERRIDE_ENV: &str = "ZULIP_MCP_FORCE_AGENT_MESSAGES";

fn dedicated_stream(agent_id: &str) -> String {
    format!("agent-{agent_id}")
}

/// Ensure the agent's dedicated channel exists by subscribing the bot
/// identity to it; Zulip creates streams implicitly on first subscribe
/// (spec §4.5 register_agent: "idempotent dedicated-channel creation").
async fn ensure_dedicated_channel(ctx: &ToolContext, agent_id: &str) -> crate::error::Result<String> {
    let stream = dedicated_stream(agent_id);
    let form = json!({
        "subscriptions": serde_json::to_string(&[json!({"name": stream})]).unwrap_or_default(),
    });
    ctx.rest
        .call(ToolFamily::Subscribe, None, Method::POST, "/users/me/subscriptions", None, Some(&form))
        .await?;
    Ok(stream)
}

/// True when an outbound agent message should actually post: AFK is
/// enabled, or the developer override forces it (spec §4.7 "when afk or
/// override active, posts... when NOT afk and the override is unset, the
/// call returns skipped").
fn afk_is_active(ctx: &ToolContext) -> crate::error::Result<bool> {
    if std::env::var(AFK_OVERRIDE_ENV).map(|v| v == "1").unwrap_or(false) {
        return Ok(true);
    }
    Ok(ctx
        .store
        .get_afk()
        .map_err(|e| ToolError::new("store_error", e.to_string()))?
        .is_afk)
}

pub struct RegisterAgentTool;

#[async_trait]
impl Tool for RegisterAgentTool {
    fn name(&self) -> &str {
        "agents.register_agent"
    }
    fn description(&self) -> &str {
        "Register or re-register an agent, creating a fresh instance row and ensuring its dedicated channel exists."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string"},
                "agent_type": {"type": "string"},
                "session_id": {"type": "string"},
                "project_dir": {"type": "string"},
                "host": {"type": "string"},
                "metadata": {"type": "object"}
            },
            "required": ["agent_id", "agent_type"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match register_agent(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn register_agent(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let agent_id = require_str(args, "agent_id")?;
    let agent_type = require_str(args, "agent_type")?;
    let metadata = args.get("metadata").cloned().unwrap_or(json!({}));

    ctx.store
        .upsert_agent(agent_id, agent_type, &metadata)
        .map_err(|e| ToolError::new("store_error", e.to_string()))?;
    let instance_id = ctx
        .store
        .create_instance(agent_id, optional_str(args, "session_id"), optional_str(args, "project_dir"), optional_str(args, "host"))
        .map_err(|e| ToolError::new("store_error", e.to_string()))?;
    let channel = ensure_dedicated_channel(ctx, agent_id).await?;

    Ok(json!({ "agent_id": agent_id, "instance_id": instance_id, "channel": channel }))
}

pub struct AgentMessageTool;

#[async_trait]
impl Tool for AgentMessageTool {
    fn name(&self) -> &str {
        "agents.agent_message"
    }
    fn description(&self) -> &str {
        "Post a status/update message from an agent to its dedicated channel, gated by AFK state (spec §4.7)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string"},
                "content": {"type": "string"},
                "topic": {"type": "string"}
            },
            "required": ["agent_id", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match agent_message(ctx, call).await {
            Ok(value) => value,
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn agent_message(ctx: &ToolContext, call: &ToolCall) -> crate::error::Result<ToolOutput> {
    let args = &call.args;
    let agent_id = require_str(args, "agent_id")?;
    let content = require_str(args, "content")?;
    let topic = optional_str(args, "topic").unwrap_or("updates").to_string();

    if !afk_is_active(ctx)? {
        return Ok(ToolOutput::skipped(
            &call.id,
            "outbound agent message suppressed: AFK is disabled and no override is set",
        ));
    }

    let stream = dedicated_stream(agent_id);
    let form = json!({ "type": "stream", "to": stream, "topic": topic, "content": content });
    let response = ctx.rest.call(ToolFamily::Send, None, Method::POST, "/messages", None, Some(&form)).await?;
    Ok(ToolOutput::ok(&call.id, json!({ "message_id": response.get("id").cloned().unwrap_or(Value::Null) })))
}

pub struct RequestUserInputTool;

#[async_trait]
impl Tool for RequestUserInputTool {
    fn name(&self) -> &str {
        "agents.request_user_input"
    }
    fn description(&self) -> &str {
        "Post a question to the agent's dedicated channel and record a pending input request keyed by request id."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string"},
                "question": {"type": "string"},
                "context": {"type": "string"},
                "options": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["agent_id", "question"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match request_user_input(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn request_user_input(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let agent_id = require_str(args, "agent_id")?;
    let question = require_str(args, "question")?;
    let context = optional_str(args, "context");
    let options: Vec<String> = match args.get("options") {
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        _ => Vec::new(),
    };

    let request_id = ctx
        .store
        .create_request(agent_id, question, context, &options)
        .map_err(|e| ToolError::new("store_error", e.to_string()))?;

    // Topic embeds the request id (listener correlation rule b); the body
    // also carries it explicitly (rule a), which takes precedence.
    let topic = format!("request-{request_id}");
    let mut body = format!("**{question}**\n");
    if let Some(ctx_text) = context {
        body.push_str(&format!("\n{ctx_text}\n"));
    }
    if !options.is_empty() {
        body.push('\n');
        for (i, option) in options.iter().enumerate() {
            body.push_str(&format!("{}. {option}\n", i + 1));
        }
    }
    body.push_str(&format!("\n_Reply in this topic. Request ID: `{request_id}`_"));

    let stream = dedicated_stream(agent_id);
    let form = json!({ "type": "stream", "to": stream, "topic": topic, "content": body });
    ctx.rest.call(ToolFamily::Send, None, Method::POST, "/messages", None, Some(&form)).await?;

    Ok(json!({ "request_id": request_id, "status": "pending" }))
}

pub struct WaitForResponseTool;

#[async_trait]
impl Tool for WaitForResponseTool {
    fn name(&self) -> &str {
        "agents.wait_for_response"
    }
    fn description(&self) -> &str {
        "Poll a pending input request until it is answered, cancelled, or times out (default 300s, spec §4.5)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "request_id": {"type": "string"},
                "timeout_secs": {"type": "integer"}
            },
            "required": ["request_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match wait_for_response(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

pub(crate) async fn wait_for_response(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let request_id = require_str(args, "request_id")?;
    let timeout_secs = coerce_int(args, "timeout_secs")?
        .map(|v| v.max(1) as u64)
        .unwrap_or(ctx.agents_cfg.default_wait_timeout_secs);
    let poll_interval = Duration::from_secs(ctx.agents_cfg.wait_poll_interval_secs.max(1));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);

    loop {
        let request = ctx
            .store
            .get_request(request_id)
            .map_err(|e| ToolError::new("store_error", e.to_string()))?
            .ok_or_else(|| ToolError::new("not_found", format!("no such request: {request_id}")))?;

        if request.status.is_terminal() {
            return Ok(json!({
                "request_id": request_id,
                "status": request.status.as_str(),
                "response": request.response,
            }));
        }

        if tokio::time::Instant::now() >= deadline {
            let transitioned = ctx
                .store
                .transition_request(request_id, RequestStatus::Timeout, None)
                .map_err(|e| ToolError::new("store_error", e.to_string()))?;
            if !transitioned {
                warn!(request_id, "wait_for_response deadline hit but request already resolved concurrently");
            }
            let final_status = ctx
                .store
                .get_request(request_id)
                .map_err(|e| ToolError::new("store_error", e.to_string()))?
                .map(|r| r.status)
                .unwrap_or(RequestStatus::Timeout);
            return Ok(json!({ "request_id": request_id, "status": final_status.as_str(), "response": Value::Null }));
        }

        sleep(poll_interval).await;
    }
}

pub struct StartTaskTool;

#[async_trait]
impl Tool for StartTaskTool {
    fn name(&self) -> &str {
        "agents.start_task"
    }
    fn description(&self) -> &str {
        "Begin tracking a named task for an agent."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string"},
                "name": {"type": "string"},
                "description": {"type": "string"}
            },
            "required": ["agent_id", "name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let agent_id = match require_str(&call.args, "agent_id") {
            Ok(v) => v,
            Err(err) => return ToolOutput::err(&call.id, err),
        };
        let name = match require_str(&call.args, "name") {
            Ok(v) => v,
            Err(err) => return ToolOutput::err(&call.id, err),
        };
        match ctx.store.create_task(agent_id, name, optional_str(&call.args, "description")) {
            Ok(task_id) => ToolOutput::ok(&call.id, json!({ "task_id": task_id, "status": "pending" })),
            Err(e) => ToolOutput::err(&call.id, ToolError::new("store_error", e.to_string())),
        }
    }
}

pub struct UpdateTaskProgressTool;

#[async_trait]
impl Tool for UpdateTaskProgressTool {
    fn name(&self) -> &str {
        "agents.update_task_progress"
    }
    fn description(&self) -> &str {
        "Advance a task's progress (0-100). Non-monotonic or post-terminal updates are ignored (spec §8)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "progress": {"type": "integer"},
                "outputs": {}
            },
            "required": ["task_id", "progress"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let task_id = match require_str(&call.args, "task_id") {
            Ok(v) => v,
            Err(err) => return ToolOutput::err(&call.id, err),
        };
        let progress = match require_int(&call.args, "progress") {
            Ok(v) => v.clamp(0, 100) as u8,
            Err(err) => return ToolOutput::err(&call.id, err),
        };
        let outputs = call.args.get("outputs");
        match ctx.store.update_task_progress(task_id, progress, outputs) {
            Ok(true) => ToolOutput::ok(&call.id, json!({ "task_id": task_id, "progress": progress })),
            Ok(false) => ToolOutput::skipped(&call.id, "update ignored: task is terminal or progress would move backwards"),
            Err(e) => ToolOutput::err(&call.id, ToolError::new("store_error", e.to_string())),
        }
    }
}

pub struct CompleteTaskTool;

#[async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &str {
        "agents.complete_task"
    }
    fn description(&self) -> &str {
        "Finalize a task as completed or failed."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "status": {"type": "string", "enum": ["completed", "failed"]},
                "outputs": {},
                "metrics": {}
            },
            "required": ["task_id", "status"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let task_id = match require_str(&call.args, "task_id") {
            Ok(v) => v,
            Err(err) => return ToolOutput::err(&call.id, err),
        };
        let status = match narrow_enum(&call.args, "status", &["completed", "failed"]) {
            Ok("completed") => TaskStatus::Completed,
            Ok(_) => TaskStatus::Failed,
            Err(err) => return ToolOutput::err(&call.id, err),
        };
        match ctx.store.complete_task(task_id, status, call.args.get("outputs"), call.args.get("metrics")) {
            Ok(true) => ToolOutput::ok(&call.id, json!({ "task_id": task_id, "status": status.as_str() })),
            Ok(false) => ToolOutput::skipped(&call.id, "task was already terminal"),
            Err(e) => ToolOutput::err(&call.id, ToolError::new("store_error", e.to_string())),
        }
    }
}

pub struct ListInstancesTool;

#[async_trait]
impl Tool for ListInstancesTool {
    fn name(&self) -> &str {
        "agents.list_instances"
    }
    fn description(&self) -> &str {
        "List recent agent instances, most recently started first."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "limit": {"type": "integer"} },
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let limit = match coerce_int(&call.args, "limit") {
            Ok(v) => v.unwrap_or(20).clamp(1, 500) as u32,
            Err(err) => return ToolOutput::err(&call.id, err),
        };
        let instances = ctx.store.list_instances(limit);
        let items: Vec<Value> = instances
            .into_iter()
            .map(|i| json!({
                "instance_id": i.instance_id,
                "agent_id": i.agent_id,
                "session_id": i.session_id,
                "project_dir": i.project_dir,
                "host": i.host,
                "started_at": i.started_at,
            }))
            .collect();
        ToolOutput::ok(&call.id, json!({ "instances": items }))
    }
}

pub struct AfkEnableTool;

#[async_trait]
impl Tool for AfkEnableTool {
    fn name(&self) -> &str {
        "agents.afk_enable"
    }
    fn description(&self) -> &str {
        "Enable AFK mode, optionally with an auto-return delay in hours and a reason."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "hours": {"type": "number"},
                "reason": {"type": "string"}
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let reason = optional_str(&call.args, "reason").map(str::to_string);
        let auto_return_at: Option<DateTime<Utc>> = call
            .args
            .get("hours")
            .and_then(Value::as_f64)
            .map(|hours| Utc::now() + chrono::Duration::milliseconds((hours * 3_600_000.0) as i64));
        match ctx.store.set_afk(true, reason, auto_return_at) {
            Ok(()) => {
                zulip_mcp_config::Metrics::global().record_afk_transition();
                ToolOutput::ok(&call.id, json!({ "is_afk": true, "auto_return_at": auto_return_at }))
            }
            Err(e) => ToolOutput::err(&call.id, ToolError::new("store_error", e.to_string())),
        }
    }
}

pub struct AfkDisableTool;

#[async_trait]
impl Tool for AfkDisableTool {
    fn name(&self) -> &str {
        "agents.afk_disable"
    }
    fn description(&self) -> &str {
        "Disable AFK mode."
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "additionalProperties": false })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match ctx.store.set_afk(false, None, None) {
            Ok(()) => {
                zulip_mcp_config::Metrics::global().record_afk_transition();
                ToolOutput::ok(&call.id, json!({ "is_afk": false }))
            }
            Err(e) => ToolOutput::err(&call.id, ToolError::new("store_error", e.to_string())),
        }
    }
}

pub struct AfkStatusTool;

#[async_trait]
impl Tool for AfkStatusTool {
    fn name(&self) -> &str {
        "agents.afk_status"
    }
    fn description(&self) -> &str {
        "Report the current AFK state."
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "additionalProperties": false })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match ctx.store.get_afk() {
            Ok(state) => ToolOutput::ok(
                &call.id,
                json!({
                    "is_afk": state.is_afk,
                    "reason": state.reason,
                    "auto_return_at": state.auto_return_at,
                    "updated_at": state.updated_at,
                }),
            ),
            Err(e) => ToolOutput::err(&call.id, ToolError::new("store_error", e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ctx() -> (tempfile::TempDir, ToolContext) {
        use zulip_mcp_config::{CacheConfig, Credentials, RestConfig};
        use zulip_mcp_rest::{IdentityRegistry, RestClient};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(zulip_mcp_store::Store::init(dir.path().join("s.db")).unwrap());
        let identities = Arc::new(IdentityRegistry::new(Credentials::default()));
        let rest = Arc::new(RestClient::new(identities, store.clone(), RestConfig::default(), CacheConfig::default()).unwrap());
        (dir, ToolContext::new(rest, store, Default::default()))
    }

    #[tokio::test]
    async fn afk_enable_then_status_round_trips() {
        let (_dir, ctx) = test_ctx();
        let call = ToolCall { id: "1".into(), name: "agents.afk_enable".into(), args: json!({"hours": 2, "reason": "lunch"}) };
        let out = AfkEnableTool.execute(&ctx, &call).await;
        assert!(!out.is_error);
        let status = AfkStatusTool.execute(&ctx, &ToolCall { id: "2".into(), name: "agents.afk_status".into(), args: json!({}) }).await;
        assert_eq!(status.value["is_afk"], true);
        assert_eq!(status.value["reason"], "lunch");
    }

    #[tokio::test]
    async fn task_progress_update_rejects_regression() {
        let (_dir, ctx) = test_ctx();
        let task_id = ctx.store.create_task("agent-1", "build", None).unwrap();
        assert!(ctx.store.update_task_progress(&task_id, 50, None).unwrap());
        assert!(!ctx.store.update_task_progress(&task_id, 10, None).unwrap());
    }

    #[tokio::test]
    async fn wait_for_response_times_out_and_transitions_request() {
        let (_dir, mut ctx) = test_ctx();
        ctx.agents_cfg.wait_poll_interval_secs = 1;
        ctx.agents_cfg.default_wait_timeout_secs = 1;
        let request_id = ctx.store.create_request("agent-1", "pick one?", None, &[]).unwrap();
        let result = wait_for_response(&ctx, &json!({"request_id": request_id, "timeout_secs": 1})).await.unwrap();
        assert_eq!(result["status"], "timeout");
    }

    #[tokio::test]
    async fn agent_message_is_skipped_while_afk_is_disabled() {
        let (_dir, ctx) = test_ctx();
        std::env::remove_var(AFK_OVERRIDE_ENV);
        ctx.store.set_afk(false, None, None).unwrap();
        let call = ToolCall { id: "1".into(), name: "agents.agent_message".into(), args: json!({"agent_id": "agent-1", "content": "hi"}) };
        let out = agent_message(&ctx, &call).await.unwrap();
        assert_eq!(out.value["status"], "skipped");
    }

    #[tokio::test]
    async fn afk_is_active_true_while_away() {
        let (_dir, ctx) = test_ctx();
        std::env::remove_var(AFK_OVERRIDE_ENV);
        ctx.store.set_afk(true, None, None).unwrap();
        assert!(afk_is_active(&ctx).unwrap());
    }

    #[tokio::test]
    async fn afk_is_active_true_when_override_set_even_if_present() {
        let (_dir, ctx) = test_ctx();
        std::env::set_var(AFK_OVERRIDE_ENV, "1");
        ctx.store.set_afk(false, None, None).unwrap();
        let active = afk_is_active(&ctx).unwrap();
        std::env::remove_var(AFK_OVERRIDE_ENV);
        assert!(active);
    }
}
