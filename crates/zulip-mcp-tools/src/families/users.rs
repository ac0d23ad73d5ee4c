// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Users family (spec §4.5 "Users"): list, get, own, presence,
//! switch_identity, manage_groups.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use zulip_mcp_config::{IdentityKind, ToolFamily};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCall, ToolOutput};
use crate::validator::{narrow_enum, require_str};

fn preferred_kind(args: &Value) -> Option<IdentityKind> {
    match args.get("preferred_kind").and_then(Value::as_str) {
        Some("user") => Some(IdentityKind::User),
        Some("bot") => Some(IdentityKind::Bot),
        Some("admin") => Some(IdentityKind::Admin),
        _ => None,
    }
}

pub struct ListUsersTool;

#[async_trait]
impl Tool for ListUsersTool {
    fn name(&self) -> &str {
        "users.list"
    }
    fn description(&self) -> &str {
        "List realm members (read-only projection, cached per spec §4.3)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]} },
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let kind = preferred_kind(&call.args).unwrap_or(IdentityKind::User);
        match ctx.rest.cached_users(kind).await {
            Ok(users) => {
                let members: Vec<Value> = users.into_iter().map(|u| json!({ "email": u.email, "full_name": u.full_name })).collect();
                ToolOutput::ok(&call.id, json!({ "members": members }))
            }
            Err(err) => ToolOutput::err(&call.id, err.into()),
        }
    }
}

pub struct GetUserTool;

#[async_trait]
impl Tool for GetUserTool {
    fn name(&self) -> &str {
        "users.get"
    }
    fn description(&self) -> &str {
        "Resolve a fuzzy identifier (email or name) to a canonical user record via the User Resolver (spec §4.10)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "identifier": {"type": "string"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["identifier"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let identifier = match require_str(&call.args, "identifier") {
            Ok(i) => i,
            Err(err) => return ToolOutput::err(&call.id, err),
        };
        let kind = preferred_kind(&call.args).unwrap_or(IdentityKind::User);
        match ctx.rest.resolve_user(identifier, kind).await {
            Ok(resolved) => ToolOutput::ok(&call.id, json!({ "email": resolved.email, "full_name": resolved.full_name })),
            Err(err) => ToolOutput::err(&call.id, err.into()),
        }
    }
}

pub struct OwnUserTool;

#[async_trait]
impl Tool for OwnUserTool {
    fn name(&self) -> &str {
        "users.own"
    }
    fn description(&self) -> &str {
        "Fetch the profile of the currently active identity."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]} },
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let kind = preferred_kind(&call.args);
        match ctx.rest.call(ToolFamily::Read, kind, Method::GET, "/users/me", None, None).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err.into()),
        }
    }
}

pub struct PresenceTool;

#[async_trait]
impl Tool for PresenceTool {
    fn name(&self) -> &str {
        "users.presence"
    }
    fn description(&self) -> &str {
        "Get realm presence, or set the active identity's own presence status."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": ["active", "idle"]},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let kind = preferred_kind(&call.args);
        let result = match call.args.get("status").and_then(Value::as_str) {
            Some(status) => {
                let form = json!({ "status": status, "new_user_input": true });
                ctx.rest.call(ToolFamily::Read, kind, Method::POST, "/users/me/presence", None, Some(&form)).await
            }
            None => ctx.rest.call(ToolFamily::Read, kind, Method::GET, "/users/me/presence", None, None).await,
        };
        match result {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err.into()),
        }
    }
}

pub struct SwitchIdentityTool;

#[async_trait]
impl Tool for SwitchIdentityTool {
    fn name(&self) -> &str {
        "users.switch_identity"
    }
    fn description(&self) -> &str {
        "Switch the runtime-active identity (spec §4.2). Validated via a token round-trip before activation; a failed probe leaves the previous identity active."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "kind": {"type": "string", "enum": ["user", "bot", "admin"]} },
            "required": ["kind"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let kind = match narrow_enum(&call.args, "kind", &["user", "bot", "admin"]) {
            Ok(k) => match k {
                "user" => IdentityKind::User,
                "bot" => IdentityKind::Bot,
                _ => IdentityKind::Admin,
            },
            Err(err) => return ToolOutput::err(&call.id, err),
        };
        let rest = ctx.rest.clone();
        let result = ctx
            .rest
            .identities()
            .switch_identity(kind, move |_creds| {
                let rest = rest.clone();
                async move { rest.call(ToolFamily::Read, Some(kind), Method::GET, "/users/me", None, None).await.map(|_| ()) }
            })
            .await;
        match result {
            Ok(()) => ToolOutput::ok(&call.id, json!({ "active_identity": kind.to_string() })),
            Err(err) => ToolOutput::err(&call.id, err.into()),
        }
    }
}

pub struct ManageGroupsTool;

#[async_trait]
impl Tool for ManageGroupsTool {
    fn name(&self) -> &str {
        "users.manage_groups"
    }
    fn description(&self) -> &str {
        "List user groups and their members. Create/update/delete require admin capability and are reported as unimplemented when the underlying API is absent from this client (spec §4.5, §9 open question 1)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "op": {"type": "string", "enum": ["list", "members", "create", "update", "delete"]},
                "group_id": {"type": "integer"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["op"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let op = match narrow_enum(&call.args, "op", &["list", "members", "create", "update", "delete"]) {
            Ok(o) => o,
            Err(err) => return ToolOutput::err(&call.id, err),
        };
        let kind = preferred_kind(&call.args);
        match op {
            "list" => match ctx.rest.call(ToolFamily::Read, kind, Method::GET, "/user_groups", None, None).await {
                Ok(value) => ToolOutput::ok(&call.id, value),
                Err(err) => ToolOutput::err(&call.id, err.into()),
            },
            "members" => {
                let group_id = match call.args.get("group_id").and_then(Value::as_i64) {
                    Some(id) => id,
                    None => return ToolOutput::err(&call.id, ToolError::validation("group_id", "is required", 1)),
                };
                match ctx
                    .rest
                    .call(ToolFamily::Read, kind, Method::GET, &format!("/user_groups/{group_id}/members"), None, None)
                    .await
                {
                    Ok(value) => ToolOutput::ok(&call.id, value),
                    Err(err) => ToolOutput::err(&call.id, err.into()),
                }
            }
            _ => ToolOutput::partial(
                &call.id,
                json!({ "op": op }),
                "group create/update/delete are not exposed by this client's endpoint surface (spec §9 open question 1)",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use zulip_mcp_config::{CacheConfig, Credentials, RestConfig};
    use zulip_mcp_rest::{IdentityRegistry, RestClient};
    use zulip_mcp_store::Store;

    fn test_ctx() -> (tempfile::TempDir, ToolContext) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::init(dir.path().join("s.db")).unwrap());
        let identities = Arc::new(IdentityRegistry::new(Credentials::default()));
        let rest = Arc::new(RestClient::new(identities, store.clone(), RestConfig::default(), CacheConfig::default()).unwrap());
        (dir, ToolContext::new(rest, store, Default::default()))
    }

    #[test]
    fn preferred_kind_parses_each_variant() {
        assert_eq!(preferred_kind(&json!({"preferred_kind": "user"})), Some(IdentityKind::User));
        assert_eq!(preferred_kind(&json!({"preferred_kind": "bot"})), Some(IdentityKind::Bot));
        assert_eq!(preferred_kind(&json!({"preferred_kind": "admin"})), Some(IdentityKind::Admin));
        assert_eq!(preferred_kind(&json!({})), None);
    }

    #[tokio::test]
    async fn manage_groups_create_reports_partial_success_not_a_fabricated_result() {
        let (_dir, ctx) = test_ctx();
        let call = ToolCall { id: "1".into(), name: "users.manage_groups".into(), args: json!({"op": "create"}) };
        let out = ManageGroupsTool.execute(&ctx, &call).await;
        assert_eq!(out.value["status"], "partial_success");
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn manage_groups_members_requires_group_id() {
        let (_dir, ctx) = test_ctx();
        let call = ToolCall { id: "1".into(), name: "users.manage_groups".into(), args: json!({"op": "members"}) };
        let out = ManageGroupsTool.execute(&ctx, &call).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn get_user_requires_identifier() {
        let (_dir, ctx) = test_ctx();
        let call = ToolCall { id: "1".into(), name: "users.get".into(), args: json!({}) };
        let out = GetUserTool.execute(&ctx, &call).await;
        assert!(out.is_error);
    }
}
