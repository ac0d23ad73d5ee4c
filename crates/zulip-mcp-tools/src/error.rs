// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Structured tool-error shape (spec §4.4): every tool failure — validation,
//! capability, REST, or resolver — is normalized into
//! `{status: "error", error: {code, message, suggestions[], recovery?}}`.

use serde::Serialize;
use serde_json::{json, Value};
use zulip_mcp_rest::RestError;

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryHint {
    pub tool: String,
    pub hint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryHint>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into(), suggestions: Vec::new(), recovery: None }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_recovery(mut self, tool: impl Into<String>, hint: impl Into<String>) -> Self {
        self.recovery = Some(RecoveryHint { tool: tool.into(), hint: hint.into() });
        self
    }

    pub fn into_response(self) -> Value {
        json!({ "status": "error", "error": self })
    }

    pub fn validation(param: &str, message: impl Into<String>, example: impl std::fmt::Display) -> Self {
        Self::new(
            "validation_error",
            format!("{param}: {} (example: {example})", message.into()),
        )
    }
}

impl From<RestError> for ToolError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::IdentityUnavailable { kind } => {
                Self::new("identity_unavailable", format!("no credentials configured for identity '{kind}'"))
            }
            RestError::CapabilityDenied { kind, family } => Self::new(
                "capability_denied",
                format!("identity '{kind}' may not use the '{family:?}' tool family"),
            )
            .with_suggestions(vec!["retry with a different identity via preferred_kind, if available".into()]),
            RestError::Auth { status, message } => {
                Self::new("auth_error", format!("authentication failed ({status}): {message}"))
            }
            RestError::NotFound(detail) => Self::new("not_found", detail),
            RestError::RateLimit { retry_after_secs } => Self::new(
                "rate_limited",
                format!("rate limited by Zulip; retry after {retry_after_secs:?}s"),
            ),
            RestError::Transient { attempts, message } => {
                Self::new("transient_error", format!("failed after {attempts} attempt(s): {message}"))
            }
            RestError::Transport(e) => Self::new("transport_error", e.to_string()),
            RestError::Decode(msg) => Self::new("decode_error", msg),
            RestError::AmbiguousUser { query, candidates } => Self::new(
                "ambiguous_user",
                format!("'{query}' matches multiple users"),
            )
            .with_suggestions(candidates.into_iter().map(|c| format!("{} <{}>", c.full_name, c.email)).collect())
            .with_recovery("users.search", "disambiguate with a full email address"),
            RestError::UserNotFound { query, suggestion } => {
                Self::new("user_not_found", format!("no user matches '{query}'")).with_recovery("users.list", suggestion)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;
