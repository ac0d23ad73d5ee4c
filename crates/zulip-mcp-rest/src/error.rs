// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy for identity selection, REST dispatch, and user
//! resolution (spec §4.2, §4.3, §4.10, §7).

use thiserror::Error;
use zulip_mcp_config::{IdentityKind, ToolFamily};

/// A resolved user candidate, surfaced on ambiguous matches (spec §4.10).
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserCandidate {
    pub email: String,
    pub full_name: String,
    pub score: f64,
}

#[derive(Debug, Error)]
pub enum RestError {
    #[error("identity '{kind}' has no configured credentials")]
    IdentityUnavailable { kind: IdentityKind },

    #[error("identity '{kind}' is not permitted to use the '{family:?}' tool family")]
    CapabilityDenied { kind: IdentityKind, family: ToolFamily },

    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by Zulip; retry after {retry_after_secs:?}s")]
    RateLimit { retry_after_secs: Option<u64> },

    #[error("transient failure after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },

    #[error("request build/transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("ambiguous identifier '{query}': {} candidates within tolerance", candidates.len())]
    AmbiguousUser { query: String, candidates: Vec<UserCandidate> },

    #[error("no user found for '{query}'")]
    UserNotFound { query: String, suggestion: String },
}

pub type Result<T> = std::result::Result<T, RestError>;
