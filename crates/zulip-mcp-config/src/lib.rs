// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Configuration, credential parsing, and the static identity/capability
//! matrix shared by every other `zulip-mcp-*` crate.

mod capability;
mod credentials;
mod error;
mod loader;
mod metrics;
mod schema;

pub use capability::{ToolFamily, CAPABILITY_MATRIX};
pub use credentials::{default_zuliprc_path, resolve as resolve_credentials, ApiCredentials, CliCredentialOverrides, Credentials, IdentityKind};
pub use error::ConfigError;
pub use loader::load;
pub use metrics::Metrics;
pub use schema::*;
