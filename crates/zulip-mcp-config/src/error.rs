// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required user credentials (ZULIP_EMAIL/ZULIP_API_KEY/ZULIP_SITE, --email/--api-key/--site, or a zuliprc file)")]
    MissingUserCredentials,

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {message}")]
    Parse { path: String, message: String },

    #[error("parsing YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
