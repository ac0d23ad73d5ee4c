// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_store_path() -> PathBuf {
    PathBuf::from("zulip-mcp.db")
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_rate_limit_requests() -> u32 {
    100
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_streams_ttl_secs() -> u64 {
    600
}
fn default_users_ttl_secs() -> u64 {
    900
}
fn default_controller_tick_secs() -> u64 {
    5
}
fn default_wait_poll_interval_secs() -> u64 {
    1
}
fn default_wait_timeout_secs() -> u64 {
    300
}
fn default_correlation_recency_secs() -> u64 {
    900
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the embedded database file. Overridable by
    /// `ZULIP_MCP_DB_PATH` and by `--db-path`.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_streams_ttl_secs")]
    pub streams_ttl_secs: u64,
    #[serde(default = "default_users_ttl_secs")]
    pub users_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            streams_ttl_secs: default_streams_ttl_secs(),
            users_ttl_secs: default_users_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// How often the AFK-driven controller checks whether the listener
    /// should start or stop (spec §4.6.2).
    #[serde(default = "default_controller_tick_secs")]
    pub controller_tick_secs: u64,
    /// Whether rule (c) fallback correlation (most-recent pending request
    /// from the same sender) is enabled at all (spec §9 open question 2).
    #[serde(default = "default_true")]
    pub fallback_correlation: bool,
    /// Recency window for fallback correlation.
    #[serde(default = "default_correlation_recency_secs")]
    pub correlation_recency_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            controller_tick_secs: default_controller_tick_secs(),
            fallback_correlation: true,
            correlation_recency_secs: default_correlation_recency_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_wait_poll_interval_secs")]
    pub wait_poll_interval_secs: u64,
    #[serde(default = "default_wait_timeout_secs")]
    pub default_wait_timeout_secs: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            wait_poll_interval_secs: default_wait_poll_interval_secs(),
            default_wait_timeout_secs: default_wait_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.rest.rate_limit_requests, 100);
        assert_eq!(cfg.rest.rate_limit_window_secs, 60);
        assert_eq!(cfg.cache.streams_ttl_secs, 600);
        assert_eq!(cfg.cache.users_ttl_secs, 900);
        assert_eq!(cfg.agents.default_wait_timeout_secs, 300);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = "rest:\n  max_retries: 5\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.rest.max_retries, 5);
        assert_eq!(cfg.rest.request_timeout_secs, 30);
    }
}
