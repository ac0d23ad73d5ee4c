// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Shared dependencies threaded through every tool family.

use std::sync::Arc;

use zulip_mcp_config::AgentsConfig;
use zulip_mcp_rest::RestClient;
use zulip_mcp_store::Store;

#[derive(Clone)]
pub struct ToolContext {
    pub rest: Arc<RestClient>,
    pub store: Arc<Store>,
    pub agents_cfg: AgentsConfig,
}

impl ToolContext {
    pub fn new(rest: Arc<RestClient>, store: Arc<Store>, agents_cfg: AgentsConfig) -> Self {
        Self { rest, store, agents_cfg }
    }
}
