// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Event Listener (C6) and AFK Controller (C7): the always-on background
//! consumer of Zulip's event queue, gated by the AFK flag in the store.
//!
//! The bootstrap owns one [`AfkController`] for the process lifetime: spawn
//! it with [`spawn`], let it tick on its own interval, and call
//! [`ListenerHandle::shutdown`] during graceful shutdown.

pub mod afk_controller;
pub mod correlator;
pub mod listener;
pub mod state;

use std::sync::Arc;

use tracing::info;
use zulip_mcp_config::ListenerConfig;
use zulip_mcp_rest::RestClient;
use zulip_mcp_store::Store;

pub use afk_controller::AfkController;
pub use state::ListenerState;

/// A running controller plus the background task driving its tick loop.
pub struct ListenerHandle {
    controller: Arc<AfkController>,
    tick_task: tokio::task::JoinHandle<()>,
}

impl ListenerHandle {
    pub fn state(&self) -> ListenerState {
        self.controller.state()
    }

    /// Stop the tick loop and drain any running listener. Idempotent.
    pub async fn shutdown(self) {
        self.tick_task.abort();
        self.controller.shutdown().await;
        info!("afk controller shut down");
    }
}

/// Build an [`AfkController`] and spawn its tick loop at
/// `listener_cfg.controller_tick_secs` (spec §4.6.2, §4.7).
pub fn spawn(rest: Arc<RestClient>, store: Arc<Store>, listener_cfg: ListenerConfig) -> ListenerHandle {
    let tick_interval = std::time::Duration::from_secs(listener_cfg.controller_tick_secs.max(1));
    let controller = Arc::new(AfkController::new(rest, store, listener_cfg));

    let ticking = controller.clone();
    let tick_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        loop {
            interval.tick().await;
            ticking.tick().await;
        }
    });

    info!(tick_secs = tick_interval.as_secs(), "afk controller started");
    ListenerHandle { controller, tick_task }
}
