// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! AFK Controller (C7, spec §4.7): starts and stops the event listener in
//! step with `Store::get_afk`, and clears AFK automatically once
//! `auto_return_at` has passed.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use zulip_mcp_config::ListenerConfig;
use zulip_mcp_rest::RestClient;
use zulip_mcp_store::Store;

use crate::listener::Listener;
use crate::state::ListenerState;

struct RunningListener {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Drives the listener lifecycle: `stopped -> starting -> running ->
/// draining -> stopped`. Runs the bot in listener mode whenever AFK is
/// disabled, and drains it as soon as the user returns (AFK disabled) or
/// goes AFK again (spec §4.7: listening only happens while away, since a
/// present user handles their own messages).
pub struct AfkController {
    rest: Arc<RestClient>,
    store: Arc<Store>,
    listener_cfg: ListenerConfig,
    state: Mutex<ListenerState>,
    running: Mutex<Option<RunningListener>>,
}

impl AfkController {
    pub fn new(rest: Arc<RestClient>, store: Arc<Store>, listener_cfg: ListenerConfig) -> Self {
        Self { rest, store, listener_cfg, state: Mutex::new(ListenerState::Stopped), running: Mutex::new(None) }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock().expect("listener state mutex poisoned")
    }

    /// One controller tick (spec §4.7, every `controller_tick_secs`):
    /// resolve AFK auto-return, then reconcile the listener's running
    /// state against the current AFK flag.
    pub async fn tick(&self) {
        self.resolve_auto_return();

        let is_afk = match self.store.get_afk() {
            Ok(afk) => afk.is_afk,
            Err(err) => {
                warn!(%err, "afk controller failed to read afk state; leaving listener as-is");
                return;
            }
        };

        if is_afk {
            self.ensure_started().await;
        } else {
            self.ensure_stopped().await;
        }
    }

    fn resolve_auto_return(&self) {
        let afk = match self.store.get_afk() {
            Ok(afk) => afk,
            Err(_) => return,
        };
        let Some(deadline) = afk.auto_return_at else { return };
        if !afk.is_afk || Utc::now() < deadline {
            return;
        }
        match self.store.set_afk(false, None, None) {
            Ok(()) => {
                zulip_mcp_config::Metrics::global().record_afk_transition();
                info!("afk auto-return deadline passed; marking as present")
            }
            Err(err) => warn!(%err, "failed to clear afk state at auto-return deadline"),
        }
    }

    async fn ensure_started(&self) {
        {
            let state = self.state.lock().expect("listener state mutex poisoned");
            if *state != ListenerState::Stopped {
                return;
            }
        }
        *self.state.lock().expect("listener state mutex poisoned") = ListenerState::Starting;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = Listener::new(self.rest.clone(), self.store.clone(), self.listener_cfg.clone());
        let handle = tokio::spawn(async move {
            listener.run(shutdown_rx).await;
        });

        *self.running.lock().expect("running listener mutex poisoned") = Some(RunningListener { handle, shutdown: shutdown_tx });
        *self.state.lock().expect("listener state mutex poisoned") = ListenerState::Running;
    }

    async fn ensure_stopped(&self) {
        let running = self.running.lock().expect("running listener mutex poisoned").take();
        let Some(running) = running else { return };

        *self.state.lock().expect("listener state mutex poisoned") = ListenerState::Draining;
        let _ = running.shutdown.send(true);
        if let Err(err) = running.handle.await {
            warn!(%err, "listener task panicked while draining");
        }
        *self.state.lock().expect("listener state mutex poisoned") = ListenerState::Stopped;
    }

    /// Force-stop the listener regardless of AFK state, for process
    /// shutdown (spec §4.12 bootstrap graceful shutdown).
    pub async fn shutdown(&self) {
        self.ensure_stopped().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use zulip_mcp_config::{Credentials, RestConfig, CacheConfig};
    use zulip_mcp_rest::IdentityRegistry;

    fn test_controller() -> (AfkController, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(Store::init(dir.path().join("store.db")).expect("open store"));
        let identities = Arc::new(IdentityRegistry::new(Credentials::default()));
        let rest = Arc::new(RestClient::new(identities, store.clone(), RestConfig::default(), CacheConfig::default()).expect("rest client"));
        let controller = AfkController::new(rest, store, ListenerConfig::default());
        (controller, dir)
    }

    #[tokio::test]
    async fn starts_stopped_and_stays_stopped_while_present() {
        let (controller, _dir) = test_controller();
        assert_eq!(controller.state(), ListenerState::Stopped);
        controller.tick().await;
        assert_eq!(controller.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn auto_return_clears_afk_once_the_deadline_passes() {
        let (controller, _dir) = test_controller();
        controller.store.set_afk(true, Some("lunch".into()), Some(Utc::now() - chrono::Duration::seconds(1))).expect("set afk");
        controller.resolve_auto_return();
        let afk = controller.store.get_afk().expect("get afk");
        assert!(!afk.is_afk);
    }
}
