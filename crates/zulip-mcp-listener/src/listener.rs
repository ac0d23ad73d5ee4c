// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Event Listener run loop (C6, spec §4.6): registers an event queue under
//! the bot identity, long-polls it, and correlates inbound messages to
//! pending input requests via [`crate::correlator`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zulip_mcp_config::{IdentityKind, ListenerConfig, ToolFamily};
use zulip_mcp_rest::RestClient;
use zulip_mcp_store::{RequestStatus, Store};

use crate::correlator::{correlate, InboundMessage};

/// Queue lifespan ceiling shared with the tool-callable events family
/// (spec §4.5 register: "a lifespan ≤ 300 s").
const QUEUE_LIFESPAN_SECS: i64 = 300;

pub struct Listener {
    rest: Arc<RestClient>,
    store: Arc<Store>,
    listener_cfg: ListenerConfig,
}

impl Listener {
    pub fn new(rest: Arc<RestClient>, store: Arc<Store>, listener_cfg: ListenerConfig) -> Self {
        Self { rest, store, listener_cfg }
    }

    /// Run until `shutdown` is signaled or the bot identity is
    /// unavailable. Deregisters its queue on the way out.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let registered = match self.register().await {
            Ok(q) => q,
            Err(err) => {
                warn!(%err, "event listener failed to register a queue; not starting");
                return;
            }
        };
        let mut queue_id = registered.0;
        let mut last_event_id = registered.1;
        let mut re_registrations = 0u32;

        info!(queue_id = %queue_id, "event listener started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                result = self.poll_once(&queue_id, last_event_id) => {
                    match result {
                        Ok((events, new_last_id)) => {
                            last_event_id = new_last_id;
                            for event in events {
                                self.handle_event(&event).await;
                            }
                        }
                        Err(zulip_mcp_rest::RestError::NotFound(_)) => {
                            re_registrations += 1;
                            zulip_mcp_config::Metrics::global().record_listener_reregistration();
                            warn!(re_registrations, "event queue expired; re-registering");
                            match self.register().await {
                                Ok((new_queue, new_last)) => {
                                    queue_id = new_queue;
                                    last_event_id = new_last;
                                    if re_registrations > 1 {
                                        // A second immediate expiry backs off rather
                                        // than hot-looping re-registration attempts
                                        // (spec §8 "single queue_expired" rule).
                                        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                                    }
                                }
                                Err(err) => {
                                    warn!(%err, "failed to re-register event queue after expiry");
                                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                                }
                            }
                        }
                        Err(err) => {
                            warn!(%err, "event poll failed; backing off");
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        let _ = self
            .rest
            .call(ToolFamily::StreamEvents, Some(IdentityKind::Bot), Method::DELETE, "/events", Some(&json!({ "queue_id": queue_id })), None)
            .await;
        info!(queue_id = %queue_id, "event listener drained and deregistered its queue");
    }

    async fn register(&self) -> Result<(String, i64), zulip_mcp_rest::RestError> {
        let form = json!({
            "event_types": serde_json::to_string(&["message"]).unwrap(),
            "queue_lifespan_secs": QUEUE_LIFESPAN_SECS,
        });
        let response = self
            .rest
            .call(ToolFamily::StreamEvents, Some(IdentityKind::Bot), Method::POST, "/register", None, Some(&form))
            .await?;
        let queue_id = response
            .get("queue_id")
            .and_then(Value::as_str)
            .ok_or_else(|| zulip_mcp_rest::RestError::Decode("register response missing queue_id".into()))?
            .to_string();
        let last_event_id = response.get("last_event_id").and_then(Value::as_i64).unwrap_or(-1);
        Ok((queue_id, last_event_id))
    }

    async fn poll_once(&self, queue_id: &str, last_event_id: i64) -> Result<(Vec<Value>, i64), zulip_mcp_rest::RestError> {
        let query = json!({ "queue_id": queue_id, "last_event_id": last_event_id, "dont_block": false });
        let response = self.rest.call(ToolFamily::StreamEvents, Some(IdentityKind::Bot), Method::GET, "/events", Some(&query), None).await?;
        let mut new_last_id = last_event_id;
        let events = response.get("events").and_then(Value::as_array).cloned().unwrap_or_default();
        for event in &events {
            if let Some(id) = event.get("id").and_then(Value::as_i64) {
                new_last_id = new_last_id.max(id);
            }
        }
        Ok((events, new_last_id))
    }

    async fn handle_event(&self, event: &Value) {
        if event.get("type").and_then(Value::as_str) != Some("message") {
            return;
        }
        let Some(message) = event.get("message") else { return };
        let body = message.get("content").and_then(Value::as_str).unwrap_or_default();
        let topic = message.get("subject").and_then(Value::as_str).unwrap_or_default();
        let stream_name = match message.get("display_recipient") {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        };
        let sent_at = message
            .get("timestamp")
            .and_then(Value::as_i64)
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        let pending = self.store.list_all_pending();
        if pending.is_empty() {
            return;
        }

        let inbound = InboundMessage { body, topic, stream_name, sent_at };
        let Some((request_id, rule)) = correlate(&inbound, &pending, self.listener_cfg.fallback_correlation, self.listener_cfg.correlation_recency_secs as i64) else {
            return;
        };

        if matches!(rule, crate::correlator::CorrelationRule::RecencyFallback) {
            warn!(request_id = %request_id, "correlated inbound message via recency fallback, the least precise rule");
        } else {
            debug!(request_id = %request_id, ?rule, "correlated inbound message to a pending request");
        }

        match self.store.transition_request(&request_id, RequestStatus::Answered, Some(body)) {
            Ok(true) => info!(request_id = %request_id, "recorded response for pending input request"),
            Ok(false) => debug!(request_id = %request_id, "correlated request was already terminal"),
            Err(err) => warn!(%err, request_id = %request_id, "failed to record response"),
        }
    }
}
