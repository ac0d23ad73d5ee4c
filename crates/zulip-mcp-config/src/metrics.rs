// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! The one metrics surface the process exposes (spec §9 "Metric
//! duplication caution": implement one, not two). A plain struct of
//! counters behind a process-wide [`OnceLock`], read back through a
//! diagnostic tool rather than pulled in from a third-party metrics crate
//! — the reference architecture carries no metrics dependency in its
//! tool-facing crates, so an in-process counter struct matches its weight
//! class.
//!
//! Every crate in the workspace reaches the same instance via
//! [`Metrics::global`] rather than threading an `Arc<Metrics>` through
//! every constructor — the counters are genuinely global process state,
//! not a per-call dependency any single component owns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use serde_json::{json, Value};

#[derive(Default)]
struct HttpStats {
    count: u64,
    total_ms: u64,
}

pub struct Metrics {
    tool_invocations: Mutex<HashMap<(String, String), u64>>,
    http_requests: Mutex<HashMap<String, HttpStats>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    listener_reregistrations: AtomicU64,
    afk_transitions: AtomicU64,
}

impl Metrics {
    fn new() -> Self {
        Self {
            tool_invocations: Mutex::new(HashMap::new()),
            http_requests: Mutex::new(HashMap::new()),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            listener_reregistrations: AtomicU64::new(0),
            afk_transitions: AtomicU64::new(0),
        }
    }

    /// The single process-wide instance (spec §9: one metrics system).
    pub fn global() -> &'static Metrics {
        static INSTANCE: OnceLock<Metrics> = OnceLock::new();
        INSTANCE.get_or_init(Metrics::new)
    }

    pub fn record_tool_invocation(&self, name: &str, status: &str) {
        let mut map = self.tool_invocations.lock().expect("tool invocation metrics mutex poisoned");
        *map.entry((name.to_string(), status.to_string())).or_insert(0) += 1;
    }

    pub fn record_http_request(&self, endpoint: &str, duration: Duration) {
        let mut map = self.http_requests.lock().expect("http metrics mutex poisoned");
        let entry = map.entry(endpoint.to_string()).or_default();
        entry.count += 1;
        entry.total_ms += duration.as_millis() as u64;
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listener_reregistration(&self) {
        self.listener_reregistrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_afk_transition(&self) {
        self.afk_transitions.fetch_add(1, Ordering::Relaxed);
    }

    /// A JSON snapshot suitable for a diagnostic MCP tool to return
    /// verbatim.
    pub fn snapshot(&self) -> Value {
        let tool_invocations: Vec<Value> = self
            .tool_invocations
            .lock()
            .expect("tool invocation metrics mutex poisoned")
            .iter()
            .map(|((name, status), count)| json!({ "tool": name, "status": status, "count": count }))
            .collect();

        let http_requests: Vec<Value> = self
            .http_requests
            .lock()
            .expect("http metrics mutex poisoned")
            .iter()
            .map(|(endpoint, stats)| {
                let avg_ms = if stats.count > 0 { stats.total_ms / stats.count } else { 0 };
                json!({ "endpoint": endpoint, "count": stats.count, "avg_duration_ms": avg_ms })
            })
            .collect();

        json!({
            "tool_invocations": tool_invocations,
            "http_requests": http_requests,
            "cache": {
                "hits": self.cache_hits.load(Ordering::Relaxed),
                "misses": self.cache_misses.load(Ordering::Relaxed),
            },
            "listener_reregistrations": self.listener_reregistrations.load(Ordering::Relaxed),
            "afk_transitions": self.afk_transitions.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_empty_initially() {
        let m = Metrics::new();
        let snap = m.snapshot();
        assert_eq!(snap["tool_invocations"].as_array().unwrap().len(), 0);
        assert_eq!(snap["cache"]["hits"], 0);
    }

    #[test]
    fn records_tool_invocations_by_name_and_status() {
        let m = Metrics::new();
        m.record_tool_invocation("messaging.send", "success");
        m.record_tool_invocation("messaging.send", "success");
        m.record_tool_invocation("messaging.send", "error");
        let snap = m.snapshot();
        let rows = snap["tool_invocations"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        let total: u64 = rows.iter().map(|r| r["count"].as_u64().unwrap()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn records_http_duration_averages_per_endpoint() {
        let m = Metrics::new();
        m.record_http_request("/messages", Duration::from_millis(100));
        m.record_http_request("/messages", Duration::from_millis(300));
        let snap = m.snapshot();
        let rows = snap["http_requests"].as_array().unwrap();
        assert_eq!(rows[0]["endpoint"], "/messages");
        assert_eq!(rows[0]["count"], 2);
        assert_eq!(rows[0]["avg_duration_ms"], 200);
    }

    #[test]
    fn cache_hits_and_misses_counted_independently() {
        let m = Metrics::new();
        m.record_cache_hit();
        m.record_cache_hit();
        m.record_cache_miss();
        let snap = m.snapshot();
        assert_eq!(snap["cache"]["hits"], 2);
        assert_eq!(snap["cache"]["misses"], 1);
    }

    #[test]
    fn global_returns_the_same_instance_across_calls() {
        Metrics::global().record_afk_transition();
        let before = Metrics::global().snapshot()["afk_transitions"].as_u64().unwrap();
        Metrics::global().record_afk_transition();
        let after = Metrics::global().snapshot()["afk_transitions"].as_u64().unwrap();
        assert_eq!(after, before + 1);
    }
}
