// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! The Zulip REST client (spec §4.3): identity-aware dispatch, rate
//! limiting, retry/backoff, response normalization, and an opportunistic
//! cache for streams/users fronted by the embedded store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};
use zulip_mcp_config::{ApiCredentials, CacheConfig, IdentityKind, RestConfig, ToolFamily};
use zulip_mcp_store::{CacheScope, Store};

use crate::error::{RestError, Result};
use crate::identity::IdentityRegistry;
use crate::narrow::NarrowTerm;
use crate::rate_limit::TokenBucket;
use crate::resolver::{self, ResolvedUser, ZulipUser};

/// Message-read memoization lifetime: identical queries within this window
/// are served from memory rather than re-hitting the API (spec §4.3
/// "optional short-lived memoization of identical queries within a single
/// request lifetime").
const MESSAGE_MEMO_TTL: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

pub struct RestClient {
    http: reqwest::Client,
    identities: std::sync::Arc<IdentityRegistry>,
    store: std::sync::Arc<Store>,
    rest_cfg: RestConfig,
    cache_cfg: CacheConfig,
    limiters: Mutex<HashMap<IdentityKind, std::sync::Arc<TokenBucket>>>,
    message_memo: Mutex<HashMap<String, (Instant, Value)>>,
}

impl RestClient {
    pub fn new(
        identities: std::sync::Arc<IdentityRegistry>,
        store: std::sync::Arc<Store>,
        rest_cfg: RestConfig,
        cache_cfg: CacheConfig,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(rest_cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            identities,
            store,
            rest_cfg,
            cache_cfg,
            limiters: Mutex::new(HashMap::new()),
            message_memo: Mutex::new(HashMap::new()),
        })
    }

    pub fn identities(&self) -> &std::sync::Arc<IdentityRegistry> {
        &self.identities
    }

    pub fn store(&self) -> &std::sync::Arc<Store> {
        &self.store
    }

    fn limiter_for(&self, kind: IdentityKind) -> std::sync::Arc<TokenBucket> {
        let mut limiters = self.limiters.lock().expect("rate limiter map mutex poisoned");
        limiters
            .entry(kind)
            .or_insert_with(|| {
                std::sync::Arc::new(TokenBucket::new(self.rest_cfg.rate_limit_requests, self.rest_cfg.rate_limit_window_secs))
            })
            .clone()
    }

    /// Generic authenticated call, used by every tool family. `query`/`form`
    /// are flat JSON objects; array/object values are JSON-encoded into a
    /// single form field, matching how the Zulip API accepts e.g. `narrow`.
    pub async fn call(
        &self,
        family: ToolFamily,
        preferred_kind: Option<IdentityKind>,
        method: Method,
        path: &str,
        query: Option<&Value>,
        form: Option<&Value>,
    ) -> Result<Value> {
        let (kind, creds) = self.identities.select(family, preferred_kind)?;
        self.limiter_for(kind).acquire().await;
        let start = Instant::now();
        let result = self.send_with_retry(&creds, method, path, query, form).await;
        zulip_mcp_config::Metrics::global().record_http_request(path, start.elapsed());
        result
    }

    async fn send_with_retry(
        &self,
        creds: &ApiCredentials,
        method: Method,
        path: &str,
        query: Option<&Value>,
        form: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}/api/v1{path}", creds.site.trim_end_matches('/'));
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .basic_auth(&creds.email, Some(&creds.api_key));
            if let Some(q) = query {
                builder = builder.query(&value_to_pairs(q));
            }
            if let Some(f) = form {
                builder = builder.form(&value_to_pairs(f));
            }

            let sent = builder.send().await;
            match sent {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = retry_after_secs(&response);
                        if attempt >= self.rest_cfg.max_retries {
                            return Err(RestError::RateLimit { retry_after_secs: retry_after });
                        }
                        let delay = retry_after.map(Duration::from_secs).unwrap_or_else(|| backoff_delay(attempt));
                        warn!(attempt, ?delay, "rate limited; retrying");
                        sleep(delay).await;
                        continue;
                    }
                    if status.is_server_error() {
                        if attempt >= self.rest_cfg.max_retries {
                            return Err(RestError::Transient { attempts: attempt, message: status.to_string() });
                        }
                        warn!(attempt, %status, "transient server error; retrying");
                        sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        let body = response.text().await.unwrap_or_default();
                        return Err(RestError::Auth { status: status.as_u16(), message: body });
                    }
                    if status == StatusCode::NOT_FOUND {
                        let body = response.text().await.unwrap_or_default();
                        return Err(RestError::NotFound(body));
                    }
                    return response.json::<Value>().await.map_err(|e| RestError::Decode(e.to_string()));
                }
                Err(err) if err.is_timeout() || err.is_connect() => {
                    if attempt >= self.rest_cfg.max_retries {
                        return Err(RestError::Transient { attempts: attempt, message: err.to_string() });
                    }
                    warn!(attempt, %err, "transient transport error; retrying");
                    sleep(backoff_delay(attempt)).await;
                    continue;
                }
                Err(err) => return Err(RestError::Transport(err)),
            }
        }
    }

    // ── Cached views (spec §4.3 "Caching") ────────────────────────────────

    /// Stream list, TTL 600 s by default, keyed by identity + filter flags.
    pub async fn cached_streams(&self, kind: IdentityKind, include_all: bool) -> Result<Value> {
        let cache_key = format!("{kind}:include_all={include_all}");
        if let Some((payload, fetched_at)) = self.store.get_cached(CacheScope::Streams, &cache_key) {
            let age = chrono::Utc::now().signed_duration_since(fetched_at).num_seconds().max(0) as u64;
            if age < self.cache_cfg.streams_ttl_secs {
                if let Ok(value) = serde_json::from_str(&payload) {
                    zulip_mcp_config::Metrics::global().record_cache_hit();
                    return Ok(value);
                }
            }
        }
        zulip_mcp_config::Metrics::global().record_cache_miss();
        let query = serde_json::json!({ "include_all_active": include_all });
        let value = self.call(ToolFamily::Read, Some(kind), Method::GET, "/streams", Some(&query), None).await?;
        if let Ok(payload) = serde_json::to_string(&value) {
            if let Err(err) = self.store.put_cached(CacheScope::Streams, &cache_key, &payload) {
                warn!(%err, "failed to populate stream cache");
            }
        }
        Ok(value)
    }

    /// Realm member list, TTL 900 s by default, keyed by identity.
    pub async fn cached_users(&self, kind: IdentityKind) -> Result<Vec<ZulipUser>> {
        let cache_key = kind.to_string();
        let payload = if let Some((payload, fetched_at)) = self.store.get_cached(CacheScope::Users, &cache_key) {
            let age = chrono::Utc::now().signed_duration_since(fetched_at).num_seconds().max(0) as u64;
            if age < self.cache_cfg.users_ttl_secs {
                Some(payload)
            } else {
                None
            }
        } else {
            None
        };

        let payload = match payload {
            Some(p) => {
                zulip_mcp_config::Metrics::global().record_cache_hit();
                p
            }
            None => {
                zulip_mcp_config::Metrics::global().record_cache_miss();
                let value = self.call(ToolFamily::Read, Some(kind), Method::GET, "/users", None, None).await?;
                let members = value.get("members").cloned().unwrap_or(Value::Array(vec![]));
                let payload = serde_json::to_string(&members).map_err(|e| RestError::Decode(e.to_string()))?;
                if let Err(err) = self.store.put_cached(CacheScope::Users, &cache_key, &payload) {
                    warn!(%err, "failed to populate user cache");
                }
                payload
            }
        };

        let members: Vec<Value> = serde_json::from_str(&payload).map_err(|e| RestError::Decode(e.to_string()))?;
        Ok(members
            .into_iter()
            .filter_map(|m| {
                Some(ZulipUser {
                    email: m.get("email")?.as_str()?.to_string(),
                    full_name: m.get("full_name")?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    /// User Resolver entry point (spec §4.10), backed by [`Self::cached_users`].
    pub async fn resolve_user(&self, identifier: &str, kind: IdentityKind) -> Result<ResolvedUser> {
        let users = self.cached_users(kind).await?;
        resolver::resolve(identifier, &users)
    }

    // ── Messaging search with memoization ─────────────────────────────────

    /// Fetch messages under `narrow`, memoizing identical queries for
    /// [`MESSAGE_MEMO_TTL`] (spec §4.3 "Message reads: no cache by default;
    /// optional short-lived memoization of identical queries").
    pub async fn search_messages(
        &self,
        kind: Option<IdentityKind>,
        narrow: &[NarrowTerm],
        anchor: &str,
        num_before: u32,
        num_after: u32,
    ) -> Result<Value> {
        let memo_key = format!("{kind:?}|{narrow:?}|{anchor}|{num_before}|{num_after}");
        if let Some((inserted_at, value)) = self.message_memo.lock().expect("memo mutex poisoned").get(&memo_key) {
            if inserted_at.elapsed() < MESSAGE_MEMO_TTL {
                debug!(anchor, "serving search_messages from in-process memo");
                return Ok(value.clone());
            }
        }

        let narrow_json = serde_json::to_value(narrow).unwrap_or(Value::Array(vec![]));
        let query = serde_json::json!({
            "narrow": narrow_json,
            "anchor": anchor,
            "num_before": num_before,
            "num_after": num_after,
        });
        let value = self.call(ToolFamily::Search, kind, Method::GET, "/messages", Some(&query), None).await?;

        self.message_memo
            .lock()
            .expect("memo mutex poisoned")
            .insert(memo_key, (Instant::now(), value.clone()));
        Ok(value)
    }

    // ── File uploads (spec §4.5 "Files") ───────────────────────────────────

    /// Multipart upload to `POST /user_uploads`. Rate limiting, identity
    /// selection, and auth follow the same path as [`Self::call`]; retries
    /// on transient failure are skipped for uploads (resending a large
    /// payload on every 5xx is wasteful — callers surface the failure and
    /// let the agent decide whether to retry).
    pub async fn upload_file(
        &self,
        preferred_kind: Option<IdentityKind>,
        filename: String,
        bytes: Vec<u8>,
    ) -> Result<Value> {
        let (kind, creds) = self.identities.select(ToolFamily::Upload, preferred_kind)?;
        self.limiter_for(kind).acquire().await;

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new().part("file", part);
        let url = format!("{}/api/v1/user_uploads", creds.site.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .basic_auth(&creds.email, Some(&creds.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(RestError::Transport)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Auth { status: status.as_u16(), message: body });
        }
        if status.is_server_error() {
            return Err(RestError::Transient { attempts: 1, message: status.to_string() });
        }
        response.json::<Value>().await.map_err(|e| RestError::Decode(e.to_string()))
    }
}

fn value_to_pairs(value: &Value) -> Vec<(String, String)> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), scalar_to_string(v)))
            .collect(),
        _ => Vec::new(),
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response.headers().get("retry-after")?.to_str().ok()?.parse().ok()
}

/// Exponential backoff from a 500 ms base, doubling per attempt, capped at
/// [`MAX_BACKOFF`], plus up to 250 ms of jitter (spec §4.3 step 5).
fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_millis(500).saturating_mul(1u32 << attempt.min(6));
    let capped = base.min(MAX_BACKOFF);
    let jitter_ms = rand::thread_rng().gen_range(0..250);
    capped + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_to_pairs_drops_nulls_and_stringifies_scalars() {
        let v = serde_json::json!({ "a": 1, "b": "x", "c": null, "d": true });
        let pairs = value_to_pairs(&v);
        assert_eq!(pairs.len(), 3);
        assert!(pairs.contains(&("a".to_string(), "1".to_string())));
        assert!(pairs.contains(&("d".to_string(), "true".to_string())));
    }

    #[test]
    fn value_to_pairs_json_encodes_nested_values() {
        let v = serde_json::json!({ "narrow": [{"operator": "stream", "operand": "general"}] });
        let pairs = value_to_pairs(&v);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].1.contains("stream"));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let d1 = backoff_delay(1);
        let d4 = backoff_delay(4);
        let d10 = backoff_delay(10);
        assert!(d1 < d4);
        assert!(d10 <= MAX_BACKOFF + Duration::from_millis(250));
    }
}
