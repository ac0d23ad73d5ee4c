// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Correlate an inbound Zulip message to a pending input request (spec
//! §4.6): (a) an explicit request id in the message body, (b) the topic
//! scheme `request-<id>` that `request_user_input` uses, or (c) a
//! recency-bounded fallback to the most recent pending request for the
//! same agent channel (spec §9 open question 2 — configurable, logs at
//! warn when it fires since it is the least precise rule).

use chrono::{DateTime, Utc};
use zulip_mcp_store::InputRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationRule {
    ExplicitId,
    Topic,
    RecencyFallback,
}

pub struct InboundMessage<'a> {
    pub body: &'a str,
    pub topic: &'a str,
    pub stream_name: Option<&'a str>,
    pub sent_at: DateTime<Utc>,
}

/// `stream_name` for an agent's dedicated channel, matching
/// `families::agents::dedicated_stream`.
fn dedicated_stream(agent_id: &str) -> String {
    format!("agent-{agent_id}")
}

pub fn correlate(
    message: &InboundMessage<'_>,
    pending: &[InputRequest],
    fallback_enabled: bool,
    recency_secs: i64,
) -> Option<(String, CorrelationRule)> {
    // Rule (a): explicit request id anywhere in the body. Exact substring
    // match on the short-form UUID is specific enough to rule out
    // collisions in practice.
    if let Some(found) = pending.iter().find(|r| message.body.contains(&r.request_id)) {
        return Some((found.request_id.clone(), CorrelationRule::ExplicitId));
    }

    // Rule (b): the topic scheme `request_user_input` embeds the id in.
    if let Some(id) = message.topic.strip_prefix("request-") {
        if let Some(found) = pending.iter().find(|r| r.request_id == id) {
            return Some((found.request_id.clone(), CorrelationRule::Topic));
        }
    }

    // Rule (c): most recent pending request whose agent owns the inbound
    // stream, within the configured recency window.
    if !fallback_enabled {
        return None;
    }
    let stream_name = message.stream_name?;
    let mut candidates: Vec<&InputRequest> = pending
        .iter()
        .filter(|r| dedicated_stream(&r.agent_id) == stream_name)
        .filter(|r| (message.sent_at - r.created_at).num_seconds().abs() <= recency_secs)
        .collect();
    candidates.sort_by_key(|r| std::cmp::Reverse(r.created_at));
    candidates.first().map(|r| (r.request_id.clone(), CorrelationRule::RecencyFallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zulip_mcp_store::RequestStatus;

    fn request(id: &str, agent_id: &str, created_at: DateTime<Utc>) -> InputRequest {
        InputRequest {
            request_id: id.to_string(),
            agent_id: agent_id.to_string(),
            question: "q".to_string(),
            context: None,
            options: vec![],
            status: RequestStatus::Pending,
            created_at,
            responded_at: None,
            response: None,
        }
    }

    #[test]
    fn explicit_id_in_body_wins_over_everything_else() {
        let now = Utc::now();
        let pending = vec![request("abcd1234", "agent-1", now)];
        let msg = InboundMessage { body: "the answer is: abcd1234", topic: "unrelated", stream_name: Some("agent-agent-1"), sent_at: now };
        let (id, rule) = correlate(&msg, &pending, true, 900).unwrap();
        assert_eq!(id, "abcd1234");
        assert_eq!(rule, CorrelationRule::ExplicitId);
    }

    #[test]
    fn topic_scheme_matches_when_no_explicit_id_present() {
        let now = Utc::now();
        let pending = vec![request("beef0001", "agent-1", now)];
        let msg = InboundMessage { body: "yes", topic: "request-beef0001", stream_name: Some("agent-agent-1"), sent_at: now };
        let (id, rule) = correlate(&msg, &pending, true, 900).unwrap();
        assert_eq!(id, "beef0001");
        assert_eq!(rule, CorrelationRule::Topic);
    }

    #[test]
    fn recency_fallback_picks_most_recent_pending_for_the_stream() {
        let now = Utc::now();
        let older = request("aaaa0001", "agent-1", now - chrono::Duration::seconds(200));
        let newer = request("aaaa0002", "agent-1", now - chrono::Duration::seconds(10));
        let pending = vec![older, newer];
        let msg = InboundMessage { body: "sure thing", topic: "general", stream_name: Some("agent-agent-1"), sent_at: now };
        let (id, rule) = correlate(&msg, &pending, true, 900).unwrap();
        assert_eq!(id, "aaaa0002");
        assert_eq!(rule, CorrelationRule::RecencyFallback);
    }

    #[test]
    fn recency_fallback_disabled_returns_none_when_no_stronger_rule_matches() {
        let now = Utc::now();
        let pending = vec![request("aaaa0001", "agent-1", now)];
        let msg = InboundMessage { body: "sure thing", topic: "general", stream_name: Some("agent-agent-1"), sent_at: now };
        assert!(correlate(&msg, &pending, false, 900).is_none());
    }

    #[test]
    fn fallback_respects_recency_window() {
        let now = Utc::now();
        let stale = request("aaaa0001", "agent-1", now - chrono::Duration::seconds(2000));
        let pending = vec![stale];
        let msg = InboundMessage { body: "sure thing", topic: "general", stream_name: Some("agent-agent-1"), sent_at: now };
        assert!(correlate(&msg, &pending, true, 900).is_none());
    }

    #[test]
    fn fallback_ignores_other_agents_channels() {
        let now = Utc::now();
        let pending = vec![request("aaaa0001", "agent-2", now)];
        let msg = InboundMessage { body: "sure thing", topic: "general", stream_name: Some("agent-agent-1"), sent_at: now };
        assert!(correlate(&msg, &pending, true, 900).is_none());
    }
}
