// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Search & analytics family (spec §4.5): advanced_search, analytics,
//! daily_summary. Sentiment is a small fixed deterministic lexicon (spec
//! §9 open question 3 / SPEC_FULL.md §4 decision 3) — no third-party model.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use zulip_mcp_config::IdentityKind;
use zulip_mcp_rest::{NarrowBuilder, TimeBound};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCall, ToolOutput};
use crate::validator::{coerce_int, narrow_enum_opt, optional_str};

fn preferred_kind(args: &Value) -> Option<IdentityKind> {
    match args.get("preferred_kind").and_then(Value::as_str) {
        Some("user") => Some(IdentityKind::User),
        Some("bot") => Some(IdentityKind::Bot),
        Some("admin") => Some(IdentityKind::Admin),
        _ => None,
    }
}

/// Deterministic, hand-written sentiment lexicon: word → weight in
/// [-1.0, 1.0]. Chosen over importing a third-party analyzer per spec §9's
/// explicit caution against unpinned behavior-dependent sentiment models.
const POSITIVE_WORDS: &[&str] = &["great", "good", "awesome", "thanks", "excellent", "love", "nice", "helpful", "fixed", "works"];
const NEGATIVE_WORDS: &[&str] = &["bad", "broken", "issue", "bug", "fail", "failed", "problem", "annoying", "worse", "crash"];

fn sentiment_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let mut score = 0i32;
    let mut hits = 0i32;
    for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        if POSITIVE_WORDS.contains(&word) {
            score += 1;
            hits += 1;
        } else if NEGATIVE_WORDS.contains(&word) {
            score -= 1;
            hits += 1;
        }
    }
    if hits == 0 {
        0.0
    } else {
        score as f64 / hits as f64
    }
}

pub struct AdvancedSearchTool;

#[async_trait]
impl Tool for AdvancedSearchTool {
    fn name(&self) -> &str {
        "search.advanced"
    }
    fn description(&self) -> &str {
        "Fuse search across messages/users/streams/topics with optional aggregation; ranking is relevance, newest, or oldest."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "scope": {"type": "array", "items": {"type": "string", "enum": ["messages", "users", "streams", "topics"]}},
                "rank_by": {"type": "string", "enum": ["relevance", "newest", "oldest"]},
                "since_seconds_ago": {"type": "integer"},
                "aggregate_by": {"type": "string", "enum": ["sender", "topic", "day"]},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match advanced_search(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn advanced_search(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let query = optional_str(args, "query").ok_or_else(|| ToolError::validation("query", "is required", "\"deploy failure\""))?;
    let rank_by = narrow_enum_opt(args, "rank_by", &["relevance", "newest", "oldest"])?.unwrap_or("relevance");
    let kind = preferred_kind(args);
    let scope: Vec<String> = args
        .get("scope")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_else(|| vec!["messages".to_string()]);

    let mut builder = NarrowBuilder::new();
    if let Some(secs) = coerce_int(args, "since_seconds_ago")? {
        builder = builder.time_window(Some(TimeBound::RelativeSecondsAgo(secs)), None, Utc::now());
    }
    let mut narrow = builder.build();
    narrow.push(zulip_mcp_rest::NarrowTerm::new("search", query));

    let mut result = json!({ "query": query, "rank_by": rank_by });

    if scope.iter().any(|s| s == "messages") {
        let response = ctx.rest.search_messages(kind, &narrow, "newest", 100, 0).await?;
        let mut messages: Vec<Value> = response.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
        rank_messages(&mut messages, rank_by, query);
        if let Some(agg) = optional_str(args, "aggregate_by") {
            result["aggregations"] = aggregate_messages(&messages, agg);
        }
        result["messages"] = Value::Array(messages);
    }
    if scope.iter().any(|s| s == "users") {
        let users = ctx.rest.cached_users(kind.unwrap_or(IdentityKind::User)).await?;
        let needle = query.to_lowercase();
        let matched: Vec<Value> = users
            .into_iter()
            .filter(|u| u.full_name.to_lowercase().contains(&needle) || u.email.to_lowercase().contains(&needle))
            .map(|u| json!({ "email": u.email, "full_name": u.full_name }))
            .collect();
        result["users"] = Value::Array(matched);
    }
    if scope.iter().any(|s| s == "streams" || s == "topics") {
        let streams = ctx.rest.cached_streams(kind.unwrap_or(IdentityKind::User), false).await?;
        let needle = query.to_lowercase();
        let matched: Vec<Value> = streams
            .get("streams")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|s| s.get("name").and_then(Value::as_str).map(|n| n.to_lowercase().contains(&needle)).unwrap_or(false))
            .cloned()
            .collect();
        result["streams"] = Value::Array(matched);
    }
    Ok(result)
}

/// Pure, network-free ranking so it can be unit tested directly (spec
/// §1.5). `relevance` combines a crude text-match score with recency.
fn rank_messages(messages: &mut [Value], rank_by: &str, query: &str) {
    let needle = query.to_lowercase();
    match rank_by {
        "oldest" => messages.sort_by_key(|m| m.get("timestamp").and_then(Value::as_i64).unwrap_or(0)),
        "newest" => messages.sort_by_key(|m| std::cmp::Reverse(m.get("timestamp").and_then(Value::as_i64).unwrap_or(0))),
        _ => {
            messages.sort_by(|a, b| relevance_score(b, &needle).partial_cmp(&relevance_score(a, &needle)).unwrap_or(std::cmp::Ordering::Equal));
        }
    }
}

fn relevance_score(message: &Value, needle: &str) -> f64 {
    let content = message.get("content").and_then(Value::as_str).unwrap_or("").to_lowercase();
    let match_score = content.matches(needle).count() as f64;
    let timestamp = message.get("timestamp").and_then(Value::as_i64).unwrap_or(0) as f64;
    match_score * 10.0 + (timestamp / 1e9)
}

fn aggregate_messages(messages: &[Value], by: &str) -> Value {
    let mut buckets: HashMap<String, u64> = HashMap::new();
    for m in messages {
        let key = match by {
            "sender" => m.get("sender_email").and_then(Value::as_str).unwrap_or("unknown").to_string(),
            "topic" => m.get("subject").and_then(Value::as_str).unwrap_or("unknown").to_string(),
            "day" => m
                .get("timestamp")
                .and_then(Value::as_i64)
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            _ => "unknown".to_string(),
        };
        *buckets.entry(key).or_insert(0) += 1;
    }
    json!(buckets)
}

pub struct AnalyticsTool;

#[async_trait]
impl Tool for AnalyticsTool {
    fn name(&self) -> &str {
        "search.analytics"
    }
    fn description(&self) -> &str {
        "Compute one of {activity, sentiment, topics, participation} with optional group_by and output format."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "kind": {"type": "string", "enum": ["activity", "sentiment", "topics", "participation"]},
                "stream": {"type": "string"},
                "since_seconds_ago": {"type": "integer"},
                "group_by": {"type": "string", "enum": ["user", "stream", "day", "hour"]},
                "format": {"type": "string", "enum": ["summary", "detailed", "chart_data"]},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["kind"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match analytics(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn analytics(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let kind_param = narrow_enum_opt(args, "kind", &["activity", "sentiment", "topics", "participation"])?.unwrap_or("activity");
    let format = narrow_enum_opt(args, "format", &["summary", "detailed", "chart_data"])?.unwrap_or("summary");
    let group_by = narrow_enum_opt(args, "group_by", &["user", "stream", "day", "hour"])?.unwrap_or("day");
    let since = coerce_int(args, "since_seconds_ago")?.unwrap_or(86_400);
    let identity = preferred_kind(args);

    let mut builder = NarrowBuilder::new().time_window(Some(TimeBound::RelativeSecondsAgo(since)), None, Utc::now());
    if let Some(stream) = optional_str(args, "stream") {
        builder = builder.stream(stream);
    }
    let narrow = builder.build();
    let response = ctx.rest.search_messages(identity, &narrow, "oldest", 0, 5000).await?;
    let messages: Vec<Value> = response.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();

    let data = match kind_param {
        "activity" => aggregate_messages(&messages, group_by),
        "sentiment" => {
            let scores: Vec<f64> = messages.iter().filter_map(|m| m.get("content").and_then(Value::as_str)).map(sentiment_score).collect();
            let avg = if scores.is_empty() { 0.0 } else { scores.iter().sum::<f64>() / scores.len() as f64 };
            json!({ "average_sentiment": avg, "sample_size": scores.len() })
        }
        "topics" => {
            let mut counts: HashMap<String, u64> = HashMap::new();
            for m in &messages {
                let topic = m.get("subject").and_then(Value::as_str).unwrap_or("unknown").to_string();
                *counts.entry(topic).or_insert(0) += 1;
            }
            json!(counts)
        }
        "participation" => aggregate_messages(&messages, "sender"),
        _ => unreachable!("narrow_enum_opt restricts to known kinds"),
    };

    Ok(match format {
        "summary" => json!({ "kind": kind_param, "summary": data }),
        "chart_data" => json!({ "kind": kind_param, "chart_data": data }),
        _ => json!({ "kind": kind_param, "detailed": data, "sample_size": messages.len() }),
    })
}

pub struct DailySummaryTool;

#[async_trait]
impl Tool for DailySummaryTool {
    fn name(&self) -> &str {
        "search.daily_summary"
    }
    fn description(&self) -> &str {
        "Convenience analytic over the last N hours with per-stream activity."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "hours": {"type": "integer"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match daily_summary(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn daily_summary(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let hours = coerce_int(args, "hours")?.unwrap_or(24).max(1);
    let kind = preferred_kind(args);
    let narrow = NarrowBuilder::new().time_window(Some(TimeBound::RelativeSecondsAgo(hours * 3600)), None, Utc::now()).build();
    let response = ctx.rest.search_messages(kind, &narrow, "oldest", 0, 5000).await?;
    let messages: Vec<Value> = response.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
    let mut per_stream: HashMap<String, u64> = HashMap::new();
    for m in &messages {
        let stream = m.get("display_recipient").and_then(Value::as_str).unwrap_or("unknown").to_string();
        *per_stream.entry(stream).or_insert(0) += 1;
    }
    Ok(json!({ "hours": hours, "total_messages": messages.len(), "per_stream": per_stream }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_score_positive_text() {
        assert!(sentiment_score("this is great, thanks, awesome work") > 0.0);
    }

    #[test]
    fn sentiment_score_negative_text() {
        assert!(sentiment_score("this is broken and the build failed") < 0.0);
    }

    #[test]
    fn sentiment_score_neutral_when_no_lexicon_hits() {
        assert_eq!(sentiment_score("the quick brown fox jumps"), 0.0);
    }

    #[test]
    fn rank_messages_newest_first() {
        let mut messages = vec![json!({"timestamp": 100}), json!({"timestamp": 300}), json!({"timestamp": 200})];
        rank_messages(&mut messages, "newest", "");
        let timestamps: Vec<i64> = messages.iter().map(|m| m["timestamp"].as_i64().unwrap()).collect();
        assert_eq!(timestamps, vec![300, 200, 100]);
    }

    #[test]
    fn rank_messages_relevance_prefers_more_matches() {
        let mut messages = vec![
            json!({"content": "rust rust rust", "timestamp": 1}),
            json!({"content": "rust", "timestamp": 2}),
        ];
        rank_messages(&mut messages, "relevance", "rust");
        assert_eq!(messages[0]["content"], "rust rust rust");
    }
}
