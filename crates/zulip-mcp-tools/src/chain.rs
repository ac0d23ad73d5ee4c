// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Chain Executor (C8, spec §4.8): runs an ordered list of steps against a
//! shared context map, halting on the first error. Each step is one of
//! `send_message`, `search_messages`, `wait_for_response`, or
//! `conditional_action` — the last evaluates a small sandboxed expression
//! grammar (identifiers, member access, comparisons, booleans, literals)
//! over the accumulated context. There is no arbitrary code evaluation.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::families::{agents, messaging};
use crate::registry::{Tool, ToolCall, ToolOutput};

#[derive(Debug, Clone)]
pub struct ChainStep {
    pub step_type: String,
    pub params: Value,
}

impl ChainStep {
    fn from_value(value: &Value) -> crate::error::Result<Self> {
        let step_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::validation("type", "is required on every chain step", "\"send_message\""))?
            .to_string();
        let params = value.get("params").cloned().unwrap_or(json!({}));
        Ok(Self { step_type, params })
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub steps_completed: usize,
    pub total_steps: usize,
    pub halted: bool,
    pub last_error: Option<Value>,
    pub context: Map<String, Value>,
}

impl ExecutionSummary {
    fn to_value(&self) -> Value {
        json!({
            "steps_completed": self.steps_completed,
            "total_steps": self.total_steps,
            "halted": self.halted,
            "last_error": self.last_error,
            "context": self.context,
        })
    }
}

/// Run `steps` in order against a fresh context, stopping at the first
/// step that errors (spec §4.8 "halt-on-error with an execution summary").
pub async fn run(ctx: &ToolContext, steps: &[ChainStep]) -> ExecutionSummary {
    let mut context = Map::new();
    let mut completed = 0usize;
    let mut last_error = None;

    for step in steps {
        match run_step(ctx, step, &context).await {
            Ok(result) => {
                context.insert(context_key(&step.step_type).to_string(), result);
                completed += 1;
            }
            Err(err) => {
                last_error = Some(err.into_response());
                break;
            }
        }
    }

    let halted = last_error.is_some();
    ExecutionSummary { steps_completed: completed, total_steps: steps.len(), halted, last_error, context }
}

/// Context-map key a step's result is stored under, per spec §4.8
/// ("search populates `search_results`; wait populates `response`"). Steps
/// the spec doesn't name a key for fall back to their own step type.
fn context_key(step_type: &str) -> &str {
    match step_type {
        "search_messages" => "search_results",
        "wait_for_response" => "response",
        other => other,
    }
}

async fn run_step(ctx: &ToolContext, step: &ChainStep, context: &Map<String, Value>) -> crate::error::Result<Value> {
    match step.step_type.as_str() {
        "send_message" => messaging::send(ctx, &step.params).await,
        "search_messages" => messaging::search(ctx, &step.params).await,
        "wait_for_response" => agents::wait_for_response(ctx, &step.params).await,
        "conditional_action" => run_conditional(ctx, step, context).await,
        other => Err(ToolError::new("validation_error", format!("unknown chain step type '{other}'"))),
    }
}

async fn run_conditional(ctx: &ToolContext, step: &ChainStep, context: &Map<String, Value>) -> crate::error::Result<Value> {
    let expr = step
        .params
        .get("condition")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::validation("condition", "is required on conditional_action", "\"response.status == \\\"answered\\\"\""))?;
    let outcome = eval(expr, context)?;

    let branch_key = if outcome { "if_true" } else { "if_false" };
    match step.params.get(branch_key) {
        Some(branch_value) => {
            let branch = ChainStep::from_value(branch_value)?;
            let result = Box::pin(run_step(ctx, &branch, context)).await?;
            Ok(json!({ "condition": outcome, "branch": branch_key, "result": result }))
        }
        None => Ok(json!({ "condition": outcome, "branch": branch_key, "result": Value::Null })),
    }
}

// ── sandboxed expression grammar ───────────────────────────────────────
//
// expr       := or_expr
// or_expr    := and_expr ( "||" and_expr )*
// and_expr   := unary ( "&&" unary )*
// unary      := "!" unary | comparison
// comparison := operand ( ("==" | "!=" | "<" | "<=" | ">" | ">=") operand )?
// operand    := path | literal
// path       := identifier ( "." identifier )*
// literal    := number | "true" | "false" | "null" | string

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Ident(&'a str),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    Op(&'static str),
    LParen,
    RParen,
    Bang,
}

fn tokenize(input: &str) -> crate::error::Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == '!' && bytes.get(i + 1) == Some(&b'=') {
            tokens.push(Token::Op("!="));
            i += 2;
        } else if c == '!' {
            tokens.push(Token::Bang);
            i += 1;
        } else if c == '=' && bytes.get(i + 1) == Some(&b'=') {
            tokens.push(Token::Op("=="));
            i += 2;
        } else if c == '&' && bytes.get(i + 1) == Some(&b'&') {
            tokens.push(Token::Op("&&"));
            i += 2;
        } else if c == '|' && bytes.get(i + 1) == Some(&b'|') {
            tokens.push(Token::Op("||"));
            i += 2;
        } else if c == '<' && bytes.get(i + 1) == Some(&b'=') {
            tokens.push(Token::Op("<="));
            i += 2;
        } else if c == '>' && bytes.get(i + 1) == Some(&b'=') {
            tokens.push(Token::Op(">="));
            i += 2;
        } else if c == '<' {
            tokens.push(Token::Op("<"));
            i += 1;
        } else if c == '>' {
            tokens.push(Token::Op(">"));
            i += 1;
        } else if c == '"' || c == '\'' {
            let quote = c;
            let start = i + 1;
            let mut j = start;
            while j < bytes.len() && bytes[j] as char != quote {
                j += 1;
            }
            if j >= bytes.len() {
                return Err(ToolError::new("validation_error", "unterminated string literal in condition"));
            }
            tokens.push(Token::Str(input[start..j].to_string()));
            i = j + 1;
        } else if c.is_ascii_digit() || (c == '-' && bytes.get(i + 1).map(|b| (*b as char).is_ascii_digit()).unwrap_or(false)) {
            let start = i;
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j] as char).is_ascii_digit() || bytes.get(j) == Some(&b'.') {
                j += 1;
            }
            let text = &input[start..j];
            let num = text.parse::<f64>().map_err(|_| ToolError::new("validation_error", format!("invalid number literal '{text}' in condition")))?;
            tokens.push(Token::Number(num));
            i = j;
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            let mut j = i;
            while j < bytes.len() && ((bytes[j] as char).is_alphanumeric() || bytes[j] == b'_' || bytes[j] == b'.') {
                j += 1;
            }
            let word = &input[start..j];
            tokens.push(match word {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                _ => Token::Ident(word),
            });
            i = j;
        } else {
            return Err(ToolError::new("validation_error", format!("unexpected character '{c}' in condition")));
        }
    }
    Ok(tokens)
}

enum Val {
    Bool(bool),
    Json(Value),
}

impl Val {
    fn truthy(&self) -> bool {
        match self {
            Val::Bool(b) => *b,
            Val::Json(Value::Bool(b)) => *b,
            Val::Json(Value::Null) => false,
            Val::Json(other) => !other.is_null() && other != &Value::from(0),
        }
    }
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token<'a>>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_expr(&mut self, context: &Map<String, Value>) -> crate::error::Result<Val> {
        self.parse_or(context)
    }

    fn parse_or(&mut self, context: &Map<String, Value>) -> crate::error::Result<Val> {
        let mut left = self.parse_and(context)?;
        while matches!(self.peek(), Some(Token::Op("||"))) {
            self.next();
            let right = self.parse_and(context)?;
            left = Val::Bool(left.truthy() || right.truthy());
        }
        Ok(left)
    }

    fn parse_and(&mut self, context: &Map<String, Value>) -> crate::error::Result<Val> {
        let mut left = self.parse_unary(context)?;
        while matches!(self.peek(), Some(Token::Op("&&"))) {
            self.next();
            let right = self.parse_unary(context)?;
            left = Val::Bool(left.truthy() && right.truthy());
        }
        Ok(left)
    }

    fn parse_unary(&mut self, context: &Map<String, Value>) -> crate::error::Result<Val> {
        if matches!(self.peek(), Some(Token::Bang)) {
            self.next();
            let inner = self.parse_unary(context)?;
            return Ok(Val::Bool(!inner.truthy()));
        }
        self.parse_comparison(context)
    }

    fn parse_comparison(&mut self, context: &Map<String, Value>) -> crate::error::Result<Val> {
        let left = self.parse_operand(context)?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            if matches!(op, "==" | "!=" | "<" | "<=" | ">" | ">=") {
                self.next();
                let right = self.parse_operand(context)?;
                return Ok(Val::Bool(compare(&left, op, &right)));
            }
        }
        Ok(left)
    }

    fn parse_operand(&mut self, context: &Map<String, Value>) -> crate::error::Result<Val> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.next();
            let inner = self.parse_expr(context)?;
            if !matches!(self.next(), Some(Token::RParen)) {
                return Err(ToolError::new("validation_error", "unbalanced parentheses in condition"));
            }
            return Ok(inner);
        }
        match self.next() {
            Some(Token::True) => Ok(Val::Bool(true)),
            Some(Token::False) => Ok(Val::Bool(false)),
            Some(Token::Null) => Ok(Val::Json(Value::Null)),
            Some(Token::Number(n)) => Ok(Val::Json(json!(n))),
            Some(Token::Str(s)) => Ok(Val::Json(Value::String(s))),
            Some(Token::Ident(path)) => Ok(Val::Json(resolve_path(context, path))),
            other => Err(ToolError::new("validation_error", format!("unexpected token in condition: {other:?}"))),
        }
    }
}

fn resolve_path(context: &Map<String, Value>, path: &str) -> Value {
    let mut parts = path.split('.');
    let Some(head) = parts.next() else {
        return Value::Null;
    };
    let mut current = context.get(head).cloned().unwrap_or(Value::Null);
    for part in parts {
        current = current.get(part).cloned().unwrap_or(Value::Null);
    }
    current
}

fn as_f64(val: &Val) -> Option<f64> {
    match val {
        Val::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Val::Json(Value::Number(n)) => n.as_f64(),
        Val::Json(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_string(val: &Val) -> Option<String> {
    match val {
        Val::Json(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn compare(left: &Val, op: &str, right: &Val) -> bool {
    if let (Some(l), Some(r)) = (as_f64(left), as_f64(right)) {
        return match op {
            "==" => l == r,
            "!=" => l != r,
            "<" => l < r,
            "<=" => l <= r,
            ">" => l > r,
            ">=" => l >= r,
            _ => false,
        };
    }
    if let (Some(l), Some(r)) = (as_string(left), as_string(right)) {
        return match op {
            "==" => l == r,
            "!=" => l != r,
            "<" => l < r,
            "<=" => l <= r,
            ">" => l > r,
            ">=" => l >= r,
            _ => false,
        };
    }
    match op {
        "==" => left.truthy() == right.truthy(),
        "!=" => left.truthy() != right.truthy(),
        _ => false,
    }
}

/// Evaluate a sandboxed boolean expression over `context`. Supports
/// identifiers with dotted member access, string/number/bool/null
/// literals, comparison operators, and `&&`/`||`/`!` — nothing else.
/// There is no function call, assignment, or arbitrary-code path.
fn eval(expr: &str, context: &Map<String, Value>) -> crate::error::Result<bool> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser::new(tokens);
    let result = parser.parse_expr(context)?;
    if parser.pos != parser.tokens.len() {
        return Err(ToolError::new("validation_error", format!("trailing tokens after parsing condition '{expr}'")));
    }
    Ok(result.truthy())
}

pub struct ChainExecuteTool;

#[async_trait]
impl Tool for ChainExecuteTool {
    fn name(&self) -> &str {
        "chain.execute"
    }
    fn description(&self) -> &str {
        "Run an ordered list of steps (send_message, search_messages, wait_for_response, conditional_action) against a shared context, halting on the first error."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "type": {"type": "string", "enum": ["send_message", "search_messages", "wait_for_response", "conditional_action"]},
                            "params": {"type": "object"}
                        },
                        "required": ["type"]
                    }
                }
            },
            "required": ["steps"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let raw_steps = match call.args.get("steps").and_then(Value::as_array) {
            Some(items) if !items.is_empty() => items.clone(),
            _ => return ToolOutput::err(&call.id, ToolError::validation("steps", "is required and must be a non-empty list", "[{\"type\": \"send_message\", \"params\": {}}]")),
        };

        let mut steps = Vec::with_capacity(raw_steps.len());
        for raw in &raw_steps {
            match ChainStep::from_value(raw) {
                Ok(step) => steps.push(step),
                Err(err) => return ToolOutput::err(&call.id, err),
            }
        }

        let summary = run(ctx, &steps).await;
        if summary.halted {
            ToolOutput::partial(&call.id, summary.to_value(), "chain halted before completing every step")
        } else {
            ToolOutput::ok(&call.id, summary.to_value())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_map(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn eval_handles_comparison_and_path_access() {
        let context = ctx_map(&[("response", json!({"status": "answered"}))]);
        assert!(eval("response.status == \"answered\"", &context).unwrap());
        assert!(!eval("response.status == \"pending\"", &context).unwrap());
    }

    #[test]
    fn eval_handles_boolean_combinators() {
        let context = ctx_map(&[("a", json!(true)), ("b", json!(false))]);
        assert!(eval("a && !b", &context).unwrap());
        assert!(eval("a || b", &context).unwrap());
        assert!(!eval("!a", &context).unwrap());
    }

    #[test]
    fn eval_handles_numeric_comparison() {
        let context = ctx_map(&[("search_results", json!({"count": 5}))]);
        assert!(eval("search_results.count >= 3", &context).unwrap());
        assert!(!eval("search_results.count > 10", &context).unwrap());
    }

    #[test]
    fn eval_rejects_garbage_expressions() {
        let context = Map::new();
        assert!(eval("a b c", &context).is_err());
    }

    #[tokio::test]
    async fn run_halts_on_first_error() {
        use zulip_mcp_config::{CacheConfig, Credentials, RestConfig};
        use zulip_mcp_rest::{IdentityRegistry, RestClient};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(zulip_mcp_store::Store::init(dir.path().join("s.db")).unwrap());
        let identities = Arc::new(IdentityRegistry::new(Credentials::default()));
        let rest = Arc::new(RestClient::new(identities, store.clone(), RestConfig::default(), CacheConfig::default()).unwrap());
        let ctx = ToolContext::new(rest, store, Default::default());

        // "send_message" with no content fails validation before any network call.
        let steps = vec![ChainStep { step_type: "send_message".to_string(), params: json!({}) }];
        let summary = run(&ctx, &steps).await;
        assert!(summary.halted);
        assert_eq!(summary.steps_completed, 0);
    }

    #[tokio::test]
    async fn wait_for_response_populates_response_key_for_conditional_action() {
        use zulip_mcp_config::{AgentsConfig, CacheConfig, Credentials, RestConfig};
        use zulip_mcp_rest::{IdentityRegistry, RestClient};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(zulip_mcp_store::Store::init(dir.path().join("s.db")).unwrap());
        let identities = Arc::new(IdentityRegistry::new(Credentials::default()));
        let rest = Arc::new(RestClient::new(identities, store.clone(), RestConfig::default(), CacheConfig::default()).unwrap());
        let agents_cfg = AgentsConfig { wait_poll_interval_secs: 1, default_wait_timeout_secs: 1, ..Default::default() };
        let ctx = ToolContext::new(rest, store.clone(), agents_cfg);

        let request_id = store.create_request("agent-1", "pick one?", None, &[]).unwrap();
        let steps = vec![
            ChainStep { step_type: "wait_for_response".to_string(), params: json!({"request_id": request_id, "timeout_secs": 1}) },
            ChainStep {
                step_type: "conditional_action".to_string(),
                params: json!({
                    "condition": "response.status == \"timeout\"",
                    // reuse wait_for_response (now on an already-terminal
                    // row) as the true branch so it resolves without a
                    // network call.
                    "if_true": {"type": "wait_for_response", "params": {"request_id": request_id, "timeout_secs": 1}},
                }),
            },
        ];
        let summary = run(&ctx, &steps).await;

        assert_eq!(summary.context["response"]["status"], "timeout");
        // the conditional branch actually observed a non-null `response`
        // context entry (the bug this guards against: an always-false
        // predicate because `response` resolved to `Null`).
        assert!(summary.context.contains_key("conditional_action"));
    }
}
