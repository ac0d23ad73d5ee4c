// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Validator (spec §4.4): input coercion and narrowing shared by every tool
//! family before a call reaches REST or the store.

use serde_json::Value;

use crate::error::ToolError;

/// Drop any parameter whose value is the explicit JSON null, so an omitted
/// optional argument and an explicitly-nulled one behave identically (spec
/// §4.4 "Null dropping").
pub fn drop_nulls(args: &Value) -> Value {
    match args {
        Value::Object(map) => Value::Object(map.iter().filter(|(_, v)| !v.is_null()).map(|(k, v)| (k.clone(), v.clone())).collect()),
        other => other.clone(),
    }
}

/// Accept an int or a numeric string for `param`; reject anything else with
/// a structured error naming the parameter and a literal example (spec
/// §4.4 "Integer coercion").
pub fn coerce_int(args: &Value, param: &str) -> Result<Option<i64>, ToolError> {
    match args.get(param) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| ToolError::validation(param, "must be an integer", 42)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ToolError::validation(param, "must be an integer or numeric string", 42)),
        Some(_) => Err(ToolError::validation(param, "must be an integer or numeric string", 42)),
    }
}

/// Require `param`, applying the same coercion as [`coerce_int`].
pub fn require_int(args: &Value, param: &str) -> Result<i64, ToolError> {
    coerce_int(args, param)?.ok_or_else(|| ToolError::validation(param, "is required", 42))
}

/// Check string membership against `allowed`, emitting the full allowed set
/// on mismatch (spec §4.4 "Enum narrowing").
pub fn narrow_enum<'a>(args: &'a Value, param: &str, allowed: &[&str]) -> Result<&'a str, ToolError> {
    let value = args
        .get(param)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::validation(param, "is required", allowed.first().unwrap_or(&"")))?;
    if allowed.contains(&value) {
        Ok(value)
    } else {
        Err(ToolError::new(
            "validation_error",
            format!("{param}: '{value}' is not one of {allowed:?}"),
        ))
    }
}

/// Like [`narrow_enum`] but optional — returns `Ok(None)` when the
/// parameter is absent.
pub fn narrow_enum_opt<'a>(args: &'a Value, param: &str, allowed: &[&str]) -> Result<Option<&'a str>, ToolError> {
    match args.get(param).and_then(Value::as_str) {
        None => Ok(None),
        Some(value) if allowed.contains(&value) => Ok(Some(value)),
        Some(value) => Err(ToolError::new(
            "validation_error",
            format!("{param}: '{value}' is not one of {allowed:?}"),
        )),
    }
}

pub fn require_str<'a>(args: &'a Value, param: &str) -> Result<&'a str, ToolError> {
    args.get(param)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::new("validation_error", format!("{param} is required")))
}

pub fn optional_str<'a>(args: &'a Value, param: &str) -> Option<&'a str> {
    args.get(param).and_then(Value::as_str)
}

/// Validate an emoji against an approved registry (spec §4.5 react/unreact:
/// "emoji restricted to an approved registry"). A conservative, deterministic
/// allow-list of common Zulip reaction emoji.
pub const APPROVED_EMOJI: &[&str] = &[
    "+1", "-1", "tada", "heart", "smile", "laughing", "thinking_face", "eyes", "fire", "rocket",
    "white_check_mark", "x", "warning", "clap", "raised_hands", "100",
];

pub fn validate_emoji<'a>(args: &'a Value, param: &str) -> Result<&'a str, ToolError> {
    narrow_enum(args, param, APPROVED_EMOJI)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drop_nulls_removes_explicit_nulls_only() {
        let args = json!({"a": 1, "b": null, "c": "x"});
        let cleaned = drop_nulls(&args);
        assert!(cleaned.get("a").is_some());
        assert!(cleaned.get("b").is_none());
        assert!(cleaned.get("c").is_some());
    }

    #[test]
    fn coerce_int_accepts_numeric_string() {
        let args = json!({"n": "42"});
        assert_eq!(coerce_int(&args, "n").unwrap(), Some(42));
    }

    #[test]
    fn coerce_int_rejects_non_numeric_string() {
        let args = json!({"n": "abc"});
        let err = coerce_int(&args, "n").unwrap_err();
        assert_eq!(err.code, "validation_error");
        assert!(err.message.contains('n'));
    }

    #[test]
    fn coerce_int_missing_is_none_not_error() {
        let args = json!({});
        assert_eq!(coerce_int(&args, "n").unwrap(), None);
    }

    #[test]
    fn narrow_enum_lists_allowed_values_on_mismatch() {
        let args = json!({"anchor": "nope"});
        let err = narrow_enum(&args, "anchor", &["newest", "oldest", "first_unread"]).unwrap_err();
        assert!(err.message.contains("newest"));
    }

    #[test]
    fn validate_emoji_rejects_unapproved() {
        let args = json!({"emoji": "skull_and_crossbones"});
        assert!(validate_emoji(&args, "emoji").is_err());
    }

    #[test]
    fn validate_emoji_accepts_approved() {
        let args = json!({"emoji": "tada"});
        assert_eq!(validate_emoji(&args, "emoji").unwrap(), "tada");
    }
}
