// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Files family (spec §4.5 "Files"): upload, manage (list/get/delete/
//! share/download). Zulip's API has no native per-user file listing
//! beyond the realm attachments endpoint, so some `manage` sub-operations
//! report `partial_success` rather than a fabricated result.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde_json::{json, Value};
use zulip_mcp_config::{IdentityKind, ToolFamily};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCall, ToolOutput};
use crate::validator::{narrow_enum, optional_str, require_int, require_str};

/// Zulip's own default maximum upload size.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "pdf", "txt", "md", "csv", "json", "log", "zip", "tar", "gz",
];

fn preferred_kind(args: &Value) -> Option<IdentityKind> {
    match args.get("preferred_kind").and_then(Value::as_str) {
        Some("user") => Some(IdentityKind::User),
        Some("bot") => Some(IdentityKind::Bot),
        Some("admin") => Some(IdentityKind::Admin),
        _ => None,
    }
}

/// Reject path separators and control characters, and collapse the
/// filename to its basename, so an attacker-chosen name cannot escape the
/// upload into an arbitrary path (spec §4.5 upload "filename sanitized
/// against traversal").
fn sanitize_filename(name: &str) -> crate::error::Result<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return Err(ToolError::validation("filename", "is not a valid file name", "\"report.pdf\""));
    }
    Ok(cleaned)
}

fn extension_of(name: &str) -> Option<String> {
    name.rsplit('.').next().map(|ext| ext.to_lowercase())
}

pub struct UploadFileTool;

#[async_trait]
impl Tool for UploadFileTool {
    fn name(&self) -> &str {
        "files.upload"
    }
    fn description(&self) -> &str {
        "Upload a file (base64-encoded content) and optionally post a message linking to it."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filename": {"type": "string"},
                "content_base64": {"type": "string"},
                "post_to_stream": {"type": "string"},
                "post_to_topic": {"type": "string"},
                "message": {"type": "string"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["filename", "content_base64"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match upload(ctx, &call.args).await {
            Ok(value) => ToolOutput::ok(&call.id, value),
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn upload(ctx: &ToolContext, args: &Value) -> crate::error::Result<Value> {
    let raw_filename = require_str(args, "filename")?;
    let filename = sanitize_filename(raw_filename)?;

    let extension = extension_of(&filename);
    if !extension.as_deref().map(|ext| ALLOWED_EXTENSIONS.contains(&ext)).unwrap_or(false) {
        return Err(ToolError::validation(
            "filename",
            format!("extension not in the allowed list {ALLOWED_EXTENSIONS:?}"),
            "\"notes.txt\"",
        ));
    }

    let content_base64 = require_str(args, "content_base64")?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(content_base64)
        .map_err(|e| ToolError::validation("content_base64", format!("is not valid base64 ({e})"), "\"...\""))?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ToolError::new(
            "validation_error",
            format!("file is {} bytes, exceeding the {MAX_UPLOAD_BYTES}-byte limit", bytes.len()),
        ));
    }

    let kind = preferred_kind(args);
    let response = ctx.rest.upload_file(kind, filename.clone(), bytes).await?;
    let url = response.get("url").and_then(Value::as_str).unwrap_or_default().to_string();

    if let Some(stream) = optional_str(args, "post_to_stream") {
        let topic = optional_str(args, "post_to_topic").unwrap_or("files");
        let message = optional_str(args, "message").map(str::to_string).unwrap_or_else(|| format!("[{filename}]({url})"));
        let form = json!({ "type": "stream", "to": stream, "topic": topic, "content": message });
        ctx.rest.call(ToolFamily::Send, kind, Method::POST, "/messages", None, Some(&form)).await?;
    }

    Ok(json!({ "filename": filename, "url": url }))
}

pub struct ManageFilesTool;

#[async_trait]
impl Tool for ManageFilesTool {
    fn name(&self) -> &str {
        "files.manage"
    }
    fn description(&self) -> &str {
        "List, inspect, delete, share, or download uploaded attachments. share/download report partial_success where Zulip's API offers no native equivalent."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "op": {"type": "string", "enum": ["list", "get", "delete", "share", "download"]},
                "attachment_id": {"type": "integer"},
                "preferred_kind": {"type": "string", "enum": ["user", "bot", "admin"]}
            },
            "required": ["op"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match manage(ctx, &call.args).await {
            Ok(out) => out,
            Err(err) => ToolOutput::err(&call.id, err),
        }
    }
}

async fn manage(ctx: &ToolContext, args: &Value) -> crate::error::Result<ToolOutput> {
    let op = narrow_enum(args, "op", &["list", "get", "delete", "share", "download"])?;
    let kind = preferred_kind(args);

    match op {
        "list" => {
            let value = ctx.rest.call(ToolFamily::Read, kind, Method::GET, "/attachments", None, None).await?;
            Ok(ToolOutput::ok("manage", value))
        }
        "get" => {
            let attachment_id = require_int(args, "attachment_id")?;
            let all = ctx.rest.call(ToolFamily::Read, kind, Method::GET, "/attachments", None, None).await?;
            let found = all
                .get("attachments")
                .and_then(Value::as_array)
                .and_then(|items| items.iter().find(|a| a.get("id").and_then(Value::as_i64) == Some(attachment_id)))
                .cloned();
            match found {
                Some(attachment) => Ok(ToolOutput::ok("manage", attachment)),
                None => Err(ToolError::new("not_found", format!("no attachment with id {attachment_id}"))),
            }
        }
        "delete" => {
            let attachment_id = require_int(args, "attachment_id")?;
            let value = ctx
                .rest
                .call(ToolFamily::Read, kind, Method::DELETE, &format!("/attachments/{attachment_id}"), None, None)
                .await?;
            Ok(ToolOutput::ok("manage", value))
        }
        "share" => Ok(ToolOutput::partial(
            "manage",
            json!({ "op": "share" }),
            "uploaded files are already realm-visible via their returned URL; there is no separate share-link endpoint",
        )),
        _ => Ok(ToolOutput::partial(
            "manage",
            json!({ "op": "download" }),
            "this client issues JSON API calls only; fetch the attachment URL directly with the active identity's credentials to download bytes",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_filename_strips_path_components() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\a\\report.pdf").unwrap(), "report.pdf");
    }

    #[test]
    fn sanitize_filename_rejects_empty_basename() {
        assert!(sanitize_filename("../").is_err());
    }

    #[test]
    fn extension_of_lowercases() {
        assert_eq!(extension_of("Report.PDF"), Some("pdf".to_string()));
    }
}
