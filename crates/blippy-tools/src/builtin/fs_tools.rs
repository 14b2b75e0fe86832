// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Filesystem tools: `fs_view`, `fs_create`, `fs_str_replace`, `fs_insert`
//! (spec §4.4.1 point 3, §4.4.4).

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::builtin::path_safety::{resolve_within_root, PathSafetyError};
use crate::context::{CallContext, FsRoot};
use crate::tool::{Tool, ToolCall, ToolOutput};

const MAX_FILE_SIZE: u64 = 500 * 1024;

pub const FS_TOOL_NAMES: [&str; 4] = ["fs_view", "fs_create", "fs_str_replace", "fs_insert"];

fn root_names_schema(ctx_roots: &[FsRoot]) -> Value {
    json!(ctx_roots.iter().map(|r| r.name.clone()).collect::<Vec<_>>())
}

/// Look up the named root among the roots this tool was given for the
/// current turn (the `fs_tool_name → [roots]` map built by tool resolution).
fn find_root<'a>(roots: &'a [FsRoot], name: &str) -> Option<&'a FsRoot> {
    roots.iter().find(|r| r.name == name)
}

fn roots_for<'a>(ctx: &'a CallContext, tool_name: &str) -> &'a [FsRoot] {
    ctx.fs_roots.get(tool_name).map(|v| v.as_slice()).unwrap_or(&[])
}

fn args_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn resolve_target(ctx: &CallContext, tool_name: &str, call: &ToolCall) -> Result<std::path::PathBuf, String> {
    let roots = roots_for(ctx, tool_name);
    let root_name = args_str(&call.args, "root").ok_or("missing 'root'")?;
    let root = find_root(roots, root_name).ok_or_else(|| format!("unknown root: {root_name}"))?;
    let path = args_str(&call.args, "path").ok_or("missing 'path'")?;
    resolve_within_root(&root.path, path).map_err(|e: PathSafetyError| {
        warn!(root = root_name, path, error = %e, "fs path rejected");
        e.to_string()
    })
}

// ─── fs_view ────────────────────────────────────────────────────────────────

pub struct FsViewTool;

#[async_trait]
impl Tool for FsViewTool {
    fn name(&self) -> &str {
        "fs_view"
    }
    fn description(&self) -> &str {
        "View a file (line-numbered, optionally sliced) or list a directory's immediate entries."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "root": {"type": "string", "description": "Filesystem root name"},
                "path": {"type": "string", "description": "Path relative to the root"},
                "start": {"type": "integer", "description": "1-based inclusive start line"},
                "end": {"type": "integer", "description": "1-based inclusive end line"}
            },
            "required": ["root", "path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> ToolOutput {
        let target = match resolve_target(ctx, self.name(), call) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        debug!(path = %target.display(), "fs_view");

        let meta = match tokio::fs::metadata(&target).await {
            Ok(m) => m,
            Err(e) => return ToolOutput::err(&call.id, format!("stat error: {e}")),
        };

        if meta.is_dir() {
            return match tokio::fs::read_dir(&target).await {
                Ok(mut rd) => {
                    let mut entries = Vec::new();
                    while let Ok(Some(entry)) = rd.next_entry().await {
                        let name = entry.file_name().to_string_lossy().to_string();
                        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                        entries.push(if is_dir { format!("{name}/") } else { name });
                    }
                    entries.sort();
                    ToolOutput::ok(&call.id, entries.join("\n"))
                }
                Err(e) => ToolOutput::err(&call.id, format!("list error: {e}")),
            };
        }

        if meta.len() > MAX_FILE_SIZE {
            return ToolOutput::err(&call.id, format!("file too large: {} bytes (max {MAX_FILE_SIZE})", meta.len()));
        }
        let bytes = match tokio::fs::read(&target).await {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().collect();

        let start = call.args.get("start").and_then(|v| v.as_u64()).unwrap_or(1).max(1) as usize;
        let end = call.args.get("end").and_then(|v| v.as_u64()).map(|e| e as usize).unwrap_or(lines.len());
        if start > lines.len() {
            return ToolOutput::err(&call.id, format!("start {start} out of range ({} lines)", lines.len()));
        }
        let end = end.min(lines.len());

        let mut out = String::new();
        for (i, line) in lines.iter().enumerate().take(end).skip(start - 1) {
            out.push_str(&format!("{:>6}\t{}\n", i + 1, line));
        }
        ToolOutput::ok(&call.id, out)
    }
}

// ─── fs_create ──────────────────────────────────────────────────────────────

pub struct FsCreateTool;

#[async_trait]
impl Tool for FsCreateTool {
    fn name(&self) -> &str {
        "fs_create"
    }
    fn description(&self) -> &str {
        "Create a new file. Fails if the file already exists."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "root": {"type": "string"},
                "path": {"type": "string"},
                "file_text": {"type": "string"}
            },
            "required": ["root", "path", "file_text"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> ToolOutput {
        let target = match resolve_target(ctx, self.name(), call) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        if target.exists() {
            return ToolOutput::err(&call.id, format!("file already exists: {}", target.display()));
        }
        let content = args_str(&call.args, "file_text").unwrap_or_default();
        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(&call.id, format!("mkdir error: {e}"));
            }
        }
        match tokio::fs::write(&target, content).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("created {}", target.display())),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

// ─── fs_str_replace ─────────────────────────────────────────────────────────

pub struct FsStrReplaceTool;

#[async_trait]
impl Tool for FsStrReplaceTool {
    fn name(&self) -> &str {
        "fs_str_replace"
    }
    fn description(&self) -> &str {
        "Replace a single, exact occurrence of old_str with new_str in a file."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "root": {"type": "string"},
                "path": {"type": "string"},
                "old_str": {"type": "string"},
                "new_str": {"type": "string"}
            },
            "required": ["root", "path", "old_str", "new_str"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> ToolOutput {
        let target = match resolve_target(ctx, self.name(), call) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let old_str = args_str(&call.args, "old_str").unwrap_or_default();
        let new_str = args_str(&call.args, "new_str").unwrap_or_default();

        let content = match tokio::fs::read_to_string(&target).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };
        let occurrences = content.matches(old_str).count();
        if occurrences == 0 {
            return ToolOutput::err(&call.id, "old_str not found");
        }
        if occurrences > 1 {
            return ToolOutput::err(&call.id, format!("old_str matches {occurrences} times, expected exactly 1"));
        }
        let updated = content.replacen(old_str, new_str, 1);
        match tokio::fs::write(&target, updated).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("replaced in {}", target.display())),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

// ─── fs_insert ──────────────────────────────────────────────────────────────

pub struct FsInsertTool;

#[async_trait]
impl Tool for FsInsertTool {
    fn name(&self) -> &str {
        "fs_insert"
    }
    fn description(&self) -> &str {
        "Insert text after a 1-based line index (0 inserts at the top)."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "root": {"type": "string"},
                "path": {"type": "string"},
                "insert_line": {"type": "integer"},
                "new_str": {"type": "string"}
            },
            "required": ["root", "path", "insert_line", "new_str"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> ToolOutput {
        let target = match resolve_target(ctx, self.name(), call) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let insert_line = call.args.get("insert_line").and_then(|v| v.as_u64()).unwrap_or(u64::MAX) as usize;
        let new_str = args_str(&call.args, "new_str").unwrap_or_default();

        let content = match tokio::fs::read_to_string(&target).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };
        let mut lines: Vec<&str> = content.lines().collect();
        if insert_line > lines.len() {
            return ToolOutput::err(&call.id, format!("insert_line {insert_line} out of range ({} lines)", lines.len()));
        }
        lines.insert(insert_line, new_str);
        let updated = lines.join("\n") + "\n";
        match tokio::fs::write(&target, updated).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("inserted at line {insert_line} in {}", target.display())),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

/// Build a `fs_tool_name`-keyed `additionalProperties: false` schema
/// fragment advertising the union of root names as an enum (used by the
/// Executor's tool resolution, §4.4.1 point 3, when it decides *whether* a
/// root-enum override is needed beyond the free-text `root` field above).
pub fn root_enum_schema(roots: &[FsRoot]) -> Value {
    json!({ "enum": root_names_schema(roots) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn ctx_with_root(tool: &str, root_dir: &std::path::Path) -> CallContext {
        let mut fs_roots = HashMap::new();
        fs_roots.insert(
            tool.to_string(),
            vec![FsRoot { name: "proj".into(), path: root_dir.to_path_buf() }],
        );
        CallContext::new("conv1", "agent1", 0).with_fs_roots(fs_roots)
    }

    fn call(id: &str, args: Value) -> ToolCall {
        ToolCall { id: id.into(), name: "fs_view".into(), args }
    }

    #[tokio::test]
    async fn fs_view_lists_directory_with_trailing_slash_for_dirs() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        let ctx = ctx_with_root("fs_view", dir.path());

        let out = FsViewTool
            .execute(&ctx, &call("c1", json!({"root":"proj","path":"."})))
            .await;
        assert!(out.content.contains("sub/"));
        assert!(out.content.contains("a.txt"));
    }

    #[tokio::test]
    async fn fs_view_numbers_lines_and_slices_range() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "one\ntwo\nthree\n").unwrap();
        let ctx = ctx_with_root("fs_view", dir.path());

        let out = FsViewTool
            .execute(&ctx, &call("c1", json!({"root":"proj","path":"f.txt","start":2,"end":3})))
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("2\ttwo"));
        assert!(out.content.contains("3\tthree"));
        assert!(!out.content.contains("1\tone"));
    }

    #[tokio::test]
    async fn fs_view_out_of_range_start_is_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "one\n").unwrap();
        let ctx = ctx_with_root("fs_view", dir.path());

        let out = FsViewTool
            .execute(&ctx, &call("c1", json!({"root":"proj","path":"f.txt","start":99})))
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn fs_view_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let ctx = ctx_with_root("fs_view", dir.path());
        let out = FsViewTool
            .execute(&ctx, &call("c1", json!({"root":"proj","path":"../../etc/passwd"})))
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn fs_create_fails_if_exists() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("exists.txt"), "x").unwrap();
        let ctx = ctx_with_root("fs_create", dir.path());
        let out = FsCreateTool
            .execute(&ctx, &ToolCall { id: "c1".into(), name: "fs_create".into(), args: json!({"root":"proj","path":"exists.txt","file_text":"y"}) })
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn fs_create_rejects_traversal_and_creates_nothing() {
        let dir = tempdir().unwrap();
        let ctx = ctx_with_root("fs_create", dir.path());
        let out = FsCreateTool
            .execute(&ctx, &ToolCall { id: "c1".into(), name: "fs_create".into(), args: json!({"root":"proj","path":"../../etc/evil","file_text":"x"}) })
            .await;
        assert!(out.is_error);
        assert!(!dir.path().parent().unwrap().join("etc/evil").exists());
    }

    #[tokio::test]
    async fn fs_str_replace_requires_exactly_one_match() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "aaa").unwrap();
        let ctx = ctx_with_root("fs_str_replace", dir.path());
        let out = FsStrReplaceTool
            .execute(&ctx, &ToolCall { id: "c1".into(), name: "fs_str_replace".into(), args: json!({"root":"proj","path":"f.txt","old_str":"a","new_str":"b"}) })
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("3 times"));
    }

    #[tokio::test]
    async fn fs_str_replace_succeeds_on_unique_match() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "hello world").unwrap();
        let ctx = ctx_with_root("fs_str_replace", dir.path());
        let out = FsStrReplaceTool
            .execute(&ctx, &ToolCall { id: "c1".into(), name: "fs_str_replace".into(), args: json!({"root":"proj","path":"f.txt","old_str":"world","new_str":"rust"}) })
            .await;
        assert!(!out.is_error);
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "hello rust");
    }

    #[tokio::test]
    async fn fs_insert_at_zero_prepends() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "b\nc\n").unwrap();
        let ctx = ctx_with_root("fs_insert", dir.path());
        let out = FsInsertTool
            .execute(&ctx, &ToolCall { id: "c1".into(), name: "fs_insert".into(), args: json!({"root":"proj","path":"f.txt","insert_line":0,"new_str":"a"}) })
            .await;
        assert!(!out.is_error);
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "a\nb\nc\n");
    }

    #[tokio::test]
    async fn fs_insert_out_of_range_is_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\n").unwrap();
        let ctx = ctx_with_root("fs_insert", dir.path());
        let out = FsInsertTool
            .execute(&ctx, &ToolCall { id: "c1".into(), name: "fs_insert".into(), args: json!({"root":"proj","path":"f.txt","insert_line":99,"new_str":"x"}) })
            .await;
        assert!(out.is_error);
    }
}
