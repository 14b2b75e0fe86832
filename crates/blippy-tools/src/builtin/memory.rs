// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `memory_read` / `memory_write`: the agent's persistent scratchpad at
//! `memories/MEMORY.md` (spec §4.5.1 step 5 — the memory section is
//! injected into instructions iff one of these is enabled).

use async_trait::async_trait;
use blippy_store::Store;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::context::CallContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub const MEMORY_TOOL_NAMES: [&str; 2] = ["memory_read", "memory_write"];

pub struct MemoryReadTool {
    store: Arc<Store>,
}

impl MemoryReadTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryReadTool {
    fn name(&self) -> &str {
        "memory_read"
    }

    fn description(&self) -> &str {
        "Read the agent's persistent memory notes (memories/MEMORY.md)."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> ToolOutput {
        match self.store.get_agent_memory(&ctx.agent_id) {
            Ok(Some(content)) => ToolOutput::ok(&call.id, content),
            Ok(None) => ToolOutput::ok(&call.id, ""),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

pub struct MemoryWriteTool {
    store: Arc<Store>,
}

impl MemoryWriteTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryWriteTool {
    fn name(&self) -> &str {
        "memory_write"
    }

    fn description(&self) -> &str {
        "Overwrite the agent's persistent memory notes (memories/MEMORY.md)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"content": {"type": "string"}},
            "required": ["content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> ToolOutput {
        let Some(content) = call.args.get("content").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'content'");
        };
        match self.store.set_agent_memory(&ctx.agent_id, content) {
            Ok(()) => ToolOutput::ok(&call.id, "memory updated"),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let agent = store.create_agent("A", "", "").unwrap();
        let ctx = CallContext::new("conv1", agent.id.clone(), 0);

        let write = MemoryWriteTool::new(store.clone());
        let out = write
            .execute(&ctx, &ToolCall { id: "c1".into(), name: "memory_write".into(), args: json!({"content": "note"}) })
            .await;
        assert!(!out.is_error);

        let read = MemoryReadTool::new(store);
        let out = read.execute(&ctx, &ToolCall { id: "c2".into(), name: "memory_read".into(), args: json!({}) }).await;
        assert_eq!(out.content, "note");
    }

    #[tokio::test]
    async fn read_with_no_memory_yields_empty_not_error() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let agent = store.create_agent("A", "", "").unwrap();
        let ctx = CallContext::new("conv1", agent.id.clone(), 0);
        let read = MemoryReadTool::new(store);
        let out = read.execute(&ctx, &ToolCall { id: "c1".into(), name: "memory_read".into(), args: json!({}) }).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "(no output)");
    }
}
