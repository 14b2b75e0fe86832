// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;

use crate::context::CallContext;

/// A single tool invocation requested by the model, name already decoded
/// (§4.4.2).
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// The result of executing a tool: always a textual result, never a raw
/// error propagated to the caller (§7 propagation rule).
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let content = if content.is_empty() { "(no output)".to_string() } else { content };
        Self { call_id: call_id.into(), content, is_error: false }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: format!("Error: {}", msg.into()), is_error: true }
    }
}

/// A registered handler: `{name, description, parameters_schema, handler}`
/// (spec §4.3).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> ToolOutput;
}
