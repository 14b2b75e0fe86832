// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::context::CallContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// A tool definition formatted for the provider: `{type:"function", name,
/// description, parameters}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),
}

/// Maps tool names to handlers (spec §4.3). Append-only during startup,
/// read-only thereafter — no locking required at steady state.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// The subset of registered tools whose names are in `enabled_names`,
    /// in the caller's order (spec §4.3 `List`).
    pub fn list(&self, enabled_names: &[String]) -> Vec<ToolDef> {
        enabled_names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDef {
                kind: "function",
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolOutput, RegistryError> {
        let tool = self.get(&call.name).ok_or_else(|| RegistryError::ToolNotFound(call.name.clone()))?;
        debug!(tool = %call.name, call_id = %call.id, "executing tool");
        Ok(tool.execute(ctx, call).await)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, _ctx: &CallContext, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, call.args.to_string())
        }
    }

    fn ctx() -> CallContext {
        CallContext::new("conv1", "agent1", 0)
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall { id: id.into(), name: name.into(), args }
    }

    #[test]
    fn register_and_get() {
        let mut r = ToolRegistry::new();
        r.register(Arc::new(EchoTool));
        assert!(r.get("echo").is_some());
    }

    #[test]
    fn get_unknown_returns_none() {
        let r = ToolRegistry::new();
        assert!(r.get("nope").is_none());
    }

    #[test]
    fn list_filters_and_preserves_caller_order() {
        let mut r = ToolRegistry::new();
        r.register(Arc::new(EchoTool));
        let defs = r.list(&["echo".to_string(), "missing".to_string()]);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].kind, "function");
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let mut r = ToolRegistry::new();
        r.register(Arc::new(EchoTool));
        let out = r.execute(&ctx(), &call("c1", "echo", json!({"x":1}))).await.unwrap();
        assert!(!out.is_error);
        assert_eq!(out.content, "{\"x\":1}");
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_not_found() {
        let r = ToolRegistry::new();
        let err = r.execute(&ctx(), &call("c1", "missing", json!({}))).await.unwrap_err();
        assert!(matches!(err, RegistryError::ToolNotFound(name) if name == "missing"));
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut r = ToolRegistry::new();
        r.register(Arc::new(EchoTool));
        r.register(Arc::new(EchoTool));
        assert_eq!(r.names().len(), 1);
    }
}
