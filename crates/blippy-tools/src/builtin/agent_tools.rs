// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `call_agent` and `schedule_agent_run`: subagent tools that dispatch
//! through `CallContext::agent_caller` rather than depending on the Runner
//! directly (spec §4.6, §9 "Cyclic references avoided").

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::CallContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct CallAgentTool;

#[async_trait]
impl Tool for CallAgentTool {
    fn name(&self) -> &str {
        "call_agent"
    }

    fn description(&self) -> &str {
        "Run another agent (or a fresh instance of the calling agent) on a \
         prompt and wait for its response. Subject to a maximum recursion \
         depth."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string", "description": "Agent to invoke; defaults to the caller's own agent"},
                "prompt": {"type": "string"},
                "model": {"type": "string"},
                "title": {"type": "string"}
            },
            "required": ["prompt"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> ToolOutput {
        let Some(caller) = ctx.agent_caller.clone() else {
            return ToolOutput::err(&call.id, "call_agent is unavailable in this context");
        };
        let prompt = match call.args.get("prompt").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'prompt'"),
        };
        let agent_id = call.args.get("agent_id").and_then(|v| v.as_str()).map(str::to_string);
        let model = call.args.get("model").and_then(|v| v.as_str()).map(str::to_string);
        let title = call.args.get("title").and_then(|v| v.as_str()).map(str::to_string);

        match caller.run_agent(agent_id, prompt, ctx.depth + 1, model, title).await {
            Ok((_conversation_id, response_text)) => ToolOutput::ok(&call.id, response_text),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

pub struct ScheduleAgentRunTool;

#[async_trait]
impl Tool for ScheduleAgentRunTool {
    fn name(&self) -> &str {
        "schedule_agent_run"
    }

    fn description(&self) -> &str {
        "Schedule a later (delay) or recurring (cron) autonomous agent run. \
         Exactly one of delay_secs or cron_expr must be supplied."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string", "description": "Defaults to the caller's own agent"},
                "prompt": {"type": "string"},
                "delay_secs": {"type": "integer"},
                "cron_expr": {"type": "string"}
            },
            "required": ["prompt"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> ToolOutput {
        let Some(caller) = ctx.agent_caller.clone() else {
            return ToolOutput::err(&call.id, "schedule_agent_run is unavailable in this context");
        };
        let prompt = match call.args.get("prompt").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'prompt'"),
        };
        let agent_id = call
            .args
            .get("agent_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| ctx.agent_id.clone());
        let delay_secs = call.args.get("delay_secs").and_then(|v| v.as_u64());
        let cron_expr = call.args.get("cron_expr").and_then(|v| v.as_str()).map(str::to_string);

        match (&delay_secs, &cron_expr) {
            (Some(_), Some(_)) => return ToolOutput::err(&call.id, "supply only one of delay_secs or cron_expr"),
            (None, None) => return ToolOutput::err(&call.id, "one of delay_secs or cron_expr is required"),
            _ => {}
        }

        match caller.schedule_run(agent_id, prompt, delay_secs, cron_expr).await {
            Ok(trigger_id) => ToolOutput::ok(&call.id, format!("scheduled trigger {trigger_id}")),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_caller::AgentCaller;
    use std::sync::Arc;

    struct FakeCaller;

    #[async_trait]
    impl AgentCaller for FakeCaller {
        async fn run_agent(
            &self,
            _agent_id: Option<String>,
            prompt: String,
            depth: u32,
            _model: Option<String>,
            _title: Option<String>,
        ) -> anyhow::Result<(String, String)> {
            Ok(("conv-1".to_string(), format!("ran at depth {depth}: {prompt}")))
        }

        async fn schedule_run(
            &self,
            _agent_id: String,
            _prompt: String,
            _delay_secs: Option<u64>,
            _cron_expr: Option<String>,
        ) -> anyhow::Result<String> {
            Ok("trigger-1".to_string())
        }
    }

    fn ctx_with_caller(depth: u32) -> CallContext {
        CallContext::new("conv1", "agent1", depth).with_agent_caller(Arc::new(FakeCaller))
    }

    #[tokio::test]
    async fn call_agent_increments_depth() {
        let ctx = ctx_with_caller(2);
        let call = ToolCall { id: "c1".into(), name: "call_agent".into(), args: json!({"prompt": "hi"}) };
        let out = CallAgentTool.execute(&ctx, &call).await;
        assert!(!out.is_error);
        assert!(out.content.contains("depth 3"));
    }

    #[tokio::test]
    async fn call_agent_without_caller_errors() {
        let ctx = CallContext::new("conv1", "agent1", 0);
        let call = ToolCall { id: "c1".into(), name: "call_agent".into(), args: json!({"prompt": "hi"}) };
        let out = CallAgentTool.execute(&ctx, &call).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn schedule_agent_run_rejects_both_delay_and_cron() {
        let ctx = ctx_with_caller(0);
        let call = ToolCall {
            id: "c1".into(),
            name: "schedule_agent_run".into(),
            args: json!({"prompt": "hi", "delay_secs": 60, "cron_expr": "* * * * *"}),
        };
        let out = ScheduleAgentRunTool.execute(&ctx, &call).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn schedule_agent_run_rejects_neither_delay_nor_cron() {
        let ctx = ctx_with_caller(0);
        let call = ToolCall { id: "c1".into(), name: "schedule_agent_run".into(), args: json!({"prompt": "hi"}) };
        let out = ScheduleAgentRunTool.execute(&ctx, &call).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn schedule_agent_run_succeeds_with_cron_only() {
        let ctx = ctx_with_caller(0);
        let call = ToolCall {
            id: "c1".into(),
            name: "schedule_agent_run".into(),
            args: json!({"prompt": "hi", "cron_expr": "*/5 * * * *"}),
        };
        let out = ScheduleAgentRunTool.execute(&ctx, &call).await;
        assert!(!out.is_error);
        assert!(out.content.contains("trigger-1"));
    }
}
