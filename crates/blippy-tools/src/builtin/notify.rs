// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Dynamic notification tool: one `notify:<channel_name>` `Tool` is built per
//! enabled channel during tool resolution (spec §4.4.1 point 2). The only
//! defined channel type is `http_request`.

use async_trait::async_trait;
use blippy_channels::{dispatch_http_request, HttpRequestConfig};
use serde_json::Value;

use crate::context::CallContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct NotifyTool {
    /// Internal (undecoded) name: `notify:<channel_name>`.
    name: String,
    description: String,
    config: HttpRequestConfig,
}

impl NotifyTool {
    pub fn new(channel_name: &str, description: String, config: HttpRequestConfig) -> Self {
        Self { name: format!("notify:{channel_name}"), description, config }
    }
}

#[async_trait]
impl Tool for NotifyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "description": "Arbitrary JSON payload forwarded as the notification's body"
        })
    }

    async fn execute(&self, _ctx: &CallContext, call: &ToolCall) -> ToolOutput {
        let result = dispatch_http_request(&self.config, &call.args).await;
        ToolOutput::ok(&call.id, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_colon_prefixed_for_encoding() {
        let cfg: HttpRequestConfig = serde_json::from_value(serde_json::json!({"url": "http://x"})).unwrap();
        let tool = NotifyTool::new("slack", "slack channel".into(), cfg);
        assert_eq!(tool.name(), "notify:slack");
    }
}
