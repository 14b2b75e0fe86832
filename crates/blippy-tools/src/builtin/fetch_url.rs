// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `fetch_url` static tool (spec §4.4.1 point 1 — a static tool available to
//! every agent that enables it).

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::CallContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

const TIMEOUT_SECS: u64 = 30;
const MAX_RESPONSE_BYTES: usize = 500 * 1024;

pub struct FetchUrlTool;

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP(S) and return its content as text. HTML is \
         converted to readable text, JSON is pretty-printed. Responses larger \
         than 500 KiB are truncated."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "The URL to fetch (http or https)"}
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _ctx: &CallContext, call: &ToolCall) -> ToolOutput {
        let url = match call.args.get("url").and_then(|v| v.as_str()) {
            Some(u) => u.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'url'"),
        };
        debug!(url = %url, "fetch_url tool");

        match fetch(&url).await {
            Ok(content) => ToolOutput::ok(&call.id, content),
            Err(e) => ToolOutput::err(&call.id, format!("fetch error: {e}")),
        }
    }
}

async fn fetch(url: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent("blippy-agent/0.1")
        .build()?;

    let response = client.get(url).send().await?;
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let bytes = response.bytes().await?;
    let truncated = bytes.len() > MAX_RESPONSE_BYTES;
    let slice = &bytes[..bytes.len().min(MAX_RESPONSE_BYTES)];
    let body = String::from_utf8_lossy(slice).into_owned();

    let content = if content_type.contains("html") {
        html_to_text(&body)
    } else if content_type.contains("json") {
        match serde_json::from_str::<Value>(&body) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(body),
            Err(_) => body,
        }
    } else {
        body
    };

    Ok(if truncated {
        format!("{content}...[truncated at {MAX_RESPONSE_BYTES} bytes]")
    } else {
        content
    })
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_tags() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<h1>"));
    }

    #[tokio::test]
    async fn missing_url_is_error() {
        let ctx = CallContext::new("conv1", "agent1", 0);
        let call = ToolCall { id: "c1".into(), name: "fetch_url".into(), args: json!({}) };
        let out = FetchUrlTool.execute(&ctx, &call).await;
        assert!(out.is_error);
    }
}
