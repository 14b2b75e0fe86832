// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! OpenRouter-backed [`LlmClient`].
//!
//! OpenRouter speaks the OpenAI chat-completions wire format (`choices[].
//! delta.content`, `choices[].delta.tool_calls[]`, SSE-framed). This driver
//! translates that wire shape into the `response.output_text.delta` /
//! terminal-`response` shape the core consumes, so the rest of the workspace
//! never has to know which wire format backs it (spec §6 treats the LLM
//! wire format as an external collaborator).

use std::collections::HashMap;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::stream::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{LlmClient, ResponseStream};
use crate::types::{
    CompletionRequest, CompletionResponse, ContentPart, OutputItem, RequestItem, Role,
    StreamEvent,
};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct OpenRouterClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    max_tokens: u32,
    temperature: f32,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.7,
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let mut messages = vec![json!({
            "role": "system",
            "content": req.instructions,
        })];
        messages.extend(build_openai_messages(&req.input));

        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": req.model,
            "messages": messages,
            "stream": req.stream,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        if req.stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }

    async fn send(&self, body: Value) -> anyhow::Result<reqwest::Response> {
        debug!(url = %self.chat_url(), "sending openrouter completion request");
        let resp = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("openrouter request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("openrouter error {status}: {text}");
        }
        Ok(resp)
    }
}

/// Project `RequestItem`s into OpenAI chat-completions messages. Our
/// internal shape already carries `function_call`/`function_call_output`
/// pairing (§4.5.2); OpenAI's wire format represents the same pairing as an
/// `assistant` message with `tool_calls` followed by one `tool` message per
/// call, so consecutive function-call items are grouped into one assistant
/// message.
fn build_openai_messages(items: &[RequestItem]) -> Vec<Value> {
    let mut out = Vec::new();
    let mut pending_calls: Vec<Value> = Vec::new();

    let flush = |out: &mut Vec<Value>, pending: &mut Vec<Value>| {
        if !pending.is_empty() {
            out.push(json!({
                "role": "assistant",
                "content": null,
                "tool_calls": std::mem::take(pending),
            }));
        }
    };

    for item in items {
        match item {
            RequestItem::Message { role, content } => {
                flush(&mut out, &mut pending_calls);
                let role_str = match role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                };
                out.push(json!({ "role": role_str, "content": content }));
            }
            RequestItem::FunctionCall { call_id, name, arguments, .. } => {
                pending_calls.push(json!({
                    "id": call_id,
                    "type": "function",
                    "function": { "name": name, "arguments": arguments },
                }));
            }
            RequestItem::FunctionCallOutput { call_id, output } => {
                flush(&mut out, &mut pending_calls);
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": output,
                }));
            }
        }
    }
    flush(&mut out, &mut pending_calls);
    out
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn stream(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let mut body = self.build_body(&req);
        body["stream"] = json!(true);
        let resp = self.send(body).await?;

        let byte_stream = resp.bytes_stream();
        let event_stream = byte_stream
            .scan(
                (String::new(), String::new(), HashMap::<u32, PendingToolCall>::new()),
                |(buf, text_acc, pending), chunk| {
                    let events = match chunk {
                        Ok(bytes) => {
                            buf.push_str(&String::from_utf8_lossy(&bytes));
                            drain_sse_lines(buf, text_acc, pending)
                        }
                        Err(e) => vec![Err(anyhow::anyhow!(e))],
                    };
                    std::future::ready(Some(events))
                },
            )
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let mut body = self.build_body(&req);
        body["stream"] = json!(false);
        let resp = self.send(body).await?;
        let parsed: Value = resp.json().await.context("invalid openrouter response body")?;
        parse_non_streaming(&parsed)
    }

    async fn generate_title(
        &self,
        model: &str,
        user: &str,
        assistant: &str,
    ) -> anyhow::Result<String> {
        let prompt = format!(
            "Generate a short 3-6 word title for this conversation. \
             Respond with only the title, no quotes or punctuation.\n\nUser: {user}\nAssistant: {assistant}"
        );
        let req = CompletionRequest {
            stream: false,
            ..CompletionRequest::new(model, "You write concise conversation titles.")
        }
        .with_message(Role::User, prompt);
        let resp = self.complete(req).await?;
        Ok(resp.text().trim().to_string())
    }
}

impl CompletionRequest {
    fn with_message(mut self, role: Role, content: impl Into<String>) -> Self {
        self.input.push(RequestItem::Message { role, content: content.into() });
        self
    }
}

fn parse_non_streaming(v: &Value) -> anyhow::Result<CompletionResponse> {
    let id = v["id"].as_str().unwrap_or_default().to_string();
    let choice = v["choices"].get(0).context("openrouter response has no choices")?;
    let message = &choice["message"];
    let mut output = Vec::new();
    if let Some(text) = message["content"].as_str() {
        if !text.is_empty() {
            output.push(OutputItem::Message { content: vec![ContentPart { text: text.to_string() }] });
        }
    }
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let call_id = call["id"].as_str().unwrap_or_default().to_string();
            let name = call["function"]["name"].as_str().unwrap_or_default().to_string();
            let arguments = call["function"]["arguments"].as_str().unwrap_or("{}").to_string();
            output.push(OutputItem::FunctionCall { id: None, call_id, name, arguments });
        }
    }
    Ok(CompletionResponse { id, output })
}

/// Drain complete `\n`-terminated SSE lines from `buf`, updating the
/// accumulated text and in-flight tool-call buffers, emitting a terminal
/// `StreamEvent::Response` when a `finish_reason` or `[DONE]` arrives.
fn drain_sse_lines(
    buf: &mut String,
    text_acc: &mut String,
    pending: &mut HashMap<u32, PendingToolCall>,
) -> Vec<anyhow::Result<StreamEvent>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();

        let Some(data) = line.strip_prefix("data: ") else { continue };
        let data = data.trim();
        if data.is_empty() {
            continue;
        }
        if data == "[DONE]" {
            events.push(Ok(StreamEvent::Done));
            continue;
        }
        let chunk: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let id = chunk["id"].as_str().unwrap_or_default().to_string();
        let choice = &chunk["choices"][0];
        let delta = &choice["delta"];

        if let Some(text) = delta["content"].as_str() {
            if !text.is_empty() {
                text_acc.push_str(text);
                events.push(Ok(StreamEvent::TextDelta(text.to_string())));
            }
        }

        if let Some(calls) = delta["tool_calls"].as_array() {
            for call in calls {
                let index = call["index"].as_u64().unwrap_or(0) as u32;
                let entry = pending.entry(index).or_default();
                if let Some(cid) = call["id"].as_str() {
                    entry.id = cid.to_string();
                }
                if let Some(name) = call["function"]["name"].as_str() {
                    entry.name.push_str(name);
                }
                if let Some(args) = call["function"]["arguments"].as_str() {
                    entry.args_buf.push_str(args);
                }
            }
        }

        if choice["finish_reason"].is_string() {
            let mut output = Vec::new();
            if !text_acc.is_empty() {
                output.push(OutputItem::Message {
                    content: vec![ContentPart { text: std::mem::take(text_acc) }],
                });
            }
            let mut indices: Vec<u32> = pending.keys().copied().collect();
            indices.sort_unstable();
            for idx in indices {
                if let Some(tc) = pending.remove(&idx) {
                    output.push(OutputItem::FunctionCall {
                        id: None,
                        call_id: tc.id,
                        name: tc.name,
                        arguments: tc.args_buf,
                    });
                }
            }
            events.push(Ok(StreamEvent::Response(CompletionResponse { id, output })));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_text_delta_and_terminal_response() {
        let mut buf = String::new();
        buf.push_str("data: {\"id\":\"r1\",\"choices\":[{\"delta\":{\"content\":\"hi\"},\"finish_reason\":null}]}\n");
        buf.push_str("data: {\"id\":\"r1\",\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n");
        buf.push_str("data: [DONE]\n");

        let mut text_acc = String::new();
        let mut pending = HashMap::new();
        let events = drain_sse_lines(&mut buf, &mut text_acc, &mut pending);

        assert_eq!(events.len(), 3);
        match events[0].as_ref().unwrap() {
            StreamEvent::TextDelta(d) => assert_eq!(d, "hi"),
            other => panic!("expected TextDelta, got {other:?}"),
        }
        match events[1].as_ref().unwrap() {
            StreamEvent::Response(r) => assert_eq!(r.text(), "hi"),
            other => panic!("expected Response, got {other:?}"),
        }
        assert!(matches!(events[2].as_ref().unwrap(), StreamEvent::Done));
    }

    #[test]
    fn assembles_tool_call_across_fragmented_argument_deltas() {
        let mut buf = String::new();
        buf.push_str("data: {\"id\":\"r1\",\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"fetch_url\",\"arguments\":\"{\\\"u\"}}]},\"finish_reason\":null}]}\n");
        buf.push_str("data: {\"id\":\"r1\",\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"rl\\\":1}\"}}]},\"finish_reason\":\"tool_calls\"}]}\n");

        let mut text_acc = String::new();
        let mut pending = HashMap::new();
        let events = drain_sse_lines(&mut buf, &mut text_acc, &mut pending);

        let StreamEvent::Response(r) = events.last().unwrap().as_ref().unwrap() else {
            panic!("expected terminal Response event");
        };
        match &r.output[0] {
            OutputItem::FunctionCall { call_id, name, arguments, .. } => {
                assert_eq!(call_id, "c1");
                assert_eq!(name, "fetch_url");
                assert_eq!(arguments, "{\"url\":1}");
            }
            other => panic!("expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn build_openai_messages_groups_paired_calls_and_outputs() {
        let items = vec![
            RequestItem::Message { role: Role::User, content: "hi".into() },
            RequestItem::FunctionCall {
                id: None,
                call_id: "c1".into(),
                name: "fetch_url".into(),
                arguments: "{}".into(),
            },
            RequestItem::FunctionCallOutput { call_id: "c1".into(), output: "ok".into() },
        ];
        let msgs = build_openai_messages(&items);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1]["role"], "assistant");
        assert_eq!(msgs[1]["tool_calls"][0]["id"], "c1");
        assert_eq!(msgs[2]["role"], "tool");
        assert_eq!(msgs[2]["tool_call_id"], "c1");
    }
}
