// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Role of a request-level input item. Distinct from stored-message roles,
/// which are restricted to `user`/`assistant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One item of an LLM request's `input` array, projected from stored
/// conversation history plus the new user turn (turn preparation, §4.5.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestItem {
    Message { role: Role, content: String },
    FunctionCall {
        id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput { call_id: String, output: String },
}

/// A tool definition as sent to the provider: `{type:"function", name,
/// description, parameters}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A streamed or non-streamed completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub instructions: String,
    pub input: Vec<RequestItem>,
    pub tools: Vec<ToolSchema>,
    pub previous_response_id: Option<String>,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instructions: instructions.into(),
            input: Vec::new(),
            tools: Vec::new(),
            previous_response_id: None,
            stream: true,
        }
    }
}

/// One piece of message content in a provider response (`{type, text}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    pub text: String,
}

/// One element of a response's `output[]` array (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message { content: Vec<ContentPart> },
    FunctionCall {
        id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
    },
}

/// The `response` payload carried by a terminal stream event, or returned
/// whole by a non-streaming completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub output: Vec<OutputItem>,
}

impl CompletionResponse {
    /// Concatenate all `message` output items' text, in order. Used for
    /// title generation and for callers that only want text.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for item in &self.output {
            if let OutputItem::Message { content } = item {
                for part in content {
                    out.push_str(&part.text);
                }
            }
        }
        out
    }
}

/// One event produced by [`crate::LlmClient::stream`].
///
/// `response.output_text.delta` carries `delta`; a `response` object on any
/// event finalizes that round (§4.5.3). `Done` signals end-of-stream with no
/// further `response` forthcoming.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta(String),
    Response(CompletionResponse),
    Done,
}
