// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Turn-scoped tool-call execution (spec §4.4.3). Given the model's output
//! items for one round, runs every `function_call` concurrently and returns
//! the continuation input for the next round: `[echoes...] ++
//! [outputs_in_call_order...]`, preserving stable call/output pairing
//! regardless of completion order.

use std::collections::HashMap;
use std::sync::Arc;

use blippy_model::{OutputItem, RequestItem};
use futures::future::join_all;
use serde_json::Value;

use crate::context::CallContext;
use crate::name_encoding::decode_tool_name;
use crate::registry::{RegistryError, ToolRegistry};
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Reported once per completed tool call, in completion order — used by the
/// Loop to publish `Event::ToolResult` on the broker (spec §4.2).
#[derive(Debug, Clone)]
pub struct ToolResultNotice {
    pub name: String,
    pub input: Value,
    pub result: String,
}

struct PendingCall {
    call_id: String,
    encoded_name: String,
    decoded_name: String,
    arguments: Value,
}

pub async fn process_output<F>(
    ctx: &CallContext,
    items: &[OutputItem],
    registry: &ToolRegistry,
    dynamic: &HashMap<String, Arc<dyn Tool>>,
    on_result: F,
) -> Vec<RequestItem>
where
    F: Fn(ToolResultNotice) + Send + Sync,
{
    let pending: Vec<PendingCall> = items
        .iter()
        .filter_map(|item| match item {
            OutputItem::FunctionCall { call_id, name, arguments, .. } => {
                let arguments_value: Value =
                    serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.clone()));
                Some(PendingCall {
                    call_id: call_id.clone(),
                    encoded_name: name.clone(),
                    decoded_name: decode_tool_name(name),
                    arguments: arguments_value,
                })
            }
            _ => None,
        })
        .collect();

    if pending.is_empty() {
        return Vec::new();
    }

    // Echo records are appended synchronously, in call order, before any
    // execution starts (spec §4.4.3).
    let echoes: Vec<RequestItem> = items
        .iter()
        .filter_map(|item| match item {
            OutputItem::FunctionCall { id, call_id, name, arguments } => Some(RequestItem::FunctionCall {
                id: id.clone(),
                call_id: call_id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
            }),
            _ => None,
        })
        .collect();

    let futures = pending.into_iter().map(|call| {
        let on_result = &on_result;
        async move {
            let tool_call = ToolCall { id: call.call_id.clone(), name: call.decoded_name.clone(), args: call.arguments.clone() };
            let output = dispatch(ctx, registry, dynamic, &tool_call).await;
            on_result(ToolResultNotice {
                name: call.decoded_name.clone(),
                input: call.arguments.clone(),
                result: output.content.clone(),
            });
            let _ = &call.encoded_name;
            (call.call_id, output)
        }
    });

    let results = join_all(futures).await;

    let mut outputs: Vec<RequestItem> = Vec::with_capacity(results.len());
    for (call_id, output) in results {
        outputs.push(RequestItem::FunctionCallOutput { call_id, output: output.content });
    }

    let mut continuation = echoes;
    continuation.extend(outputs);
    continuation
}

async fn dispatch(
    ctx: &CallContext,
    registry: &ToolRegistry,
    dynamic: &HashMap<String, Arc<dyn Tool>>,
    call: &ToolCall,
) -> ToolOutput {
    if let Some(tool) = dynamic.get(&call.name) {
        return tool.execute(ctx, call).await;
    }
    match registry.execute(ctx, call).await {
        Ok(output) => output,
        Err(RegistryError::ToolNotFound(name)) => ToolOutput::err(&call.id, format!("tool not found: {name}")),
    }
}
