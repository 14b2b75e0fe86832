// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Turn preparation step 3 / history projection (spec §4.5.2): converts
//! stored messages into the provider's `input[]` item shape.

use blippy_model::{RequestItem, Role};
use blippy_store::{Item, Message, MessageRole};
use blippy_tools::encode_tool_name;

/// Project one stored message into zero or more request items.
fn project_message(message: &Message) -> Vec<RequestItem> {
    match message.role {
        MessageRole::User => {
            let text: String = message
                .items
                .iter()
                .filter_map(|item| match item {
                    Item::Text { content } => Some(content.as_str()),
                    _ => None,
                })
                .collect();
            vec![RequestItem::Message { role: Role::User, content: text }]
        }
        MessageRole::Assistant => {
            let mut out = Vec::new();
            let mut text_acc = String::new();
            for (idx, item) in message.items.iter().enumerate() {
                match item {
                    Item::ToolExecution { name, input_json, result_text, call_id, fc_id } => {
                        let call_id = if call_id.is_empty() {
                            format!("{}-{idx}", message.id)
                        } else {
                            call_id.clone()
                        };
                        let id = fc_id
                            .clone()
                            .filter(|s| !s.is_empty())
                            .unwrap_or_else(|| format!("{}-{idx}-fc", message.id));
                        out.push(RequestItem::FunctionCall {
                            id: Some(id),
                            call_id: call_id.clone(),
                            name: encode_tool_name(name),
                            arguments: input_json.clone(),
                        });
                        out.push(RequestItem::FunctionCallOutput { call_id, output: result_text.clone() });
                    }
                    Item::Text { content } => text_acc.push_str(content),
                }
            }
            if !text_acc.is_empty() {
                out.push(RequestItem::Message { role: Role::Assistant, content: text_acc });
            }
            out
        }
    }
}

/// Project an ordered history of stored messages into provider input items,
/// in chronological order.
pub fn project_history(messages: &[Message]) -> Vec<RequestItem> {
    messages.iter().flat_map(project_message).collect()
}
