// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A per-conversation streaming event (spec §4.2). Tagged variants
/// discriminated by `type`, matching the model/item/request-item convention
/// used throughout the wire formats this system consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Emitted once when a turn begins.
    TurnStarted,
    /// A fragment of assistant text, in emission order.
    TextDelta { content: String },
    /// One completed tool invocation; may arrive in completion order rather
    /// than call order (spec §4.4.3).
    ToolResult { name: String, input: Value, result: String },
    /// A complete, persisted message.
    MessageDone { message_id: String, role: String, items_json: String, created_at: DateTime<Utc> },
    /// Turn finished; `title` is populated only when newly generated.
    TurnDone { title: Option<String> },
    /// A turn-level failure; always followed by `TurnDone` with no title.
    Error { message: String },
}
