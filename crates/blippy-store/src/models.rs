// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted fs-root allowlist entry for one agent (spec §3 Agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsRootConfig {
    pub root_id: String,
    pub enabled_tool_names: Vec<String>,
}

/// Configuration of a persona, consumed read-only by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub model: String,
    pub enabled_tools: Vec<String>,
    pub enabled_notification_channels: Vec<String>,
    pub enabled_filesystem_roots: Vec<FsRootConfig>,
    pub forwarded_host_env_vars: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chat thread bound to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub agent_id: String,
    pub title: String,
    pub previous_response_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A tagged element of a message's ordered content list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Text { content: String },
    ToolExecution {
        name: String,
        input_json: String,
        result_text: String,
        call_id: String,
        fc_id: Option<String>,
    },
}

/// An append-only record belonging to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub items: Vec<Item>,
    pub created_at: DateTime<Utc>,
}

/// A persisted invocation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub agent_id: String,
    pub name: String,
    pub prompt: String,
    pub cron_expr: Option<String>,
    pub enabled: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub conversation_title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRunStatus {
    Running,
    Completed,
    Failed,
}

/// An audit row for one trigger execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRun {
    pub id: String,
    pub trigger_id: String,
    pub conversation_id: Option<String>,
    pub status: TriggerRunStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A notification destination; the only defined `channel_type` is
/// `http_request` (spec §4.4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub channel_type: String,
    pub config: serde_json::Value,
    pub description: String,
    pub json_schema: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named, absolute filesystem jail root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemRoot {
    pub id: String,
    pub name: String,
    pub path: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
