// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::*;
use crate::schema::SCHEMA;

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn fmt_dt(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// SQLite-backed persistence for everything the core reads/writes.
///
/// A single connection guarded by a mutex; writes within a turn happen
/// serially from one task (spec §5's shared-resource note), so a shared
/// connection needs no pool.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ── Agents ───────────────────────────────────────────────────────────

    pub fn create_agent(&self, name: &str, system_prompt: &str, model: &str) -> StoreResult<Agent> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO agents (id, name, description, system_prompt, model, \
             enabled_tools_json, enabled_notification_channels_json, \
             enabled_filesystem_roots_json, forwarded_host_env_vars_json, created_at, updated_at) \
             VALUES (?1, ?2, '', ?3, ?4, '[]', '[]', '[]', '[]', ?5, ?5)",
            params![id, name, system_prompt, model, fmt_dt(&now)],
        )?;
        Ok(Agent {
            id,
            name: name.to_string(),
            description: String::new(),
            system_prompt: system_prompt.to_string(),
            model: model.to_string(),
            enabled_tools: Vec::new(),
            enabled_notification_channels: Vec::new(),
            enabled_filesystem_roots: Vec::new(),
            forwarded_host_env_vars: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_agent(&self, id: &str) -> StoreResult<Agent> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, description, system_prompt, model, enabled_tools_json, \
             enabled_notification_channels_json, enabled_filesystem_roots_json, \
             forwarded_host_env_vars_json, created_at, updated_at FROM agents WHERE id = ?1",
            params![id],
            row_to_agent,
        )
        .optional()?
        .ok_or_else(|| StoreError::AgentNotFound(id.to_string()))
    }

    /// The contents of `memories/MEMORY.md` for this agent, if present
    /// (spec §4.5.1 step 5, memory section injection).
    pub fn get_agent_memory(&self, agent_id: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT content FROM agent_files WHERE agent_id = ?1 AND path = 'memories/MEMORY.md'",
            params![agent_id],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Overwrite `memories/MEMORY.md` for this agent (used by the
    /// `memory_write` tool).
    pub fn set_agent_memory(&self, agent_id: &str, content: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = fmt_dt(&Utc::now());
        conn.execute(
            "INSERT INTO agent_files (agent_id, path, content, created_at, updated_at) \
             VALUES (?1, 'memories/MEMORY.md', ?2, ?3, ?3) \
             ON CONFLICT(agent_id, path) DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at",
            params![agent_id, content, now],
        )?;
        Ok(())
    }

    /// Rewrite an agent's full mutable configuration (the CRUD surface
    /// itself is an external collaborator, spec §1; this is the minimal
    /// write path the bundled CLI uses to seed/update agents).
    pub fn update_agent(&self, agent: &Agent) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = fmt_dt(&Utc::now());
        conn.execute(
            "UPDATE agents SET name = ?1, description = ?2, system_prompt = ?3, model = ?4, \
             enabled_tools_json = ?5, enabled_notification_channels_json = ?6, \
             enabled_filesystem_roots_json = ?7, forwarded_host_env_vars_json = ?8, updated_at = ?9 \
             WHERE id = ?10",
            params![
                agent.name,
                agent.description,
                agent.system_prompt,
                agent.model,
                serde_json::to_string(&agent.enabled_tools)?,
                serde_json::to_string(&agent.enabled_notification_channels)?,
                serde_json::to_string(&agent.enabled_filesystem_roots)?,
                serde_json::to_string(&agent.forwarded_host_env_vars)?,
                now,
                agent.id,
            ],
        )?;
        Ok(())
    }

    pub fn list_agents(&self) -> StoreResult<Vec<Agent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, system_prompt, model, enabled_tools_json, \
             enabled_notification_channels_json, enabled_filesystem_roots_json, \
             forwarded_host_env_vars_json, created_at, updated_at FROM agents",
        )?;
        let rows = stmt.query_map([], row_to_agent)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn find_agent_by_name(&self, name: &str) -> StoreResult<Option<Agent>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, description, system_prompt, model, enabled_tools_json, \
             enabled_notification_channels_json, enabled_filesystem_roots_json, \
             forwarded_host_env_vars_json, created_at, updated_at FROM agents WHERE name = ?1",
            params![name],
            row_to_agent,
        )
        .optional()
        .map_err(StoreError::from)
    }

    // ── Conversations ────────────────────────────────────────────────────

    pub fn create_conversation(&self, agent_id: &str, title: Option<&str>) -> StoreResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let title = title.unwrap_or_default();
        conn.execute(
            "INSERT INTO conversations (id, agent_id, title, previous_response_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, NULL, ?4, ?4)",
            params![id, agent_id, title, fmt_dt(&now)],
        )?;
        Ok(Conversation {
            id,
            agent_id: agent_id.to_string(),
            title: title.to_string(),
            previous_response_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_conversation(&self, id: &str) -> StoreResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, agent_id, title, previous_response_id, created_at, updated_at \
             FROM conversations WHERE id = ?1",
            params![id],
            row_to_conversation,
        )
        .optional()?
        .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
    }

    /// Finalization step 5: atomically persist the new title (only if newly
    /// generated — title monotonicity, spec §3 invariant (b)), the response
    /// id, and bump `updated_at`.
    pub fn finish_turn(
        &self,
        id: &str,
        new_title: Option<&str>,
        response_id: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = fmt_dt(&Utc::now());
        if let Some(title) = new_title {
            conn.execute(
                "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3 AND title = ''",
                params![title, now, id],
            )?;
        }
        if let Some(rid) = response_id {
            conn.execute(
                "UPDATE conversations SET previous_response_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![rid, now, id],
            )?;
        }
        if new_title.is_none() && response_id.is_none() {
            conn.execute("UPDATE conversations SET updated_at = ?1 WHERE id = ?2", params![now, id])?;
        }
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────────

    pub fn create_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        items: &[Item],
    ) -> StoreResult<Message> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let role_str = match role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        let items_json = serde_json::to_string(items)?;
        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, items_json, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, conversation_id, role_str, items_json, fmt_dt(&now)],
        )?;
        debug!(conversation_id, message_id = %id, item_count = items.len(), "message persisted");
        Ok(Message { id, conversation_id: conversation_id.to_string(), role, items: items.to_vec(), created_at: now })
    }

    /// All messages for a conversation in chronological order (the history
    /// list turn preparation, §4.5.1, projects into LLM input items).
    pub fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, items_json, created_at FROM messages \
             WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id], row_to_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    // ── Notification channels / filesystem roots ────────────────────────

    pub fn create_notification_channel(
        &self,
        name: &str,
        channel_type: &str,
        config: serde_json::Value,
        description: &str,
        json_schema: serde_json::Value,
    ) -> StoreResult<NotificationChannel> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO notification_channels (id, name, type, config_json, description, \
             json_schema_json, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![id, name, channel_type, config.to_string(), description, json_schema.to_string(), fmt_dt(&now)],
        )?;
        Ok(NotificationChannel {
            id,
            name: name.to_string(),
            channel_type: channel_type.to_string(),
            config,
            description: description.to_string(),
            json_schema,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_notification_channel(&self, id: &str) -> StoreResult<NotificationChannel> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, type, config_json, description, json_schema_json, created_at, updated_at \
             FROM notification_channels WHERE id = ?1",
            params![id],
            row_to_channel,
        )
        .optional()?
        .ok_or_else(|| StoreError::ChannelNotFound(id.to_string()))
    }

    pub fn create_filesystem_root(&self, name: &str, path: &str, description: &str) -> StoreResult<FilesystemRoot> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO filesystem_roots (id, name, path, description, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, name, path, description, fmt_dt(&now)],
        )?;
        Ok(FilesystemRoot {
            id,
            name: name.to_string(),
            path: path.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_filesystem_root(&self, id: &str) -> StoreResult<FilesystemRoot> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, path, description, created_at, updated_at FROM filesystem_roots WHERE id = ?1",
            params![id],
            row_to_root,
        )
        .optional()?
        .ok_or_else(|| StoreError::RootNotFound(id.to_string()))
    }

    // ── Triggers ─────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn create_trigger(
        &self,
        agent_id: &str,
        name: &str,
        prompt: &str,
        cron_expr: Option<&str>,
        next_run_at: Option<DateTime<Utc>>,
        model: Option<&str>,
        conversation_title: Option<&str>,
    ) -> StoreResult<Trigger> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO triggers (id, agent_id, name, prompt, cron_expr, enabled, next_run_at, \
             model, conversation_title, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8, ?9, ?9)",
            params![
                id,
                agent_id,
                name,
                prompt,
                cron_expr,
                next_run_at.map(|d| fmt_dt(&d)),
                model,
                conversation_title,
                fmt_dt(&now),
            ],
        )?;
        Ok(Trigger {
            id,
            agent_id: agent_id.to_string(),
            name: name.to_string(),
            prompt: prompt.to_string(),
            cron_expr: cron_expr.map(String::from),
            enabled: true,
            next_run_at,
            model: model.map(String::from),
            conversation_title: conversation_title.map(String::from),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn list_triggers(&self) -> StoreResult<Vec<Trigger>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, agent_id, name, prompt, cron_expr, enabled, next_run_at, model, \
             conversation_title, created_at, updated_at FROM triggers",
        )?;
        let rows = stmt.query_map([], row_to_trigger)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    /// Triggers due to run: `enabled = true` and `next_run_at <= now`,
    /// oldest first (spec §4.7 step 2).
    pub fn due_triggers(&self, now: DateTime<Utc>) -> StoreResult<Vec<Trigger>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, agent_id, name, prompt, cron_expr, enabled, next_run_at, model, \
             conversation_title, created_at, updated_at FROM triggers \
             WHERE enabled = 1 AND next_run_at IS NOT NULL AND next_run_at <= ?1 \
             ORDER BY next_run_at ASC",
        )?;
        let rows = stmt.query_map(params![fmt_dt(&now)], row_to_trigger)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    pub fn set_trigger_next_run(&self, id: &str, next_run_at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE triggers SET next_run_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![fmt_dt(&next_run_at), fmt_dt(&Utc::now()), id],
        )?;
        Ok(())
    }

    /// One-shot deletion (spec §8 invariant): after a trigger with no cron
    /// expression runs, no row for it remains.
    pub fn delete_trigger(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM triggers WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn create_trigger_run(&self, trigger_id: &str) -> StoreResult<TriggerRun> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO trigger_runs (id, trigger_id, conversation_id, status, error_message, \
             started_at, finished_at) VALUES (?1, ?2, NULL, 'running', NULL, ?3, NULL)",
            params![id, trigger_id, fmt_dt(&now)],
        )?;
        Ok(TriggerRun {
            id,
            trigger_id: trigger_id.to_string(),
            conversation_id: None,
            status: TriggerRunStatus::Running,
            error_message: None,
            started_at: now,
            finished_at: None,
        })
    }

    pub fn finish_trigger_run(
        &self,
        id: &str,
        status: TriggerRunStatus,
        error_message: Option<&str>,
        conversation_id: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let status_str = match status {
            TriggerRunStatus::Running => "running",
            TriggerRunStatus::Completed => "completed",
            TriggerRunStatus::Failed => "failed",
        };
        conn.execute(
            "UPDATE trigger_runs SET status = ?1, error_message = ?2, conversation_id = ?3, \
             finished_at = ?4 WHERE id = ?5",
            params![status_str, error_message, conversation_id, fmt_dt(&Utc::now()), id],
        )?;
        Ok(())
    }
}

fn row_to_agent(row: &rusqlite::Row) -> rusqlite::Result<Agent> {
    let tools_json: String = row.get(5)?;
    let channels_json: String = row.get(6)?;
    let roots_json: String = row.get(7)?;
    let env_json: String = row.get(8)?;
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        system_prompt: row.get(3)?,
        model: row.get(4)?,
        enabled_tools: serde_json::from_str(&tools_json).unwrap_or_default(),
        enabled_notification_channels: serde_json::from_str(&channels_json).unwrap_or_default(),
        enabled_filesystem_roots: serde_json::from_str(&roots_json).unwrap_or_default(),
        forwarded_host_env_vars: serde_json::from_str(&env_json).unwrap_or_default(),
        created_at: parse_dt(&row.get::<_, String>(9)?),
        updated_at: parse_dt(&row.get::<_, String>(10)?),
    })
}

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        title: row.get(2)?,
        previous_response_id: row.get(3)?,
        created_at: parse_dt(&row.get::<_, String>(4)?),
        updated_at: parse_dt(&row.get::<_, String>(5)?),
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<StoreResult<Message>> {
    let role_str: String = row.get(2)?;
    let role = if role_str == "assistant" { MessageRole::Assistant } else { MessageRole::User };
    let items_json: String = row.get(3)?;
    Ok((|| {
        let items: Vec<Item> = serde_json::from_str(&items_json)?;
        Ok(Message {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            role,
            items,
            created_at: parse_dt(&row.get::<_, String>(4)?),
        })
    })())
}

fn row_to_channel(row: &rusqlite::Row) -> rusqlite::Result<NotificationChannel> {
    let config_json: String = row.get(3)?;
    let schema_json: String = row.get(5)?;
    Ok(NotificationChannel {
        id: row.get(0)?,
        name: row.get(1)?,
        channel_type: row.get(2)?,
        config: serde_json::from_str(&config_json).unwrap_or(serde_json::json!({})),
        description: row.get(4)?,
        json_schema: serde_json::from_str(&schema_json).unwrap_or(serde_json::json!({"type":"object"})),
        created_at: parse_dt(&row.get::<_, String>(6)?),
        updated_at: parse_dt(&row.get::<_, String>(7)?),
    })
}

fn row_to_root(row: &rusqlite::Row) -> rusqlite::Result<FilesystemRoot> {
    Ok(FilesystemRoot {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        description: row.get(3)?,
        created_at: parse_dt(&row.get::<_, String>(4)?),
        updated_at: parse_dt(&row.get::<_, String>(5)?),
    })
}

fn row_to_trigger(row: &rusqlite::Row) -> rusqlite::Result<Trigger> {
    let next_run: Option<String> = row.get(6)?;
    let enabled: bool = row.get(5)?;
    Ok(Trigger {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        name: row.get(2)?,
        prompt: row.get(3)?,
        cron_expr: row.get(4)?,
        enabled,
        next_run_at: next_run.map(|s| parse_dt(&s)),
        model: row.get(7)?,
        conversation_title: row.get(8)?,
        created_at: parse_dt(&row.get::<_, String>(9)?),
        updated_at: parse_dt(&row.get::<_, String>(10)?),
    })
}
