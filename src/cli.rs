// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `blippy seed ...`: a minimal CLI for populating the store with agents,
//! triggers, notification channels, and filesystem roots. Full CRUD over
//! these resources is an external RPC concern outside this subsystem; this
//! exists only so the binary is runnable end to end without hand-editing
//! SQLite. Shaped after `sven`'s own `src/cli.rs` subcommand split.

use clap::{Parser, Subcommand};

use blippy_store::Store;

#[derive(Parser, Debug)]
#[command(name = "blippy seed")]
pub struct SeedCli {
    #[command(subcommand)]
    pub command: SeedCommand,
}

#[derive(Subcommand, Debug)]
pub enum SeedCommand {
    /// Create an agent.
    AgentAdd {
        name: String,
        #[arg(long)]
        system_prompt: String,
        #[arg(long)]
        model: String,
        /// Tool names to enable, comma-separated (e.g. fetch_url,fs_view).
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,
    },
    /// List all agents.
    AgentList,
    /// Create a trigger. Exactly one of --delay-secs or --cron must be set.
    TriggerAdd {
        agent_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        cron: Option<String>,
    },
    /// List all triggers.
    TriggerList,
    /// Create an `http_request` notification channel.
    ChannelAdd {
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Register a filesystem jail root.
    RootAdd {
        name: String,
        path: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

pub fn run(cli: SeedCli, store: &Store) -> anyhow::Result<()> {
    match cli.command {
        SeedCommand::AgentAdd { name, system_prompt, model, tools } => {
            let mut agent = store.create_agent(&name, &system_prompt, &model)?;
            if !tools.is_empty() {
                agent.enabled_tools = tools;
                store.update_agent(&agent)?;
            }
            println!("created agent {} ({})", agent.id, agent.name);
        }
        SeedCommand::AgentList => {
            for agent in store.list_agents()? {
                println!("{}  {}  model={}", agent.id, agent.name, agent.model);
            }
        }
        SeedCommand::TriggerAdd { agent_id, name, prompt, cron } => {
            let next_run_at = match &cron {
                Some(expr) => Some(blippy_runner::next_cron_occurrence(expr, chrono::Utc::now())?),
                None => Some(chrono::Utc::now()),
            };
            let trigger = store.create_trigger(&agent_id, &name, &prompt, cron.as_deref(), next_run_at, None, None)?;
            println!("created trigger {}", trigger.id);
        }
        SeedCommand::TriggerList => {
            for trigger in store.list_triggers()? {
                println!("{}  agent={}  cron={:?}  next_run_at={:?}", trigger.id, trigger.agent_id, trigger.cron_expr, trigger.next_run_at);
            }
        }
        SeedCommand::ChannelAdd { name, url, description } => {
            let config = serde_json::json!({"url": url});
            let schema = serde_json::json!({"type": "object"});
            let channel = store.create_notification_channel(&name, "http_request", config, &description, schema)?;
            println!("created notification channel {} ({})", channel.id, channel.name);
        }
        SeedCommand::RootAdd { name, path, description } => {
            let root = store.create_filesystem_root(&name, &path, &description)?;
            println!("created filesystem root {} -> {}", root.id, root.path);
        }
    }
    Ok(())
}
