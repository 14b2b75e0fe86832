// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

/// The narrow interface the Executor's `call_agent` tool uses to invoke the
/// Runner, without depending on it directly (spec §9, "Cyclic references
/// avoided"). Implemented by `blippy-runner::Runner`.
#[async_trait]
pub trait AgentCaller: Send + Sync {
    /// Run `prompt` against `agent_id` (or the caller's own agent if `None`)
    /// at `depth`, returning `(conversation_id, response_text)`.
    async fn run_agent(
        &self,
        agent_id: Option<String>,
        prompt: String,
        depth: u32,
        model: Option<String>,
        title: Option<String>,
    ) -> anyhow::Result<(String, String)>;

    /// Create a trigger for a later/recurring autonomous run
    /// (`schedule_agent_run`, spec §4.6).
    async fn schedule_run(
        &self,
        agent_id: String,
        prompt: String,
        delay_secs: Option<u64>,
        cron_expr: Option<String>,
    ) -> anyhow::Result<String>;
}
