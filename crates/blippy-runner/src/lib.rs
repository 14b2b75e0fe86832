// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Autonomous agent execution (spec §4.6): creates a fresh conversation,
//! delegates to the shared Loop with an autonomous-mode preamble, and
//! enforces the subagent recursion bound. Implements [`AgentCaller`] so the
//! Executor's `call_agent`/`schedule_agent_run` tools can dispatch back in
//! without depending on this crate directly (spec §9 "Cyclic references
//! avoided").

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use thiserror::Error;

use blippy_broker::Broker;
use blippy_core::{Loop, TurnInput};
use blippy_store::Store;
use blippy_tools::AgentCaller;

/// Preamble prepended to instructions for autonomous runs, telling the
/// model no human is present to answer follow-up questions (spec §4.6).
const AUTONOMOUS_PREAMBLE: &str = "You are running autonomously with no human present to respond. \
Do not ask clarifying questions; make reasonable assumptions and proceed.\n\n";

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("max agent depth exceeded: {depth} > {max_depth}")]
    MaxDepthExceeded { depth: u32, max_depth: u32 },
    #[error("exactly one of delay_secs or cron_expr is required")]
    NeitherDelayNorCron,
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),
}

/// Default recursion bound (spec §4.6).
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// Drives autonomous agent runs: webhook requests, scheduler ticks, and
/// nested `call_agent`/`schedule_agent_run` dispatches all funnel through
/// [`Runner::run`].
pub struct Runner {
    store: Arc<Store>,
    broker: Arc<Broker>,
    the_loop: Arc<Loop>,
    max_depth: u32,
}

impl Runner {
    pub fn new(store: Arc<Store>, broker: Arc<Broker>, the_loop: Arc<Loop>) -> Arc<Self> {
        Self::with_max_depth(store, broker, the_loop, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(store: Arc<Store>, broker: Arc<Broker>, the_loop: Arc<Loop>, max_depth: u32) -> Arc<Self> {
        Arc::new(Self { store, broker, the_loop, max_depth })
    }

    /// The broker backing this runner's turns, for callers (e.g. the
    /// webhook handler) that need to subscribe to a conversation's events.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Run `agent_id` on `prompt` at `depth`, returning the new
    /// conversation id and the final assistant message's plain text.
    pub async fn run(
        self: &Arc<Self>,
        agent_id: &str,
        prompt: String,
        depth: u32,
        model: Option<String>,
        title: Option<String>,
    ) -> anyhow::Result<(String, String)> {
        if depth > self.max_depth {
            return Err(RunnerError::MaxDepthExceeded { depth, max_depth: self.max_depth }.into());
        }

        let agent = self.store.get_agent(agent_id)?;
        let conversation = self.store.create_conversation(agent_id, title.as_deref())?;

        let scoped_caller: Arc<dyn AgentCaller> =
            Arc::new(ScopedCaller { runner: self.clone(), calling_agent_id: agent_id.to_string() });

        let mut input = TurnInput::new(conversation.clone(), agent, prompt);
        input.depth = depth;
        input.model_override = model;
        input.extra_instructions = Some(AUTONOMOUS_PREAMBLE.to_string());
        input.agent_caller = Some(scoped_caller);

        let out = self.the_loop.run_turn(input).await?;
        Ok((conversation.id, out.response_text))
    }

    /// `schedule_agent_run` (spec §4.6): create a trigger for a later
    /// (`delay_secs`) or recurring (`cron_expr`) autonomous run.
    pub async fn schedule(
        &self,
        agent_id: &str,
        prompt: String,
        delay_secs: Option<u64>,
        cron_expr: Option<String>,
    ) -> anyhow::Result<String> {
        let now = Utc::now();
        let next_run_at = match (&cron_expr, delay_secs) {
            (Some(_), Some(_)) => return Err(RunnerError::NeitherDelayNorCron.into()),
            (None, None) => return Err(RunnerError::NeitherDelayNorCron.into()),
            (Some(expr), None) => next_cron_occurrence(expr, now).map_err(|e| anyhow::anyhow!(e))?,
            (None, Some(secs)) => now + Duration::seconds(secs as i64),
        };
        let trigger = self.store.create_trigger(
            agent_id,
            "scheduled by agent",
            &prompt,
            cron_expr.as_deref(),
            Some(next_run_at),
            None,
            None,
        )?;
        Ok(trigger.id)
    }
}

/// Parse a standard 5-field cron expression (minute, hour, day-of-month,
/// month, day-of-week — spec §6) and return its next occurrence strictly
/// after `after`. The `cron` crate's grammar includes a leading seconds
/// field, so a fixed `0` is prepended.
pub fn next_cron_occurrence(expr: &str, after: chrono::DateTime<Utc>) -> Result<chrono::DateTime<Utc>, RunnerError> {
    let six_field = format!("0 {expr}");
    let schedule =
        cron::Schedule::from_str(&six_field).map_err(|e| RunnerError::InvalidCron(format!("{expr}: {e}")))?;
    schedule.after(&after).next().ok_or_else(|| RunnerError::InvalidCron(format!("{expr}: no future occurrence")))
}

/// Binds a [`Runner`] to the agent id of the turn it was handed to, so a
/// `call_agent` call with no explicit `agent_id` resolves to "the caller's
/// own agent" rather than requiring the Executor to know about Runner.
struct ScopedCaller {
    runner: Arc<Runner>,
    calling_agent_id: String,
}

#[async_trait]
impl AgentCaller for ScopedCaller {
    async fn run_agent(
        &self,
        agent_id: Option<String>,
        prompt: String,
        depth: u32,
        model: Option<String>,
        title: Option<String>,
    ) -> anyhow::Result<(String, String)> {
        let target = agent_id.unwrap_or_else(|| self.calling_agent_id.clone());
        self.runner.run(&target, prompt, depth, model, title).await
    }

    async fn schedule_run(
        &self,
        agent_id: String,
        prompt: String,
        delay_secs: Option<u64>,
        cron_expr: Option<String>,
    ) -> anyhow::Result<String> {
        self.runner.schedule(&agent_id, prompt, delay_secs, cron_expr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blippy_core::Loop;
    use blippy_model::{CompletionResponse, ContentPart, LlmClient, OutputItem, ScriptedMockProvider, StreamEvent};
    use blippy_tools::ToolRegistry;

    fn build_runner(rounds: Vec<Vec<StreamEvent>>, max_depth: u32) -> (Arc<Runner>, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let broker = Arc::new(Broker::new());
        let registry = Arc::new(ToolRegistry::new());
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedMockProvider::new(rounds));
        let the_loop = Arc::new(Loop::new(store.clone(), broker.clone(), llm, registry, "mock-model"));
        (Runner::with_max_depth(store.clone(), broker, the_loop, max_depth), store)
    }

    fn text_round(id: &str, text: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::TextDelta(text.to_string()),
            StreamEvent::Response(CompletionResponse {
                id: id.to_string(),
                output: vec![OutputItem::Message { content: vec![ContentPart { text: String::new() }] }],
            }),
        ]
    }

    #[tokio::test]
    async fn run_creates_conversation_and_returns_text() {
        let (runner, store) = build_runner(vec![text_round("r1", "done")], 5);
        let agent = store.create_agent("worker", "be terse", "mock-model").unwrap();

        let (conversation_id, text) = runner.run(&agent.id, "go".to_string(), 0, None, None).await.unwrap();
        assert_eq!(text, "done");
        assert!(store.get_conversation(&conversation_id).is_ok());
    }

    #[tokio::test]
    async fn depth_beyond_max_is_rejected_without_creating_a_conversation() {
        let (runner, store) = build_runner(vec![], 5);
        let agent = store.create_agent("worker", "be terse", "mock-model").unwrap();

        let err = runner.run(&agent.id, "go".to_string(), 6, None, None).await.unwrap_err();
        assert!(err.to_string().contains("max agent depth exceeded"));
    }

    #[tokio::test]
    async fn schedule_rejects_both_delay_and_cron() {
        let (runner, store) = build_runner(vec![], 5);
        let agent = store.create_agent("worker", "be terse", "mock-model").unwrap();
        let err = runner
            .schedule(&agent.id, "go".to_string(), Some(60), Some("* * * * *".to_string()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[tokio::test]
    async fn schedule_with_delay_sets_future_next_run() {
        let (runner, store) = build_runner(vec![], 5);
        let agent = store.create_agent("worker", "be terse", "mock-model").unwrap();
        let trigger_id = runner.schedule(&agent.id, "go".to_string(), Some(60), None).await.unwrap();
        let trigger = store.list_triggers().unwrap().into_iter().find(|t| t.id == trigger_id).unwrap();
        assert!(trigger.next_run_at.unwrap() > Utc::now());
        assert!(trigger.cron_expr.is_none());
    }

    #[test]
    fn next_cron_occurrence_rejects_garbage() {
        assert!(next_cron_occurrence("not a cron expr", Utc::now()).is_err());
    }
}
