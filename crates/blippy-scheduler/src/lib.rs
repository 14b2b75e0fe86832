// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cron/one-shot trigger ticking (spec §4.7): a 10-second ticker that
//! resyncs `next_run_at` for every trigger on startup, then runs due
//! triggers serially on each tick through [`blippy_runner::Runner`].

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use blippy_runner::Runner;
use blippy_store::{Store, TriggerRunStatus};

const TICK_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression {expr:?}: {reason}")]
    InvalidCron { expr: String, reason: String },
}

/// Parse a standard 5-field cron expression (spec §6) and return its
/// strict next occurrence after `after`. The `cron` crate's grammar has a
/// leading seconds field, so a fixed `0` is prepended.
fn next_occurrence(expr: &str, after: chrono::DateTime<Utc>) -> Result<chrono::DateTime<Utc>, SchedulerError> {
    let six_field = format!("0 {expr}");
    let schedule = cron::Schedule::from_str(&six_field)
        .map_err(|e| SchedulerError::InvalidCron { expr: expr.to_string(), reason: e.to_string() })?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| SchedulerError::InvalidCron { expr: expr.to_string(), reason: "no future occurrence".to_string() })
}

/// Owns the ticker task and its stop signal (spec §4.7).
pub struct Scheduler {
    store: Arc<Store>,
    runner: Arc<Runner>,
    stop_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, runner: Arc<Runner>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self { store, runner, stop_tx }
    }

    /// Resync every trigger's `next_run_at`, then spawn the tick loop.
    /// Returns a handle joined by [`Scheduler::stop`].
    pub fn start(&self) -> JoinHandle<()> {
        self.resync();

        let store = self.store.clone();
        let runner = self.runner.clone();
        let mut stop_rx = self.stop_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_PERIOD);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_due_triggers(&store, &runner).await;
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("scheduler tick loop stopped");
        })
    }

    /// Step 1 (spec §4.7): read all triggers, recompute `next_run_at` from
    /// "now" for every cron trigger. Invalid expressions are logged and
    /// skipped; one-shot triggers (no cron expression) are left untouched.
    fn resync(&self) {
        let triggers = match self.store.list_triggers() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to list triggers for cron resync");
                return;
            }
        };
        let now = Utc::now();
        for trigger in triggers {
            let Some(expr) = &trigger.cron_expr else { continue };
            match next_occurrence(expr, now) {
                Ok(next) => {
                    if let Err(e) = self.store.set_trigger_next_run(&trigger.id, next) {
                        tracing::error!(trigger_id = %trigger.id, error = %e, "failed to persist resynced next_run_at");
                    }
                }
                Err(e) => {
                    tracing::warn!(trigger_id = %trigger.id, expr, error = %e, "invalid cron expression, skipping resync");
                }
            }
        }
    }

    /// Close the stop signal and wait for the tick loop to exit.
    pub async fn stop(&self, handle: JoinHandle<()>) {
        let _ = self.stop_tx.send(true);
        let _ = handle.await;
    }
}

/// Step 2 (spec §4.7): due triggers run serially, oldest first. A failure
/// in one trigger is logged and does not abort the tick.
async fn run_due_triggers(store: &Arc<Store>, runner: &Arc<Runner>) {
    let due = match store.due_triggers(Utc::now()) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "failed to query due triggers");
            return;
        }
    };

    for trigger in due {
        let run = match store.create_trigger_run(&trigger.id) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(trigger_id = %trigger.id, error = %e, "failed to record trigger run start");
                continue;
            }
        };

        let result = runner
            .run(&trigger.agent_id, trigger.prompt.clone(), 0, trigger.model.clone(), trigger.conversation_title.clone())
            .await;

        let (status, error_message, conversation_id) = match &result {
            Ok((conversation_id, _)) => (TriggerRunStatus::Completed, None, Some(conversation_id.as_str())),
            Err(e) => (TriggerRunStatus::Failed, Some(e.to_string()), None),
        };
        if let Err(e) = store.finish_trigger_run(&run.id, status, error_message.as_deref(), conversation_id) {
            tracing::error!(trigger_id = %trigger.id, run_id = %run.id, error = %e, "failed to record trigger run finish");
        }
        if let Err(e) = &result {
            tracing::warn!(trigger_id = %trigger.id, error = %e, "trigger run failed");
        }

        match &trigger.cron_expr {
            Some(expr) => match next_occurrence(expr, Utc::now()) {
                Ok(next) => {
                    if let Err(e) = store.set_trigger_next_run(&trigger.id, next) {
                        tracing::error!(trigger_id = %trigger.id, error = %e, "failed to advance next_run_at");
                    }
                }
                Err(e) => {
                    tracing::error!(trigger_id = %trigger.id, expr, error = %e, "cron expression became invalid, leaving trigger stuck");
                }
            },
            None => {
                if let Err(e) = store.delete_trigger(&trigger.id) {
                    tracing::error!(trigger_id = %trigger.id, error = %e, "failed to delete one-shot trigger");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blippy_broker::Broker;
    use blippy_core::Loop;
    use blippy_model::{CompletionResponse, ContentPart, LlmClient, OutputItem, ScriptedMockProvider, StreamEvent};
    use blippy_tools::ToolRegistry;
    use chrono::Duration as ChronoDuration;

    fn text_round(id: &str, text: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::TextDelta(text.to_string()),
            StreamEvent::Response(CompletionResponse {
                id: id.to_string(),
                output: vec![OutputItem::Message { content: vec![ContentPart { text: String::new() }] }],
            }),
        ]
    }

    fn setup(rounds: Vec<Vec<StreamEvent>>) -> (Arc<Store>, Arc<Runner>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let broker = Arc::new(Broker::new());
        let registry = Arc::new(ToolRegistry::new());
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedMockProvider::new(rounds));
        let the_loop = Arc::new(Loop::new(store.clone(), broker.clone(), llm, registry, "mock-model"));
        (store.clone(), Runner::new(store, broker, the_loop))
    }

    #[test]
    fn next_occurrence_rejects_invalid_expression() {
        assert!(next_occurrence("not a cron", Utc::now()).is_err());
    }

    #[test]
    fn next_occurrence_is_strictly_after_now() {
        let now = Utc::now();
        let next = next_occurrence("*/1 * * * *", now).unwrap();
        assert!(next > now);
    }

    #[tokio::test]
    async fn due_trigger_runs_and_is_marked_completed_one_shot_deleted() {
        let (store, runner) = setup(vec![text_round("r1", "done")]);
        let agent = store.create_agent("worker", "be terse", "mock-model").unwrap();
        let past = Utc::now() - ChronoDuration::seconds(5);
        let trigger = store.create_trigger(&agent.id, "t1", "go", None, Some(past), None, None).unwrap();

        run_due_triggers(&store, &runner).await;

        assert!(store.list_triggers().unwrap().iter().all(|t| t.id != trigger.id));
    }

    #[tokio::test]
    async fn due_cron_trigger_advances_next_run_and_is_not_deleted() {
        let (store, runner) = setup(vec![text_round("r1", "done")]);
        let agent = store.create_agent("worker", "be terse", "mock-model").unwrap();
        let past = Utc::now() - ChronoDuration::seconds(5);
        let trigger =
            store.create_trigger(&agent.id, "t1", "go", Some("*/1 * * * *"), Some(past), None, None).unwrap();

        run_due_triggers(&store, &runner).await;

        let refreshed = store.list_triggers().unwrap().into_iter().find(|t| t.id == trigger.id).unwrap();
        assert!(refreshed.next_run_at.unwrap() > past);
    }

    #[tokio::test]
    async fn failing_trigger_is_marked_failed_and_does_not_abort_tick() {
        // No scripted rounds: the Loop's stream() call errors immediately.
        let (store, runner) = setup(vec![]);
        let agent = store.create_agent("worker", "be terse", "mock-model").unwrap();
        let past = Utc::now() - ChronoDuration::seconds(5);
        store.create_trigger(&agent.id, "t1", "go", None, Some(past), None, None).unwrap();

        run_due_triggers(&store, &runner).await;

        // One-shot trigger still removed even though its run failed.
        assert!(store.list_triggers().unwrap().is_empty());
    }
}
