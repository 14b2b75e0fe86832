// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The Loop: drives one turn from user input to a persisted assistant
//! message, interleaving tool execution across streaming rounds (spec
//! §4.5).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use blippy_broker::{Broker, Event};
use blippy_model::{CompletionRequest, LlmClient, OutputItem, RequestItem, Role, StreamEvent};
use blippy_store::{Agent, Conversation, Item, Message, MessageRole, Store};
use blippy_tools::{build_tool_set, decode_tool_name, process_output, AgentCaller, CallContext, ToolRegistry};
use futures::StreamExt;
use thiserror::Error;

use crate::history::project_history;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("conversation already has an in-flight turn")]
    Busy,
}

/// Turn preparation inputs (spec §4.5.1).
pub struct TurnInput {
    pub conversation: Conversation,
    pub agent: Agent,
    pub user_text: String,
    pub history: Vec<Message>,
    pub model_override: Option<String>,
    pub extra_instructions: Option<String>,
    pub depth: u32,
    pub forwarded_env: Vec<String>,
    pub agent_caller: Option<Arc<dyn AgentCaller>>,
}

impl TurnInput {
    pub fn new(conversation: Conversation, agent: Agent, user_text: impl Into<String>) -> Self {
        Self {
            conversation,
            agent,
            user_text: user_text.into(),
            history: Vec::new(),
            model_override: None,
            extra_instructions: None,
            depth: 0,
            forwarded_env: Vec::new(),
            agent_caller: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutput {
    pub message: Option<Message>,
    pub response_text: String,
}

fn text_of(items: &[Item]) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            Item::Text { content } => Some(content.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

/// One conversation's in-flight-turn cleanup. Clearing the busy flag is
/// attached to every exit path of the turn — success, error, or the task
/// being dropped outright — via `Drop` rather than duplicated at each
/// return site (spec §4.5.4 step 7).
struct BusyGuard<'a> {
    broker: &'a Broker,
    topic: String,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.broker.clear_busy(&self.topic);
    }
}

/// Drives one LLM streaming request, interleaves tool execution, persists
/// the assistant message, generates the title, and publishes events.
/// Shared by interactive chat and the Runner's autonomous execution (spec
/// §9 "Shared LLM loop") — the two differ only in the preamble prepended to
/// instructions and in who creates the conversation.
pub struct Loop {
    store: Arc<Store>,
    broker: Arc<Broker>,
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    default_model: String,
}

impl Loop {
    pub fn new(store: Arc<Store>, broker: Arc<Broker>, llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>, default_model: impl Into<String>) -> Self {
        Self { store, broker, llm, registry, default_model: default_model.into() }
    }

    pub async fn run_turn(&self, input: TurnInput) -> anyhow::Result<TurnOutput> {
        let topic = input.conversation.id.clone();
        if !self.broker.set_busy(&topic) {
            return Err(LoopError::Busy.into());
        }
        let _guard = BusyGuard { broker: &self.broker, topic: topic.clone() };
        self.broker.publish(&topic, Event::TurnStarted);

        match self.run_inner(&input, &topic).await {
            Ok(out) => Ok(out),
            Err(e) => {
                self.broker.publish(&topic, Event::Error { message: e.to_string() });
                self.broker.publish(&topic, Event::TurnDone { title: None });
                Err(e)
            }
        }
    }

    async fn run_inner(&self, input: &TurnInput, topic: &str) -> anyhow::Result<TurnOutput> {
        let model = input
            .model_override
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| Some(input.agent.model.clone()).filter(|m| !m.is_empty()))
            .unwrap_or_else(|| self.default_model.clone());

        let memory_enabled = input
            .agent
            .enabled_tools
            .iter()
            .any(|t| blippy_tools::builtin::MEMORY_TOOL_NAMES.contains(&t.as_str()));
        let memory_section = if memory_enabled {
            let memory = self.store.get_agent_memory(&input.agent.id)?.unwrap_or_default();
            format!(
                "You have persistent memory tools (memory_read/memory_write) to keep notes across turns.\nCurrent memory contents:\n{memory}\n\n"
            )
        } else {
            String::new()
        };
        let instructions =
            format!("{}{}{}", input.extra_instructions.clone().unwrap_or_default(), memory_section, input.agent.system_prompt);

        let resolved = build_tool_set(&self.store, &self.registry, &input.agent);

        let forwarded_env =
            if input.forwarded_env.is_empty() { input.agent.forwarded_host_env_vars.clone() } else { input.forwarded_env.clone() };

        let mut ctx = CallContext::new(input.conversation.id.clone(), input.agent.id.clone(), input.depth).with_fs_roots(resolved.fs_roots);
        ctx.forwarded_env = forwarded_env;
        if let Some(caller) = input.agent_caller.clone() {
            ctx = ctx.with_agent_caller(caller);
        }

        let mut current_input = project_history(&input.history);
        current_input.push(RequestItem::Message { role: Role::User, content: input.user_text.clone() });

        let mut items: Vec<Item> = Vec::new();
        let mut final_response_id: Option<String> = None;
        let mut seen_response_ids: HashSet<String> = HashSet::new();
        let mut round = 0usize;

        loop {
            let mut req = CompletionRequest::new(model.clone(), instructions.clone());
            req.input = current_input.clone();
            req.tools = resolved.defs.clone();
            req.previous_response_id = if round == 0 { input.conversation.previous_response_id.clone() } else { None };

            let mut stream = self.llm.stream(req).await?;
            let mut text_buf = String::new();
            let mut round_response = None;

            while let Some(event) = stream.next().await {
                match event? {
                    StreamEvent::TextDelta(delta) => {
                        text_buf.push_str(&delta);
                        self.broker.publish(topic, Event::TextDelta { content: delta });
                    }
                    StreamEvent::Response(resp) => {
                        // Open question (spec §9): a provider that emits more
                        // than one terminal event per round must not cause
                        // double-processing — dedupe on response.id.
                        if seen_response_ids.contains(&resp.id) {
                            continue;
                        }
                        seen_response_ids.insert(resp.id.clone());
                        round_response = Some(resp);
                        break;
                    }
                    StreamEvent::Done => break,
                }
            }

            let Some(resp) = round_response else {
                if !text_buf.is_empty() {
                    items.push(Item::Text { content: text_buf });
                }
                break;
            };

            final_response_id = Some(resp.id.clone());
            if !text_buf.is_empty() {
                items.push(Item::Text { content: text_buf });
            }

            let continuation = process_output(&ctx, &resp.output, &self.registry, &resolved.dynamic, |notice| {
                self.broker.publish(
                    topic,
                    Event::ToolResult { name: notice.name.clone(), input: notice.input.clone(), result: notice.result.clone() },
                );
            })
            .await;

            if continuation.is_empty() {
                break;
            }

            let mut output_by_call: HashMap<String, String> = continuation
                .iter()
                .filter_map(|ri| match ri {
                    RequestItem::FunctionCallOutput { call_id, output } => Some((call_id.clone(), output.clone())),
                    _ => None,
                })
                .collect();
            for out_item in &resp.output {
                if let OutputItem::FunctionCall { id, call_id, name, arguments } = out_item {
                    let result_text = output_by_call.remove(call_id).unwrap_or_default();
                    items.push(Item::ToolExecution {
                        name: decode_tool_name(name),
                        input_json: arguments.clone(),
                        result_text,
                        call_id: call_id.clone(),
                        fc_id: id.clone(),
                    });
                }
            }

            current_input.extend(continuation);
            round += 1;
        }

        if items.is_empty() {
            self.broker.publish(topic, Event::TurnDone { title: None });
            return Ok(TurnOutput { message: None, response_text: String::new() });
        }

        let message = self.store.create_message(&input.conversation.id, MessageRole::Assistant, &items)?;
        let items_json = serde_json::to_string(&items)?;
        self.broker.publish(
            topic,
            Event::MessageDone {
                message_id: message.id.clone(),
                role: "assistant".to_string(),
                items_json,
                created_at: message.created_at,
            },
        );

        let response_text = text_of(&items);
        let mut new_title = None;
        if input.conversation.title.is_empty() && !input.user_text.is_empty() {
            match self.llm.generate_title(&model, &input.user_text, &response_text).await {
                Ok(title) => new_title = Some(title),
                Err(e) => tracing::warn!(error = %e, "title generation failed, leaving title empty"),
            }
        }

        self.store.finish_turn(&input.conversation.id, new_title.as_deref(), final_response_id.as_deref())?;
        self.broker.publish(topic, Event::TurnDone { title: new_title });

        Ok(TurnOutput { message: Some(message), response_text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blippy_model::{ContentPart, OutputItem, ScriptedMockProvider};
    use blippy_store::Store;

    fn setup() -> (Arc<Store>, Arc<Broker>, Arc<ToolRegistry>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let broker = Arc::new(Broker::new());
        let registry = Arc::new(ToolRegistry::new());
        (store, broker, registry)
    }

    #[tokio::test]
    async fn plain_text_turn_persists_message_and_sets_title() {
        let (store, broker, registry) = setup();
        let agent = store.create_agent("tester", "be helpful", "mock-model").unwrap();
        let conversation = store.create_conversation(&agent.id, None).unwrap();

        let llm: Arc<dyn LlmClient> = Arc::new(
            ScriptedMockProvider::new(vec![vec![
                StreamEvent::TextDelta("hi".into()),
                StreamEvent::Response(blippy_model::CompletionResponse {
                    id: "r1".into(),
                    output: vec![OutputItem::Message { content: vec![ContentPart { text: String::new() }] }],
                }),
            ]])
            .with_title("Greeting"),
        );

        let the_loop = Loop::new(store.clone(), broker.clone(), llm, registry, "mock-model");
        let input = TurnInput::new(conversation.clone(), agent, "hello");
        let out = the_loop.run_turn(input).await.unwrap();

        assert_eq!(out.response_text, "hi");
        let stored = store.list_messages(&conversation.id).unwrap();
        assert_eq!(stored.len(), 1);

        let refreshed = store.get_conversation(&conversation.id).unwrap();
        assert_eq!(refreshed.title, "Greeting");
        assert_eq!(refreshed.previous_response_id.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn busy_conversation_rejects_concurrent_turn() {
        let (store, broker, registry) = setup();
        let agent = store.create_agent("tester", "be helpful", "mock-model").unwrap();
        let conversation = store.create_conversation(&agent.id, None).unwrap();
        assert!(broker.set_busy(&conversation.id));

        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedMockProvider::new(vec![]));
        let the_loop = Loop::new(store, broker.clone(), llm, registry, "mock-model");
        let input = TurnInput::new(conversation.clone(), agent, "hello");
        let err = the_loop.run_turn(input).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<LoopError>(), Some(LoopError::Busy)));

        broker.clear_busy(&conversation.id);
    }

    #[tokio::test]
    async fn turn_releases_busy_flag_after_completion() {
        let (store, broker, registry) = setup();
        let agent = store.create_agent("tester", "be helpful", "mock-model").unwrap();
        let conversation = store.create_conversation(&agent.id, None).unwrap();

        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedMockProvider::new(vec![vec![
            StreamEvent::TextDelta("ok".into()),
            StreamEvent::Response(blippy_model::CompletionResponse {
                id: "r1".into(),
                output: vec![OutputItem::Message { content: vec![ContentPart { text: String::new() }] }],
            }),
        ]]));

        let the_loop = Loop::new(store, broker.clone(), llm, registry, "mock-model");
        let input = TurnInput::new(conversation.clone(), agent, "hello");
        the_loop.run_turn(input).await.unwrap();

        assert!(!broker.is_busy(&conversation.id));
    }
}
