// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! A scripted [`LlmClient`] for deterministic tests of the Loop/Executor/
//! Runner without a network dependency.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::provider::{LlmClient, ResponseStream};
use crate::types::{CompletionRequest, CompletionResponse, StreamEvent};

/// One scripted round: the sequence of events `stream()` yields, consumed
/// in call order — the Nth call to `stream()` returns script entry N.
pub struct ScriptedMockProvider {
    rounds: Mutex<Vec<Vec<StreamEvent>>>,
    title: String,
}

impl ScriptedMockProvider {
    pub fn new(rounds: Vec<Vec<StreamEvent>>) -> Self {
        Self { rounds: Mutex::new(rounds), title: "Untitled".to_string() }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

#[async_trait]
impl LlmClient for ScriptedMockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream(&self, _req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let mut rounds = self.rounds.lock().unwrap();
        if rounds.is_empty() {
            anyhow::bail!("ScriptedMockProvider: no more scripted rounds");
        }
        let events = rounds.remove(0);
        let owned: Vec<anyhow::Result<StreamEvent>> = events.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(owned)))
    }

    async fn complete(&self, _req: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        Ok(CompletionResponse { id: "mock-response".into(), output: Vec::new() })
    }

    async fn generate_title(
        &self,
        _model: &str,
        _user: &str,
        _assistant: &str,
    ) -> anyhow::Result<String> {
        Ok(self.title.clone())
    }
}
