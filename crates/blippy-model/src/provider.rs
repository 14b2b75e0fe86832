// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::types::{CompletionRequest, CompletionResponse, StreamEvent};

/// A boxed, owned stream of completion events.
pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamEvent>> + Send>>;

/// The narrow LLM surface the core consumes (spec §6): a streaming request,
/// a non-streaming request, and a title-generation helper. Wire-format
/// completeness beyond this is explicitly out of scope.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    async fn stream(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<CompletionResponse>;

    /// Produce a 3-6 word conversation title. Failures are the caller's to
    /// swallow (finalization step 4 treats this as non-fatal).
    async fn generate_title(
        &self,
        model: &str,
        user: &str,
        assistant: &str,
    ) -> anyhow::Result<String>;
}
