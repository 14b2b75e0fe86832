// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid stored json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("trigger not found: {0}")]
    TriggerNotFound(String),
    #[error("notification channel not found: {0}")]
    ChannelNotFound(String),
    #[error("filesystem root not found: {0}")]
    RootNotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
