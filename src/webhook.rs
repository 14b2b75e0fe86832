// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `POST /webhooks/trigger` (spec §6): the one HTTP surface this subsystem
//! exposes. Runs an agent on a prompt synchronously and returns its final
//! text, mirroring `sven-gateway`'s axum handler shape minus auth/TLS (spec
//! Non-goals exclude auth).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};

use blippy_runner::Runner;
use blippy_store::{Store, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub runner: Arc<Runner>,
}

#[derive(Debug, Deserialize)]
struct TriggerRequest {
    agent_id: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    conversation_id: String,
    response: String,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/webhooks/trigger", post(trigger)).with_state(state)
}

async fn trigger(State(state): State<AppState>, body: axum::body::Bytes) -> (StatusCode, String) {
    let req: TriggerRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("malformed request body: {e}")),
    };

    if req.agent_id.trim().is_empty() || req.prompt.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "agent_id and prompt must be non-empty".to_string());
    }

    match state.store.get_agent(&req.agent_id) {
        Ok(_) => {}
        Err(StoreError::AgentNotFound(_)) => {
            return (StatusCode::NOT_FOUND, format!("agent not found: {}", req.agent_id));
        }
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    match state.runner.run(&req.agent_id, req.prompt, 0, None, None).await {
        Ok((conversation_id, response)) => {
            let body = serde_json::to_string(&TriggerResponse { conversation_id, response })
                .unwrap_or_else(|_| "{}".to_string());
            (StatusCode::OK, body)
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
