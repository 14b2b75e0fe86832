// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent_caller::AgentCaller;

/// A resolved, named filesystem jail root.
#[derive(Debug, Clone)]
pub struct FsRoot {
    pub name: String,
    pub path: PathBuf,
}

/// Ambient state carried explicitly through the call chain for one turn
/// (spec §9 "Ambient context"): conversation id, agent id, recursion depth,
/// forwarded env var names, and the per-fs-tool root map. Never stored in
/// globals or task-locals — passed by reference into every tool execution.
#[derive(Clone)]
pub struct CallContext {
    pub conversation_id: String,
    pub agent_id: String,
    pub depth: u32,
    pub forwarded_env: Vec<String>,
    /// `fs_tool_name → [roots]`, built by tool resolution (§4.4.1).
    pub fs_roots: HashMap<String, Vec<FsRoot>>,
    /// Breaks the Executor↔Runner cycle (spec §9): the `call_agent` tool
    /// dispatches through this narrow interface instead of depending on the
    /// Runner directly.
    pub agent_caller: Option<Arc<dyn AgentCaller>>,
}

impl CallContext {
    pub fn new(conversation_id: impl Into<String>, agent_id: impl Into<String>, depth: u32) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            agent_id: agent_id.into(),
            depth,
            forwarded_env: Vec::new(),
            fs_roots: HashMap::new(),
            agent_caller: None,
        }
    }

    pub fn with_agent_caller(mut self, caller: Arc<dyn AgentCaller>) -> Self {
        self.agent_caller = Some(caller);
        self
    }

    pub fn with_fs_roots(mut self, fs_roots: HashMap<String, Vec<FsRoot>>) -> Self {
        self.fs_roots = fs_roots;
        self
    }
}
