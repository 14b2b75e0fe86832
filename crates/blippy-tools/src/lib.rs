// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod agent_caller;
pub mod builtin;
pub mod context;
pub mod executor;
pub mod name_encoding;
pub mod registry;
pub mod resolution;
pub mod tool;

pub use agent_caller::AgentCaller;
pub use context::{CallContext, FsRoot};
pub use executor::{process_output, ToolResultNotice};
pub use name_encoding::{decode_tool_name, encode_tool_name};
pub use registry::{RegistryError, ToolDef, ToolRegistry};
pub use resolution::{build_tool_set, ResolvedTools};
pub use tool::{Tool, ToolCall, ToolOutput};
