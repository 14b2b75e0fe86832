// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod agent_tools;
pub mod fetch_url;
pub mod fs_tools;
pub mod memory;
pub mod notify;
pub mod path_safety;

pub use agent_tools::{CallAgentTool, ScheduleAgentRunTool};
pub use fetch_url::FetchUrlTool;
pub use fs_tools::{FsCreateTool, FsInsertTool, FsStrReplaceTool, FsViewTool, FS_TOOL_NAMES};
pub use memory::{MemoryReadTool, MemoryWriteTool, MEMORY_TOOL_NAMES};
pub use notify::NotifyTool;
