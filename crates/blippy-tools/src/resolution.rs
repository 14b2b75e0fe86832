// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Turn-scoped tool set assembly (spec §4.4.1): combines the static registry,
//! per-agent notification channels, and per-agent filesystem roots into the
//! tool definitions shown to the model plus the dispatch tables the Executor
//! needs for this turn.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use blippy_channels::HttpRequestConfig;
use blippy_store::{Agent, Store};

use crate::builtin::{NotifyTool, FS_TOOL_NAMES};
use crate::context::FsRoot;
use crate::name_encoding::encode_tool_name;
use crate::registry::{ToolDef, ToolRegistry};
use crate::tool::Tool;

/// Everything the Loop needs to run one turn: the tool definitions to hand
/// the model, the per-turn notification tools (not registered globally,
/// since their config is agent-specific), and the `fs_tool_name → [roots]`
/// map placed into the call context.
pub struct ResolvedTools {
    pub defs: Vec<ToolDef>,
    pub dynamic: HashMap<String, Arc<dyn Tool>>,
    pub fs_roots: HashMap<String, Vec<FsRoot>>,
}

/// `Store`'s methods are synchronous (a mutex-guarded rusqlite connection),
/// so resolution itself is synchronous too — callers invoke it from async
/// code without needing to await it.
pub fn build_tool_set(store: &Store, registry: &ToolRegistry, agent: &Agent) -> ResolvedTools {
    // fs tools are gated purely by `enabled_filesystem_roots`, not by
    // `enabled_tools` (spec §4.4.1 point 3, structurally parallel to how
    // notify tools below are gated purely by `enabled_notification_channels`).
    let non_fs_enabled: Vec<String> =
        agent.enabled_tools.iter().filter(|name| !FS_TOOL_NAMES.contains(&name.as_str())).cloned().collect();
    let mut defs = registry.list(&non_fs_enabled);
    let mut dynamic: HashMap<String, Arc<dyn Tool>> = HashMap::new();

    let fs_roots = build_fs_roots(store, agent);
    for (tool_name, roots) in &fs_roots {
        let Some(tool) = registry.get(tool_name) else {
            tracing::warn!(tool_name, "filesystem root enables an unregistered tool, skipping");
            continue;
        };
        let mut def = ToolDef {
            kind: "function",
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
        };
        inject_root_enum(&mut def, roots);
        defs.push(def);
    }

    for channel_id in &agent.enabled_notification_channels {
        let channel = match store.get_notification_channel(channel_id) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(channel_id, error = %e, "skipping unknown notification channel");
                continue;
            }
        };
        if channel.channel_type != "http_request" {
            tracing::warn!(channel_id, kind = %channel.channel_type, "unsupported channel type, skipping");
            continue;
        }
        let config: HttpRequestConfig = match serde_json::from_value(channel.config.clone()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(channel_id, error = %e, "invalid http_request channel config, skipping");
                continue;
            }
        };

        let internal_name = format!("notify:{}", channel.name);
        let encoded_name = encode_tool_name(&internal_name);
        defs.push(ToolDef {
            kind: "function",
            name: encoded_name,
            description: channel.description.clone(),
            parameters: channel.json_schema.clone(),
        });
        dynamic.insert(internal_name.clone(), Arc::new(NotifyTool::new(&channel.name, channel.description, config)));
    }

    ResolvedTools { defs, dynamic, fs_roots }
}

fn build_fs_roots(store: &Store, agent: &Agent) -> HashMap<String, Vec<FsRoot>> {
    let mut map: HashMap<String, Vec<FsRoot>> = HashMap::new();
    for root_cfg in &agent.enabled_filesystem_roots {
        let root = match store.get_filesystem_root(&root_cfg.root_id) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(root_id = %root_cfg.root_id, error = %e, "skipping unknown filesystem root");
                continue;
            }
        };
        let fs_root = FsRoot { name: root.name.clone(), path: PathBuf::from(&root.path) };
        for tool_name in &root_cfg.enabled_tool_names {
            map.entry(tool_name.clone()).or_default().push(fs_root.clone());
        }
    }
    map
}

fn inject_root_enum(def: &mut ToolDef, roots: &[FsRoot]) {
    let names: Vec<String> = roots.iter().map(|r| r.name.clone()).collect();
    if let Some(props) = def.parameters.get_mut("properties") {
        if let Some(root_prop) = props.get_mut("root") {
            if let Some(obj) = root_prop.as_object_mut() {
                obj.insert("enum".to_string(), serde_json::json!(names));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    fn store_with_agent() -> (Store, Agent) {
        let store = Store::open_in_memory().unwrap();
        let agent = store.create_agent("tester", "be helpful", "gpt-test").unwrap();
        (store, agent)
    }

    #[test]
    fn no_channels_or_roots_yields_only_static_defs() {
        let (store, mut agent) = store_with_agent();
        agent.enabled_tools = vec!["fetch_url".to_string()];
        let mut registry = ToolRegistry::new();
        registry.register(StdArc::new(crate::builtin::FetchUrlTool));

        let resolved = build_tool_set(&store, &registry, &agent);
        assert_eq!(resolved.defs.len(), 1);
        assert!(resolved.dynamic.is_empty());
        assert!(resolved.fs_roots.is_empty());
    }

    #[test]
    fn fs_root_enabled_tool_injects_enum_into_schema_without_enabled_tools_listing() {
        let (store, mut agent) = store_with_agent();
        let root = store.create_filesystem_root("proj", "/tmp/proj", "project root").unwrap();
        // Deliberately left out of `enabled_tools`: fs tools are gated by
        // `enabled_filesystem_roots` alone, same as notify tools are gated
        // by `enabled_notification_channels` alone.
        agent.enabled_filesystem_roots =
            vec![blippy_store::FsRootConfig { root_id: root.id.clone(), enabled_tool_names: vec!["fs_view".to_string()] }];

        let mut registry = ToolRegistry::new();
        registry.register(StdArc::new(crate::builtin::FsViewTool));

        let resolved = build_tool_set(&store, &registry, &agent);
        assert_eq!(resolved.fs_roots.get("fs_view").unwrap().len(), 1);
        let def = resolved.defs.iter().find(|d| d.name == "fs_view").unwrap();
        let root_enum = &def.parameters["properties"]["root"]["enum"];
        assert_eq!(root_enum, &serde_json::json!(["proj"]));
    }

    #[test]
    fn fs_tool_listed_in_enabled_tools_without_a_root_is_not_advertised() {
        let (store, mut agent) = store_with_agent();
        // Listing "fs_view" in `enabled_tools` alone (no matching filesystem
        // root) must not surface the tool: it has no root to operate on.
        agent.enabled_tools = vec!["fs_view".to_string()];

        let mut registry = ToolRegistry::new();
        registry.register(StdArc::new(crate::builtin::FsViewTool));

        let resolved = build_tool_set(&store, &registry, &agent);
        assert!(resolved.defs.iter().all(|d| d.name != "fs_view"));
    }
}
