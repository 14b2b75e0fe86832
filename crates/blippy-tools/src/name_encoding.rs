// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Transport-safe tool name encoding (spec §4.4.2). Providers require tool
//! names to match `[A-Za-z0-9_-]`; internal names may contain `:`
//! (notification tools are named `notify:<channel_name>`).

/// `:` → `__`. Applied when building outgoing tool definitions.
pub fn encode_tool_name(name: &str) -> String {
    name.replace(':', "__")
}

/// `__` → `:`. Applied to incoming function-call names before dispatch and
/// before emission on the event bus.
pub fn decode_tool_name(name: &str) -> String {
    name.replace("__", ":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_colon_to_double_underscore() {
        assert_eq!(encode_tool_name("notify:slack"), "notify__slack");
    }

    #[test]
    fn decodes_double_underscore_to_colon() {
        assert_eq!(decode_tool_name("notify__slack"), "notify:slack");
    }

    #[test]
    fn round_trip_is_identity_for_static_tool_names() {
        for name in ["fetch_url", "fs_view", "fs_str_replace", "call_agent"] {
            assert_eq!(decode_tool_name(&encode_tool_name(name)), name);
        }
    }

    #[test]
    fn round_trip_is_identity_for_notification_tool_names() {
        for name in ["notify:slack", "notify:pagerduty", "notify:a:b"] {
            assert_eq!(decode_tool_name(&encode_tool_name(name)), name);
        }
    }
}
