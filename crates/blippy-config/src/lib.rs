// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Environment-based process configuration (spec §6 "Environment
//! configuration"). Unlike the teacher's layered YAML config, this
//! subsystem's external surface is five environment variables — `clap`'s
//! `env` feature reads them directly, matching the teacher's reliance on
//! `clap` for all config parsing rather than a hand-rolled `env::var` chain.

use clap::Parser;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("OPENROUTER_API_KEY is required")]
    MissingApiKey,
}

/// Process configuration, parsed from environment variables only (spec §6).
#[derive(Parser, Debug, Clone)]
#[command(name = "blippy", about = "Agentic loop subsystem")]
pub struct Config {
    /// SQLite database path.
    #[arg(long, env = "DATABASE_PATH", default_value = "./blippy.db")]
    pub database_path: String,

    /// HTTP port for the webhook endpoint.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Default model name used when an agent has no model set and no
    /// override is supplied.
    #[arg(long, env = "MODEL", default_value = "openai/gpt-4o-mini")]
    pub model: String,

    /// OpenRouter API key. Required; the process refuses to start without it.
    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub openrouter_api_key: Option<String>,

    /// Enables the bash/sandbox tool when present (spec §6; no bash tool is
    /// registered by this subsystem — see DESIGN.md).
    #[arg(long, env = "SPRITES_API_KEY")]
    pub sprites_api_key: Option<String>,
}

impl Config {
    /// Parse from the process environment and validate required fields.
    /// Matches spec §6: the process fails to start without
    /// `OPENROUTER_API_KEY`.
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Config::parse();
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.openrouter_api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }

    pub fn api_key(&self) -> &str {
        self.openrouter_api_key.as_deref().unwrap_or_default()
    }

    pub fn bash_tool_enabled(&self) -> bool {
        self.sprites_api_key.is_some()
    }
}
