// SPDX-License-Identifier: MIT

//! Process-wide engine settings, persisted as a JSON file
//!
//! Carries the engine tunables (activation ceiling, context propagation)
//! plus the defaults the LLM bridge falls back to.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::EngineError;

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Base URL of an OpenAI-compatible completion API
    pub llm_api_url: String,
    pub default_model: String,
    pub temperature: f64,
    pub max_tokens: u64,
    /// Loop guard ceiling: total node activations per run. 0 disables the guard.
    pub max_node_activations: u32,
    /// Carry the message history forward when a node output drops it
    pub preserve_messages: bool,
    /// Bridge convergence merge policy: concatenate message histories
    /// (deduplicated) instead of last-writer-wins
    pub merge_concat_messages: bool,
    /// Record per-node events in the run trace
    pub debug_mode: bool,
    /// Flow the trigger layer falls back to when none is named
    pub active_flow: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            llm_api_url: "http://localhost:1234/v1".to_string(),
            default_model: "local-model".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            max_node_activations: 1000,
            preserve_messages: true,
            merge_concat_messages: true,
            debug_mode: false,
            active_flow: None,
        }
    }
}

impl EngineSettings {
    /// Load settings from a JSON file. A missing file is created with
    /// defaults; an unreadable one falls back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            let defaults = Self::default();
            if let Err(e) = defaults.save(path) {
                log::warn!("Could not write default settings to {:?}: {}", path, e);
            }
            return defaults;
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Invalid settings file {:?}: {}. Using defaults.", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Could not read {:?}: {}. Using defaults.", path, e);
                Self::default()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
