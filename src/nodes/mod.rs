// SPDX-License-Identifier: MIT

//! Builtin node executors and their provider
//!
//! External modules supply additional executors through their own
//! `ExecutorProvider`; this is the set the engine ships with.

pub mod chat;
pub mod condition;
pub mod delay;
pub mod llm;
pub mod repeater;

pub use chat::{ChatInputExecutor, ChatOutputExecutor};
pub use condition::ConditionExecutor;
pub use delay::DelayExecutor;
pub use llm::{LlmBridge, LlmExecutor};
pub use repeater::RepeaterExecutor;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::executor::{ExecutorProvider, NodeConfig, NodeExecutor};
use crate::engine::settings::EngineSettings;

/// Resolves the builtin node type ids
pub struct BuiltinProvider {
    settings: Arc<EngineSettings>,
}

impl BuiltinProvider {
    pub fn new(settings: Arc<EngineSettings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ExecutorProvider for BuiltinProvider {
    async fn resolve(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        match node_type {
            "chat_input" => Some(Arc::new(ChatInputExecutor)),
            "chat_output" => Some(Arc::new(ChatOutputExecutor)),
            "condition" => Some(Arc::new(ConditionExecutor)),
            "delay" => Some(Arc::new(DelayExecutor)),
            "repeater" => Some(Arc::new(RepeaterExecutor)),
            "llm" => match LlmExecutor::new(Arc::clone(&self.settings)) {
                Ok(executor) => Some(Arc::new(executor)),
                Err(e) => {
                    log::error!("Could not construct LLM executor: {}", e);
                    None
                }
            },
            _ => None,
        }
    }
}

pub(crate) fn config_str(config: &NodeConfig, key: &str, default: &str) -> String {
    config
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

pub(crate) fn config_f64(config: &NodeConfig, key: &str, default: f64) -> f64 {
    config.get(key).and_then(Value::as_f64).unwrap_or(default)
}

pub(crate) fn config_u64(config: &NodeConfig, key: &str, default: u64) -> u64 {
    config.get(key).and_then(Value::as_u64).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_builtin_types() {
        let provider = BuiltinProvider::new(Arc::new(EngineSettings::default()));

        for node_type in ["chat_input", "chat_output", "condition", "delay", "repeater", "llm"] {
            assert!(
                provider.resolve(node_type).await.is_some(),
                "missing builtin '{}'",
                node_type
            );
        }
        assert!(provider.resolve("unknown").await.is_none());
    }
}
