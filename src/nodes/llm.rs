// SPDX-License-Identifier: MIT

//! Chat-completion step backed by an OpenAI-compatible API
//!
//! Parameter precedence is node config, then inbound payload, then the
//! engine settings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::engine::context::Context;
use crate::engine::error::NodeError;
use crate::engine::executor::{NodeConfig, NodeExecutor};
use crate::engine::settings::EngineSettings;

/// Thin HTTP client for the completion API
pub struct LlmBridge {
    base_url: String,
    client: reqwest::Client,
}

impl LlmBridge {
    pub fn new(base_url: impl Into<String>) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub async fn chat_completion(
        &self,
        messages: &[Value],
        model: &str,
        temperature: f64,
        max_tokens: u64,
    ) -> Result<Value, NodeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": false,
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Probe the API for available models (used by the status endpoint).
    pub async fn models(&self) -> Result<Value, NodeError> {
        let url = format!("{}/models", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

pub struct LlmExecutor {
    bridge: LlmBridge,
    settings: Arc<EngineSettings>,
}

impl LlmExecutor {
    pub fn new(settings: Arc<EngineSettings>) -> Result<Self, NodeError> {
        let bridge = LlmBridge::new(settings.llm_api_url.clone())?;
        Ok(Self { bridge, settings })
    }
}

#[async_trait]
impl NodeExecutor for LlmExecutor {
    async fn receive(
        &self,
        input: Context,
        config: &NodeConfig,
    ) -> Result<Option<Context>, NodeError> {
        let (model, temperature, max_tokens) = resolve_params(config, &input, &self.settings);
        let messages = input.messages().cloned().unwrap_or_default();

        let response = self
            .bridge
            .chat_completion(&messages, &model, temperature, max_tokens)
            .await?;
        Ok(Some(Context::from_value(response)))
    }

    async fn send(&self, processed: Context) -> Result<Context, NodeError> {
        Ok(processed)
    }
}

fn resolve_params(
    config: &NodeConfig,
    input: &Context,
    settings: &EngineSettings,
) -> (String, f64, u64) {
    let pick = |key: &str| config.get(key).or_else(|| input.get(key)).cloned();

    let model = pick("model")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| settings.default_model.clone());
    let temperature = pick("temperature")
        .and_then(|v| v.as_f64())
        .unwrap_or(settings.temperature);
    let max_tokens = pick("max_tokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(settings.max_tokens);

    (model, temperature, max_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn config(entries: Value) -> NodeConfig {
        match entries {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_params_fall_back_to_settings() {
        let settings = EngineSettings::default();
        let (model, temperature, max_tokens) =
            resolve_params(&Map::new(), &Context::new(), &settings);

        assert_eq!(model, settings.default_model);
        assert_eq!(temperature, settings.temperature);
        assert_eq!(max_tokens, settings.max_tokens);
    }

    #[test]
    fn test_input_overrides_settings() {
        let settings = EngineSettings::default();
        let input = Context::from_value(json!({"model": "from-input", "temperature": 0.1}));
        let (model, temperature, _) = resolve_params(&Map::new(), &input, &settings);

        assert_eq!(model, "from-input");
        assert_eq!(temperature, 0.1);
    }

    #[test]
    fn test_config_overrides_input_and_settings() {
        let settings = EngineSettings::default();
        let input = Context::from_value(json!({"model": "from-input"}));
        let cfg = config(json!({"model": "from-config", "max_tokens": 64}));
        let (model, _, max_tokens) = resolve_params(&cfg, &input, &settings);

        assert_eq!(model, "from-config");
        assert_eq!(max_tokens, 64);
    }
}
