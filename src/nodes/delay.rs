// SPDX-License-Identifier: MIT

//! Timed delay: suspends the branch for a configured number of seconds

use std::time::Duration;

use async_trait::async_trait;

use crate::engine::context::Context;
use crate::engine::error::NodeError;
use crate::engine::executor::{NodeConfig, NodeExecutor};

use super::config_f64;

pub struct DelayExecutor;

#[async_trait]
impl NodeExecutor for DelayExecutor {
    async fn receive(
        &self,
        input: Context,
        config: &NodeConfig,
    ) -> Result<Option<Context>, NodeError> {
        let seconds = config_f64(config, "seconds", 1.0).max(0.0);
        if seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        }
        Ok(Some(input))
    }

    async fn send(&self, processed: Context) -> Result<Context, NodeError> {
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    fn config(entries: serde_json::Value) -> NodeConfig {
        match entries {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_waits_for_configured_delay() {
        let start = Instant::now();
        let result = DelayExecutor
            .receive(Context::new(), &config(json!({"seconds": 0.05})))
            .await
            .unwrap();

        assert!(result.is_some());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_negative_delay_is_clamped() {
        let start = Instant::now();
        DelayExecutor
            .receive(Context::new(), &config(json!({"seconds": -5})))
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_passes_context_through() {
        let input = Context::from_value(json!({"data": "kept"}));
        let result = DelayExecutor
            .receive(input, &config(json!({"seconds": 0})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.get("data"), Some(&json!("kept")));
    }
}
