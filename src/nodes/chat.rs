// SPDX-License-Identifier: MIT

//! Chat entry and exit nodes
//!
//! `chat_input` anchors a flow triggered from a conversation; `chat_output`
//! reduces whatever reached the end of the graph to a plain reply.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::engine::context::Context;
use crate::engine::error::NodeError;
use crate::engine::executor::{NodeConfig, NodeExecutor};

pub struct ChatInputExecutor;

#[async_trait]
impl NodeExecutor for ChatInputExecutor {
    async fn receive(
        &self,
        input: Context,
        _config: &NodeConfig,
    ) -> Result<Option<Context>, NodeError> {
        Ok(Some(input))
    }

    async fn send(&self, processed: Context) -> Result<Context, NodeError> {
        if processed.messages().is_none() {
            return Err(NodeError::Other(
                "Flow started without 'messages'; the chat input node requires a conversation"
                    .to_string(),
            ));
        }
        Ok(processed)
    }
}

pub struct ChatOutputExecutor;

#[async_trait]
impl NodeExecutor for ChatOutputExecutor {
    async fn receive(
        &self,
        input: Context,
        _config: &NodeConfig,
    ) -> Result<Option<Context>, NodeError> {
        if input.contains("error") {
            return Ok(Some(input));
        }

        // Direct content from a simple upstream node
        if let Some(content) = input.get("content") {
            return Ok(Some(Context::from_value(json!({"content": content}))));
        }

        // OpenAI-style completion
        if let Some(content) = input
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
        {
            if !content.is_empty() {
                return Ok(Some(Context::from_value(json!({"content": content}))));
            }
        }

        // Echo the last message if nothing else produced a reply
        if let Some(content) = input
            .messages()
            .and_then(|m| m.last())
            .and_then(|m| m.get("content"))
        {
            return Ok(Some(Context::from_value(json!({"content": content}))));
        }

        Ok(Some(Context::from_value(json!({
            "content": "Flow finished but produced no valid response."
        }))))
    }

    async fn send(&self, processed: Context) -> Result<Context, NodeError> {
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn empty_config() -> NodeConfig {
        Map::new()
    }

    #[tokio::test]
    async fn test_chat_input_requires_messages() {
        let no_messages = Context::from_value(json!({"q": 1}));
        let result = ChatInputExecutor.send(no_messages).await;
        assert!(result.is_err());

        let with_messages =
            Context::from_value(json!({"messages": [{"role": "user", "content": "hi"}]}));
        assert!(ChatInputExecutor.send(with_messages).await.is_ok());
    }

    #[tokio::test]
    async fn test_chat_output_extracts_llm_reply() {
        let input = Context::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "the answer"}}]
        }));
        let out = ChatOutputExecutor
            .receive(input, &empty_config())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.get("content"), Some(&json!("the answer")));
    }

    #[tokio::test]
    async fn test_chat_output_prefers_direct_content() {
        let input = Context::from_value(json!({"content": "plain"}));
        let out = ChatOutputExecutor
            .receive(input, &empty_config())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.get("content"), Some(&json!("plain")));
    }

    #[tokio::test]
    async fn test_chat_output_echoes_last_message_as_fallback() {
        let input = Context::from_value(json!({
            "messages": [{"role": "user", "content": "echo me"}]
        }));
        let out = ChatOutputExecutor
            .receive(input, &empty_config())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.get("content"), Some(&json!("echo me")));
    }

    #[tokio::test]
    async fn test_chat_output_passes_errors_through() {
        let input = Context::from_value(json!({"error": "upstream failed"}));
        let out = ChatOutputExecutor
            .receive(input, &empty_config())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.get("error"), Some(&json!("upstream failed")));
    }
}
