// SPDX-License-Identifier: MIT

//! Conditional gate: passes the context through when a field matches,
//! stops the branch otherwise

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::Value;

use crate::engine::context::Context;
use crate::engine::error::NodeError;
use crate::engine::executor::{NodeConfig, NodeExecutor};

use super::config_str;

pub struct ConditionExecutor;

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    async fn receive(
        &self,
        input: Context,
        config: &NodeConfig,
    ) -> Result<Option<Context>, NodeError> {
        let target_field = config_str(config, "target_field", "content");
        let operator = config_str(config, "operator", "contains");
        let value = config_str(config, "value", "");

        let mut checked = input.get(&target_field).cloned();

        // For the message history, check the latest entry's content
        if target_field == "messages" {
            checked = match checked.as_ref().and_then(Value::as_array) {
                Some(messages) => messages
                    .last()
                    .and_then(|m| m.get("content"))
                    .cloned()
                    .or(Some(Value::String(String::new()))),
                None => checked,
            };
        }

        // LLM output nests the content under choices
        if target_field == "content" && is_blank(checked.as_ref()) {
            if let Some(choices) = input.get("choices") {
                checked = choices
                    .get(0)
                    .and_then(|c| c.get("message"))
                    .and_then(|m| m.get("content"))
                    .cloned();
            }
        }

        let checked = checked.unwrap_or(Value::Null);
        let haystack = value_to_string(&checked);

        let matched = match operator.as_str() {
            "contains" => haystack.to_lowercase().contains(&value.to_lowercase()),
            "equals" => haystack.to_lowercase() == value.to_lowercase(),
            "not_equals" => haystack.to_lowercase() != value.to_lowercase(),
            "regex" => RegexBuilder::new(&value)
                .case_insensitive(true)
                .build()
                .map(|re| re.is_match(&haystack))
                .unwrap_or(false),
            "exists" => is_truthy(&checked),
            other => {
                log::warn!("Unknown condition operator '{}'; branch stopped", other);
                false
            }
        };

        if matched {
            Ok(Some(input))
        } else {
            Ok(None)
        }
    }

    async fn send(&self, processed: Context) -> Result<Context, NodeError> {
        Ok(processed)
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None => true,
        Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(entries: Value) -> NodeConfig {
        match entries {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    async fn check(input: Value, cfg: Value) -> Option<Context> {
        ConditionExecutor
            .receive(Context::from_value(input), &config(cfg))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_contains_match_passes_through() {
        let result = check(
            json!({"content": "Hello World"}),
            json!({"operator": "contains", "value": "world"}),
        )
        .await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_contains_miss_stops_branch() {
        let result = check(
            json!({"content": "Hello"}),
            json!({"operator": "contains", "value": "absent"}),
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_equals_is_case_insensitive() {
        let result = check(
            json!({"content": "YES"}),
            json!({"operator": "equals", "value": "yes"}),
        )
        .await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_not_equals() {
        let result = check(
            json!({"content": "no"}),
            json!({"operator": "not_equals", "value": "yes"}),
        )
        .await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_regex_operator() {
        let result = check(
            json!({"content": "order #1234"}),
            json!({"operator": "regex", "value": r"#\d+"}),
        )
        .await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_invalid_regex_stops_branch() {
        let result = check(
            json!({"content": "anything"}),
            json!({"operator": "regex", "value": "("}),
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_exists_on_missing_field() {
        let result = check(
            json!({"other": 1}),
            json!({"target_field": "content", "operator": "exists"}),
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_exists_on_empty_list_is_false() {
        let result = check(
            json!({"items": []}),
            json!({"target_field": "items", "operator": "exists"}),
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_messages_checks_last_entry() {
        let input = json!({"messages": [
            {"role": "user", "content": "first"},
            {"role": "user", "content": "run the report"}
        ]});
        let result = check(
            input,
            json!({"target_field": "messages", "operator": "contains", "value": "report"}),
        )
        .await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_falls_back_to_llm_choices() {
        let input = json!({"choices": [
            {"message": {"role": "assistant", "content": "APPROVED"}}
        ]});
        let result = check(
            input,
            json!({"operator": "contains", "value": "approved"}),
        )
        .await;
        assert!(result.is_some());
    }
}
