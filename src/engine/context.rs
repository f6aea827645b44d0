// SPDX-License-Identifier: MIT

//! Execution context threaded through one run
//!
//! The context is a JSON object owned by exactly one run. A handful of
//! engine-reserved keys carry routing and repeat directives between a node
//! and the scheduler; they are stripped before the payload propagates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Conversation history; preserved across nodes unless a node replaces it.
pub const MESSAGES_KEY: &str = "messages";
/// Flow id, stamped by the runner.
pub const FLOW_ID_KEY: &str = "_flow_id";
/// Routing directive: list of target node ids (or edge labels) to fire.
pub const ROUTE_TARGETS_KEY: &str = "_route_targets";
/// Repeat directive emitted by a repeating node, consumed by the scheduler.
pub const RESCHEDULE_KEY: &str = "_reschedule";
/// Repeat generation counter threaded through background re-runs.
pub const REPEAT_COUNT_KEY: &str = "_repeat_count";
/// Trigger tag used to pick entry nodes; stripped before any node runs.
pub const INPUT_SOURCE_KEY: &str = "_input_source";

/// The mutable payload of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    map: Map<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON value. Objects keep their keys; any other
    /// value is wrapped under `"content"`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self { map },
            other => {
                let mut map = Map::new();
                map.insert("content".to_string(), other);
                Self { map }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.map.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.map.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.map.iter()
    }

    /// The conversation history, if present and a list.
    pub fn messages(&self) -> Option<&Vec<Value>> {
        self.map.get(MESSAGES_KEY).and_then(Value::as_array)
    }

    /// Current repeat generation (0 on a fresh trigger).
    pub fn repeat_count(&self) -> u64 {
        self.map
            .get(REPEAT_COUNT_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Remove and parse the routing directive, if any. Non-string entries
    /// are ignored.
    pub fn take_route_targets(&mut self) -> Option<Vec<String>> {
        let value = self.map.remove(ROUTE_TARGETS_KEY)?;
        match value {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            Value::String(s) => Some(vec![s]),
            _ => None,
        }
    }

    /// Merge another context into this one: last writer wins per key, except
    /// the message history, which is concatenated without duplicates.
    pub fn merge_from(&mut self, other: &Context) {
        for (key, value) in &other.map {
            if key == MESSAGES_KEY {
                if let (Some(Value::Array(existing)), Value::Array(incoming)) =
                    (self.map.get_mut(MESSAGES_KEY), value)
                {
                    for entry in incoming {
                        if !existing.contains(entry) {
                            existing.push(entry.clone());
                        }
                    }
                    continue;
                }
            }
            self.map.insert(key.clone(), value.clone());
        }
    }

    /// Merge with plain last-writer-wins for every key, message history
    /// included (the alternate bridge merge policy).
    pub fn overwrite_from(&mut self, other: &Context) {
        for (key, value) in &other.map {
            self.map.insert(key.clone(), value.clone());
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.map)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.map.clone())
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self { map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Context {
        Context::from_value(value)
    }

    #[test]
    fn test_from_value_wraps_non_objects() {
        let c = ctx(json!("hello"));
        assert_eq!(c.get("content"), Some(&json!("hello")));
    }

    #[test]
    fn test_merge_last_writer_wins() {
        let mut a = ctx(json!({"x": 1, "y": "keep"}));
        let b = ctx(json!({"x": 2}));
        a.merge_from(&b);
        assert_eq!(a.get("x"), Some(&json!(2)));
        assert_eq!(a.get("y"), Some(&json!("keep")));
    }

    #[test]
    fn test_merge_concatenates_messages_without_duplicates() {
        let mut a = ctx(json!({"messages": [
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "hello"}
        ]}));
        let b = ctx(json!({"messages": [
            {"role": "assistant", "content": "hello"},
            {"role": "user", "content": "bye"}
        ]}));
        a.merge_from(&b);
        let messages = a.messages().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2], json!({"role": "user", "content": "bye"}));
    }

    #[test]
    fn test_merge_is_order_stable() {
        let p1 = ctx(json!({"k": "first"}));
        let p2 = ctx(json!({"k": "second"}));

        let mut merged = Context::new();
        merged.merge_from(&p1);
        merged.merge_from(&p2);
        assert_eq!(merged.get("k"), Some(&json!("second")));

        // Same inputs, same order, same result
        let mut again = Context::new();
        again.merge_from(&p1);
        again.merge_from(&p2);
        assert_eq!(merged, again);
    }

    #[test]
    fn test_overwrite_merge_replaces_messages() {
        let mut a = ctx(json!({"messages": [{"role": "user", "content": "old"}]}));
        let b = ctx(json!({"messages": [{"role": "user", "content": "new"}]}));
        a.overwrite_from(&b);
        assert_eq!(a.messages().map(|m| m.len()), Some(1));
        assert_eq!(a.messages().unwrap()[0]["content"], json!("new"));
    }

    #[test]
    fn test_take_route_targets_strips_key() {
        let mut c = ctx(json!({"_route_targets": ["b", "c"], "data": 1}));
        assert_eq!(
            c.take_route_targets(),
            Some(vec!["b".to_string(), "c".to_string()])
        );
        assert!(!c.contains(ROUTE_TARGETS_KEY));
        assert_eq!(c.get("data"), Some(&json!(1)));
    }

    #[test]
    fn test_take_route_targets_accepts_single_string() {
        let mut c = ctx(json!({"_route_targets": "b"}));
        assert_eq!(c.take_route_targets(), Some(vec!["b".to_string()]));
    }

    #[test]
    fn test_repeat_count_defaults_to_zero() {
        assert_eq!(ctx(json!({})).repeat_count(), 0);
        assert_eq!(ctx(json!({"_repeat_count": 3})).repeat_count(), 3);
    }
}
