// SPDX-License-Identifier: MIT

//! Flow definition loading from JSON and YAML files

use std::fs;
use std::path::Path;

use super::types::FlowDefinition;
use crate::engine::error::EngineError;

/// Loads flow definitions from disk
pub struct FlowLoader;

impl FlowLoader {
    /// Load a flow definition from a file; the format is picked by
    /// extension (`.yaml`/`.yml` is YAML, anything else JSON).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<FlowDefinition, EngineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        if is_yaml {
            Self::parse_yaml(&content)
        } else {
            Self::parse_json(&content)
        }
    }

    pub fn parse_json(content: &str) -> Result<FlowDefinition, EngineError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn parse_yaml(content: &str) -> Result<FlowDefinition, EngineError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_flow() {
        let json = r#"{
            "name": "chat",
            "nodes": [{"id": "in", "type": "chat_input"}],
            "edges": []
        }"#;
        let flow = FlowLoader::parse_json(json).unwrap();
        assert_eq!(flow.name, "chat");
        assert_eq!(flow.nodes.len(), 1);
    }

    #[test]
    fn test_parse_yaml_flow() {
        let yaml = r#"
name: chat
nodes:
  - id: in
    type: chat_input
  - id: model
    type: llm
    config:
      temperature: 0.2
edges:
  - from: in
    to: model
"#;
        let flow = FlowLoader::parse_yaml(yaml).unwrap();
        assert_eq!(flow.nodes.len(), 2);
        assert_eq!(flow.edges.len(), 1);
        assert_eq!(
            flow.node("model").unwrap().config.get("temperature"),
            Some(&serde_json::json!(0.2))
        );
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(FlowLoader::parse_json("{nope").is_err());
    }
}
