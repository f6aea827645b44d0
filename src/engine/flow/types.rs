// SPDX-License-Identifier: MIT

//! Flow definition types
//!
//! The shape the engine consumes from the persistence/editor layer: a set of
//! typed nodes and the directed edges connecting them. Definitions are
//! immutable once a run starts; edits produce a new snapshot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A declared processing step in a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique node id within the flow
    pub id: String,
    /// Display name (falls back to the id)
    #[serde(default)]
    pub name: String,
    /// Capability type id resolved through the executor registry
    #[serde(rename = "type")]
    pub node_type: String,
    /// Free-form configuration handed to the executor
    #[serde(default)]
    pub config: Map<String, Value>,
    /// At most one node of this type per flow
    #[serde(default)]
    pub singleton: bool,
    /// Whether the editor exposes the config mapping
    #[serde(default = "default_true")]
    pub configurable: bool,
}

impl NodeDefinition {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A directed connection enabling context propagation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    /// Optional routing label matched against a node's routing directive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One flow: nodes plus edges. May contain cycles; the analyzer handles
/// them rather than rejecting the graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

impl FlowDefinition {
    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing edges of a node, in declaration order.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a EdgeDefinition> + 'a {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// Incoming edges of a node, in declaration order.
    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a EdgeDefinition> + 'a {
        self.edges.iter().filter(move |e| e.to == id)
    }

    /// Nodes of a given type id, in declaration order.
    pub fn nodes_of_type<'a>(&'a self, node_type: &'a str) -> impl Iterator<Item = &'a NodeDefinition> {
        self.nodes.iter().filter(move |n| n.node_type == node_type)
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_node() {
        let json = r#"{"id": "a", "type": "llm"}"#;
        let node: NodeDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(node.id, "a");
        assert_eq!(node.node_type, "llm");
        assert!(node.config.is_empty());
        assert!(!node.singleton);
        assert!(node.configurable);
        assert_eq!(node.display_name(), "a");
    }

    #[test]
    fn test_deserialize_flow_with_edges() {
        let json = r#"{
            "id": "f1",
            "name": "demo",
            "nodes": [
                {"id": "a", "type": "chat_input"},
                {"id": "b", "type": "llm"}
            ],
            "edges": [
                {"from": "a", "to": "b", "label": "ok"}
            ]
        }"#;
        let flow: FlowDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(flow.nodes.len(), 2);
        assert_eq!(flow.outgoing("a").count(), 1);
        assert_eq!(flow.incoming("b").next().unwrap().label.as_deref(), Some("ok"));
    }

    #[test]
    fn test_node_lookup() {
        let flow: FlowDefinition = serde_json::from_str(
            r#"{"nodes": [{"id": "x", "type": "delay"}], "edges": []}"#,
        )
        .unwrap();
        assert!(flow.node("x").is_some());
        assert!(flow.node("y").is_none());
    }
}
