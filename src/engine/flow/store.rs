// SPDX-License-Identifier: MIT

//! JSON-file persistence for flow definitions
//!
//! One file holds every stored flow keyed by id. The engine itself never
//! reads this; it is the shape the trigger/editor layer saves and loads.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{EdgeDefinition, FlowDefinition, NodeDefinition};
use crate::engine::error::EngineError;

pub const FLOWS_FILE: &str = "flows.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFlow {
    #[serde(flatten)]
    pub flow: FlowDefinition,
    pub created_at: DateTime<Utc>,
}

pub struct FlowStore {
    path: PathBuf,
    flows: Mutex<HashMap<String, StoredFlow>>,
}

impl FlowStore {
    /// Open a store file, creating an empty one if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let flows = if path.exists() {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str(&content) {
                Ok(flows) => flows,
                Err(e) => {
                    log::warn!("Could not decode flow store {:?}: {}", path, e);
                    HashMap::new()
                }
            }
        } else {
            fs::write(&path, "{}")?;
            HashMap::new()
        };

        Ok(Self {
            path,
            flows: Mutex::new(flows),
        })
    }

    fn persist(&self, flows: &HashMap<String, StoredFlow>) -> Result<(), EngineError> {
        let content = serde_json::to_string_pretty(flows)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Save a flow, generating an id when none is given. Returns the stored
    /// snapshot.
    pub fn save_flow(
        &self,
        name: &str,
        nodes: Vec<NodeDefinition>,
        edges: Vec<EdgeDefinition>,
        flow_id: Option<String>,
    ) -> Result<StoredFlow, EngineError> {
        let id = flow_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let stored = StoredFlow {
            flow: FlowDefinition {
                id: id.clone(),
                name: name.to_string(),
                nodes,
                edges,
            },
            created_at: Utc::now(),
        };

        let mut flows = self.flows.lock().map_err(|_| "flow store lock poisoned")?;
        flows.insert(id, stored.clone());
        self.persist(&flows)?;
        Ok(stored)
    }

    pub fn get(&self, flow_id: &str) -> Option<FlowDefinition> {
        self.flows
            .lock()
            .ok()?
            .get(flow_id)
            .map(|s| s.flow.clone())
    }

    /// All stored flows, newest first.
    pub fn list(&self) -> Vec<StoredFlow> {
        let mut flows: Vec<StoredFlow> = match self.flows.lock() {
            Ok(flows) => flows.values().cloned().collect(),
            Err(_) => return Vec::new(),
        };
        flows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        flows
    }

    pub fn delete(&self, flow_id: &str) -> Result<bool, EngineError> {
        let mut flows = self.flows.lock().map_err(|_| "flow store lock poisoned")?;
        if flows.remove(flow_id).is_some() {
            self.persist(&flows)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeDefinition {
        serde_json::from_str(&format!(r#"{{"id": "{}", "type": "llm"}}"#, id)).unwrap()
    }

    #[test]
    fn test_save_generates_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlowStore::open(dir.path().join("flows.json")).unwrap();

        let stored = store.save_flow("demo", vec![node("a")], vec![], None).unwrap();
        assert!(!stored.flow.id.is_empty());
        assert_eq!(store.get(&stored.flow.id).unwrap().name, "demo");
    }

    #[test]
    fn test_save_with_explicit_id_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlowStore::open(dir.path().join("flows.json")).unwrap();

        store
            .save_flow("v1", vec![node("a")], vec![], Some("fid".to_string()))
            .unwrap();
        store
            .save_flow("v2", vec![node("a"), node("b")], vec![], Some("fid".to_string()))
            .unwrap();

        let flow = store.get("fid").unwrap();
        assert_eq!(flow.name, "v2");
        assert_eq!(flow.nodes.len(), 2);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows.json");

        {
            let store = FlowStore::open(&path).unwrap();
            store
                .save_flow("kept", vec![node("a")], vec![], Some("fid".to_string()))
                .unwrap();
        }

        let reopened = FlowStore::open(&path).unwrap();
        assert_eq!(reopened.get("fid").unwrap().name, "kept");
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlowStore::open(dir.path().join("flows.json")).unwrap();

        store
            .save_flow("gone", vec![], vec![], Some("fid".to_string()))
            .unwrap();
        assert!(store.delete("fid").unwrap());
        assert!(!store.delete("fid").unwrap());
        assert!(store.get("fid").is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlowStore::open(dir.path().join("flows.json")).unwrap();

        store
            .save_flow("first", vec![], vec![], Some("f1".to_string()))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store
            .save_flow("second", vec![], vec![], Some("f2".to_string()))
            .unwrap();

        let list = store.list();
        assert_eq!(list[0].flow.name, "second");
        assert_eq!(list[1].flow.name, "first");
    }
}
