// SPDX-License-Identifier: MIT

//! Node executor capability and process-wide resolution cache
//!
//! A node type id maps to an executor supplied by an external provider. The
//! registry caches resolutions (including failed ones) for the lifetime of
//! the process; the module layer invalidates entries after a reload, and the
//! swap happens under the write lock so no run observes a half-updated map.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::context::Context;
use super::error::NodeError;

/// Configuration handed to an executor: the node's config mapping plus the
/// engine-stamped `_flow_id` / `_node_id` entries.
pub type NodeConfig = Map<String, Value>;

/// The two-operation step capability implemented by node modules
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Consume the inbound context. `Ok(None)` stops this branch: no
    /// successors fire and the run continues elsewhere.
    async fn receive(
        &self,
        input: Context,
        config: &NodeConfig,
    ) -> Result<Option<Context>, NodeError>;

    /// Produce the context handed to downstream edges.
    async fn send(&self, processed: Context) -> Result<Context, NodeError>;
}

/// Maps a node type id to an executor. Implemented by the module layer;
/// `None` marks the type as unresolved.
#[async_trait]
pub trait ExecutorProvider: Send + Sync {
    async fn resolve(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>>;
}

/// Process-wide executor cache
pub struct ExecutorRegistry {
    provider: Arc<dyn ExecutorProvider>,
    cache: RwLock<HashMap<String, Option<Arc<dyn NodeExecutor>>>>,
}

impl ExecutorRegistry {
    pub fn new(provider: Arc<dyn ExecutorProvider>) -> Self {
        Self {
            provider,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a node type, consulting the provider on a cache miss.
    /// Negative results are cached too, so a missing module is probed once.
    pub async fn resolve(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(node_type) {
                return cached.clone();
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have resolved it while we waited for the lock
        if let Some(cached) = cache.get(node_type) {
            return cached.clone();
        }
        let resolved = self.provider.resolve(node_type).await;
        cache.insert(node_type.to_string(), resolved.clone());
        resolved
    }

    /// Drop one cached binding so the next run re-resolves it.
    pub async fn invalidate(&self, node_type: &str) {
        self.cache.write().await.remove(node_type);
    }

    /// Drop every cached binding (module reload).
    pub async fn invalidate_all(&self) {
        self.cache.write().await.clear();
    }
}
