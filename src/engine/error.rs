// SPDX-License-Identifier: MIT

//! Typed error handling for the flow engine
//!
//! Graph errors are reported before any node executes; node errors abort
//! only the run they occur in.

use thiserror::Error;

/// Top-level error type for the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Flow lookup failed in the store
    #[error("Flow '{0}' not found")]
    FlowNotFound(String),

    /// Requested start node does not exist in the flow
    #[error("Start node '{0}' not found in flow")]
    StartNodeNotFound(String),

    /// Structural problems detected before execution
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// A node executor failed during a direct (single-node) invocation
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    /// I/O errors (store and settings files)
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Graph-invalid conditions: the run never starts
#[derive(Debug, Error)]
pub enum GraphError {
    /// An edge references a node id that is not declared
    #[error("Edge '{from}' -> '{to}' references unknown node '{missing}'")]
    UnknownEdgeEndpoint {
        from: String,
        to: String,
        missing: String,
    },

    /// Two nodes share the same id
    #[error("Duplicate node id '{0}'")]
    DuplicateNodeId(String),

    /// A singleton node type is declared more than once
    #[error("Singleton node type '{node_type}' declared {count} times")]
    DuplicateSingleton { node_type: String, count: usize },
}

/// Errors raised by node executors during receive/send
#[derive(Debug, Error)]
pub enum NodeError {
    /// Node configuration is missing or malformed
    #[error("Invalid node config: {0}")]
    InvalidConfig(String),

    /// HTTP request errors (LLM bridge)
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// JSON errors inside an executor
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic executor failure
    #[error("{0}")]
    Other(String),
}

impl From<&str> for NodeError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for NodeError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
