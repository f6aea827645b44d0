// SPDX-License-Identifier: MIT

//! Flow definitions, persistence and graph analysis

pub mod analyzer;
pub mod loader;
pub mod store;
pub mod types;

pub use analyzer::{analyze, ExecutionPlan};
pub use loader::FlowLoader;
pub use store::{FlowStore, StoredFlow, FLOWS_FILE};
pub use types::{EdgeDefinition, FlowDefinition, NodeDefinition};
