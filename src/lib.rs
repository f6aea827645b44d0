// SPDX-License-Identifier: MIT

//! NeuroCore flow engine
//!
//! A workflow execution engine: flows are graphs of typed nodes connected
//! by directed edges; the engine computes a deterministic execution order,
//! dispatches each node to a pluggable executor, applies conditional
//! routing, bounds runaway cycles, and tracks background re-triggering
//! runs.

pub mod engine;
pub mod nodes;
pub mod server;
