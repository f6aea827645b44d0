// SPDX-License-Identifier: MIT

//! Graph analysis: validation, execution order, sibling grouping
//!
//! Produces a deterministic execution plan with Kahn's algorithm. Cycles are
//! not rejected: when the reduction stalls, the remaining node with the
//! lowest current in-degree (ties by declaration order) is force-emitted and
//! becomes a starting point, which is what makes self-retriggering patterns
//! schedulable.

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use serde::Serialize;

use super::types::FlowDefinition;
use crate::engine::error::GraphError;

/// Structural metadata for one flow, computed before any node executes
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    /// Every node exactly once, topological where possible
    pub order: Vec<String>,
    /// In-degree per node (self-edges and parallel duplicates not counted)
    pub in_degree: HashMap<String, usize>,
    /// Each member of a parallel sibling set mapped to its full group,
    /// in declaration order
    pub sibling_groups: HashMap<String, Vec<String>>,
    /// Nodes force-emitted to break a cycle; treated as entry points
    pub cycle_breaks: Vec<String>,
}

impl ExecutionPlan {
    /// Nodes that receive the initial context: true sources plus cycle
    /// break points, in plan order.
    pub fn entry_nodes(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| {
                self.in_degree.get(id.as_str()).copied().unwrap_or(0) == 0
                    || self.cycle_breaks.contains(id)
            })
            .map(|s| s.as_str())
            .collect()
    }
}

/// Validate a flow and compute its execution plan.
pub fn analyze(flow: &FlowDefinition) -> Result<ExecutionPlan, GraphError> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, node) in flow.nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(GraphError::DuplicateNodeId(node.id.clone()));
        }
    }

    check_singletons(flow)?;

    let n = flow.nodes.len();
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree: Vec<usize> = vec![0; n];

    for edge in &flow.edges {
        let from = *index.get(edge.from.as_str()).ok_or_else(|| {
            GraphError::UnknownEdgeEndpoint {
                from: edge.from.clone(),
                to: edge.to.clone(),
                missing: edge.from.clone(),
            }
        })?;
        let to = *index.get(edge.to.as_str()).ok_or_else(|| {
            GraphError::UnknownEdgeEndpoint {
                from: edge.from.clone(),
                to: edge.to.clone(),
                missing: edge.to.clone(),
            }
        })?;

        // Self-edges stay routable at runtime but do not constrain the order
        if from == to || adj[from].contains(&to) {
            continue;
        }
        adj[from].push(to);
        in_degree[to] += 1;
    }

    let original_in_degree = in_degree.clone();
    let (order_idx, cycle_break_idx) = reduce(&adj, in_degree);

    let sibling_groups = group_siblings(flow, &adj, &index);

    Ok(ExecutionPlan {
        order: order_idx
            .iter()
            .map(|&i| flow.nodes[i].id.clone())
            .collect(),
        in_degree: flow
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), original_in_degree[i]))
            .collect(),
        sibling_groups,
        cycle_breaks: cycle_break_idx
            .iter()
            .map(|&i| flow.nodes[i].id.clone())
            .collect(),
    })
}

fn check_singletons(flow: &FlowDefinition) -> Result<(), GraphError> {
    let mut counts: HashMap<&str, (usize, bool)> = HashMap::new();
    for node in &flow.nodes {
        let entry = counts.entry(node.node_type.as_str()).or_insert((0, false));
        entry.0 += 1;
        entry.1 |= node.singleton;
    }
    for node in &flow.nodes {
        if let Some(&(count, singleton)) = counts.get(node.node_type.as_str()) {
            if singleton && count > 1 {
                return Err(GraphError::DuplicateSingleton {
                    node_type: node.node_type.clone(),
                    count,
                });
            }
        }
    }
    Ok(())
}

/// Kahn reduction with declaration-order tie-break; stalls are resolved by
/// force-emitting the remaining node with the lowest current in-degree.
fn reduce(adj: &[Vec<usize>], mut in_degree: Vec<usize>) -> (Vec<usize>, Vec<usize>) {
    let n = adj.len();
    let mut order = Vec::with_capacity(n);
    let mut cycle_breaks = Vec::new();
    let mut emitted = vec![false; n];

    // Min-heap on declaration index keeps ties deterministic
    let mut ready: BinaryHeap<std::cmp::Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, d)| *d == 0)
        .map(|(i, _)| std::cmp::Reverse(i))
        .collect();

    while order.len() < n {
        if let Some(std::cmp::Reverse(u)) = ready.pop() {
            if emitted[u] {
                continue;
            }
            emitted[u] = true;
            order.push(u);
            for &v in &adj[u] {
                in_degree[v] = in_degree[v].saturating_sub(1);
                if in_degree[v] == 0 && !emitted[v] {
                    ready.push(std::cmp::Reverse(v));
                }
            }
        } else {
            // Cycle: pick the remaining node with the lowest in-degree,
            // declaration order breaking ties, and emit it anyway.
            let forced = (0..n)
                .filter(|&i| !emitted[i])
                .min_by_key(|&i| (in_degree[i], i));
            match forced {
                Some(u) => {
                    cycle_breaks.push(u);
                    ready.push(std::cmp::Reverse(u));
                    in_degree[u] = 0;
                }
                None => break,
            }
        }
    }

    (order, cycle_breaks)
}

/// Nodes that share a common predecessor are parallel siblings; overlapping
/// fan-outs merge into one group (breadth-first component walk).
fn group_siblings(
    flow: &FlowDefinition,
    adj: &[Vec<usize>],
    index: &HashMap<&str, usize>,
) -> HashMap<String, Vec<String>> {
    let n = flow.nodes.len();
    let mut linked: Vec<HashSet<usize>> = vec![HashSet::new(); n];

    for successors in adj.iter() {
        if successors.len() < 2 {
            continue;
        }
        let first = successors[0];
        for &other in &successors[1..] {
            linked[first].insert(other);
            linked[other].insert(first);
        }
    }

    let mut groups = HashMap::new();
    let mut visited = vec![false; n];
    for node in &flow.nodes {
        let start = index[node.id.as_str()];
        if visited[start] || linked[start].is_empty() {
            continue;
        }

        let mut component = Vec::new();
        let mut queue = VecDeque::from([start]);
        visited[start] = true;
        while let Some(u) = queue.pop_front() {
            component.push(u);
            for &v in &linked[u] {
                if !visited[v] {
                    visited[v] = true;
                    queue.push_back(v);
                }
            }
        }

        component.sort_unstable();
        let ids: Vec<String> = component
            .iter()
            .map(|&i| flow.nodes[i].id.clone())
            .collect();
        for id in &ids {
            groups.insert(id.clone(), ids.clone());
        }
    }

    groups
}
