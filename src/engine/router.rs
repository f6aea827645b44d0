// SPDX-License-Identifier: MIT

//! Routing: which downstream edges fire after a node completes
//!
//! By default every outgoing edge fires with its own copy of the outbound
//! context. A routing directive in the context restricts firing to the named
//! targets (by node id or edge label) and is consumed in the process, so it
//! applies exactly one activation deep.

use super::context::Context;
use super::flow::types::FlowDefinition;

/// The targets selected for one node's completion
#[derive(Debug, Default)]
pub struct RouteOutcome {
    /// (target node id, context copy) pairs, in edge declaration order
    pub fired: Vec<(String, Context)>,
    /// Targets suppressed by the routing directive
    pub skipped: Vec<String>,
}

/// Decide the next active node set for `node_id`. Strips the routing
/// directive from `outbound` if present.
pub fn route(flow: &FlowDefinition, node_id: &str, outbound: &mut Context) -> RouteOutcome {
    let directive = outbound.take_route_targets();

    let mut outcome = RouteOutcome::default();
    let mut seen: Vec<&str> = Vec::new();

    for edge in flow.outgoing(node_id) {
        if seen.contains(&edge.to.as_str()) {
            continue;
        }
        seen.push(edge.to.as_str());

        let allowed = match &directive {
            None => true,
            Some(targets) => {
                targets.iter().any(|t| t == &edge.to)
                    || edge
                        .label
                        .as_ref()
                        .is_some_and(|label| targets.iter().any(|t| t == label))
            }
        };

        if allowed {
            outcome.fired.push((edge.to.clone(), outbound.clone()));
        } else {
            outcome.skipped.push(edge.to.clone());
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flow() -> FlowDefinition {
        serde_json::from_str(
            r#"{
            "nodes": [
                {"id": "a", "type": "mock"},
                {"id": "b", "type": "mock"},
                {"id": "c", "type": "mock"},
                {"id": "d", "type": "mock"}
            ],
            "edges": [
                {"from": "a", "to": "b"},
                {"from": "a", "to": "c", "label": "alternate"},
                {"from": "b", "to": "d"}
            ]
        }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_default_fires_all_successors() {
        let f = flow();
        let mut ctx = Context::from_value(json!({"x": 1}));
        let outcome = route(&f, "a", &mut ctx);

        let targets: Vec<&str> = outcome.fired.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(targets, vec!["b", "c"]);
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn test_copies_are_independent() {
        let f = flow();
        let mut ctx = Context::from_value(json!({"x": 1}));
        let mut outcome = route(&f, "a", &mut ctx);

        outcome.fired[0].1.insert("x", json!(99));
        assert_eq!(outcome.fired[1].1.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_directive_restricts_targets() {
        let f = flow();
        let mut ctx = Context::from_value(json!({"_route_targets": ["b"]}));
        let outcome = route(&f, "a", &mut ctx);

        assert_eq!(outcome.fired.len(), 1);
        assert_eq!(outcome.fired[0].0, "b");
        assert_eq!(outcome.skipped, vec!["c"]);
    }

    #[test]
    fn test_directive_matches_edge_label() {
        let f = flow();
        let mut ctx = Context::from_value(json!({"_route_targets": ["alternate"]}));
        let outcome = route(&f, "a", &mut ctx);

        assert_eq!(outcome.fired.len(), 1);
        assert_eq!(outcome.fired[0].0, "c");
    }

    #[test]
    fn test_directive_is_stripped_from_copies() {
        let f = flow();
        let mut ctx = Context::from_value(json!({"_route_targets": ["b"], "data": 1}));
        let outcome = route(&f, "a", &mut ctx);

        assert!(!outcome.fired[0].1.contains("_route_targets"));
        assert!(!ctx.contains("_route_targets"));
    }

    #[test]
    fn test_no_successors() {
        let f = flow();
        let mut ctx = Context::new();
        let outcome = route(&f, "d", &mut ctx);
        assert!(outcome.fired.is_empty());
    }

    #[test]
    fn test_directive_naming_no_successor_fires_nothing() {
        let f = flow();
        let mut ctx = Context::from_value(json!({"_route_targets": ["d"]}));
        let outcome = route(&f, "a", &mut ctx);

        assert!(outcome.fired.is_empty());
        assert_eq!(outcome.skipped, vec!["b", "c"]);
    }
}
