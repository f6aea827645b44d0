// SPDX-License-Identifier: MIT

//! Run scheduling: walks an execution plan one payload at a time
//!
//! A run owns its context and activation counter and never mutates the flow
//! definition. Nodes activate in plan order; conditional routing and branch
//! stops decide which contexts actually propagate. A repeating node hands a
//! fresh context to the task supervisor instead of keeping its own run
//! alive.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{json, Value};

use super::context::{Context, FLOW_ID_KEY, INPUT_SOURCE_KEY, MESSAGES_KEY, RESCHEDULE_KEY};
use super::error::EngineError;
use super::executor::{ExecutorProvider, ExecutorRegistry, NodeConfig};
use super::flow::analyzer::{analyze, ExecutionPlan};
use super::flow::types::{FlowDefinition, NodeDefinition};
use super::router::route;
use super::settings::EngineSettings;
use super::supervisor::{TaskId, TaskInfo, TaskSupervisor};
use super::trace::RunTrace;

/// Terminal outcome of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// The activation ceiling tripped at `node_id`
    LoopExceeded { node_id: String },
    /// A node executor failed; no further nodes ran
    Failed { node_id: String, reason: String },
}

/// Structured outcome handed back to the trigger layer
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub status: RunStatus,
    /// Output of the last node that produced one
    pub output: Context,
    /// Total node activations
    pub activations: u32,
    /// Non-fatal conditions (unresolved executors)
    pub warnings: Vec<String>,
}

/// One finding from a pre-flight flow lint
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub kind: String,
    pub node_id: Option<String>,
    pub message: String,
}

/// Non-fatal lint distinct from the graph-invalid errors that stop a run
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// The engine facade: registry, supervisor, settings and trace wired
/// together. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct FlowEngine {
    registry: Arc<ExecutorRegistry>,
    supervisor: Arc<TaskSupervisor>,
    settings: Arc<EngineSettings>,
    trace: Arc<RunTrace>,
}

impl FlowEngine {
    pub fn new(provider: Arc<dyn ExecutorProvider>, settings: EngineSettings) -> Self {
        Self {
            registry: Arc::new(ExecutorRegistry::new(provider)),
            supervisor: Arc::new(TaskSupervisor::new()),
            settings: Arc::new(settings),
            trace: Arc::new(RunTrace::default()),
        }
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    pub fn trace(&self) -> &RunTrace {
        &self.trace
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Execute a flow against an initial context.
    pub async fn run(
        &self,
        flow: Arc<FlowDefinition>,
        initial: Context,
    ) -> Result<RunReport, EngineError> {
        self.run_from(flow, initial, None).await
    }

    /// Execute a flow starting from one explicit node.
    pub async fn run_from(
        &self,
        flow: Arc<FlowDefinition>,
        initial: Context,
        start_node: Option<&str>,
    ) -> Result<RunReport, EngineError> {
        let plan = analyze(&flow)?;
        if let Some(start) = start_node {
            if flow.node(start).is_none() {
                return Err(EngineError::StartNodeNotFound(start.to_string()));
            }
        }

        let run = FlowRun {
            engine: self.clone(),
            debug: self.settings.debug_mode,
            flow,
            plan,
        };
        Ok(run.execute(initial, start_node).await)
    }

    /// Invoke one node's receive/send without walking the graph (manual
    /// and debug triggering). `Ok(None)` means the node stopped the branch.
    pub async fn run_single_node(
        &self,
        flow: &FlowDefinition,
        node_id: &str,
        input: Context,
    ) -> Result<Option<Context>, EngineError> {
        let node = flow
            .node(node_id)
            .ok_or_else(|| EngineError::StartNodeNotFound(node_id.to_string()))?;
        let executor = self.registry.resolve(&node.node_type).await.ok_or_else(|| {
            EngineError::Other(format!("No executor for node type '{}'", node.node_type))
        })?;

        let config = node_config(node, &flow.id);
        match executor.receive(input, &config).await? {
            None => Ok(None),
            Some(processed) => Ok(Some(executor.send(processed).await?)),
        }
    }

    /// Expose the analyzer's plan for a flow: execution order, sibling
    /// groups, cycle break points.
    pub fn plan_flow(&self, flow: &FlowDefinition) -> Result<ExecutionPlan, EngineError> {
        Ok(analyze(flow)?)
    }

    /// Lint a flow before execution: structural problems, unresolvable
    /// node types, nodes no edge reaches.
    pub async fn validate_flow(&self, flow: &FlowDefinition) -> ValidationReport {
        // Node types that are meaningful without any connection
        const STANDALONE_TYPES: [&str; 4] = ["repeater", "annotation", "comment", "scheduled_start"];

        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        if let Err(e) = analyze(flow) {
            issues.push(ValidationIssue {
                kind: "graph_invalid".to_string(),
                node_id: None,
                message: e.to_string(),
            });
        }

        for node in &flow.nodes {
            if self.registry.resolve(&node.node_type).await.is_none() {
                issues.push(ValidationIssue {
                    kind: "unresolved_executor".to_string(),
                    node_id: Some(node.id.clone()),
                    message: format!(
                        "Node '{}' references unresolvable type '{}'",
                        node.display_name(),
                        node.node_type
                    ),
                });
            }
        }

        let connected: HashSet<&str> = flow
            .edges
            .iter()
            .flat_map(|e| [e.from.as_str(), e.to.as_str()])
            .collect();
        for node in &flow.nodes {
            if !connected.contains(node.id.as_str())
                && !STANDALONE_TYPES.contains(&node.node_type.as_str())
            {
                warnings.push(ValidationIssue {
                    kind: "unconnected_node".to_string(),
                    node_id: Some(node.id.clone()),
                    message: format!("Node '{}' has no connections", node.display_name()),
                });
            }
        }

        ValidationReport {
            valid: issues.is_empty(),
            issues,
            warnings,
        }
    }

    pub fn list_background_runs(&self, flow_id: Option<&str>) -> Vec<TaskInfo> {
        self.supervisor.list_active(flow_id)
    }

    pub fn stop_background_run(&self, id: &TaskId) -> bool {
        self.supervisor.cancel(id)
    }

    /// Cancel every tracked background task. Call once at process shutdown.
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }
}

/// One execution of a flow against one initial context
struct FlowRun {
    engine: FlowEngine,
    debug: bool,
    flow: Arc<FlowDefinition>,
    plan: ExecutionPlan,
}

impl FlowRun {
    async fn execute(self, initial: Context, start_node: Option<&str>) -> RunReport {
        let ceiling = self.engine.settings.max_node_activations;
        let preserve_messages = self.engine.settings.preserve_messages;

        let mut seed = initial;
        let input_source = seed
            .remove(INPUT_SOURCE_KEY)
            .and_then(|v| v.as_str().map(str::to_string));
        seed.insert(FLOW_ID_KEY, json!(self.flow.id));

        let (mut queue, entries) = self.seed_queue(start_node, input_source.as_deref());
        self.record(
            "SYSTEM",
            "FlowRunner",
            "flow_start",
            json!({"start_node": start_node, "input_source": input_source}),
        );

        let decl_index: HashMap<&str, usize> = self
            .flow
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        // Per-edge context arrivals, keyed by target, tagged with the
        // source's declaration index so fan-in merges stay order-stable.
        let mut arrivals: HashMap<String, Vec<(usize, Context)>> = HashMap::new();
        let mut outputs: HashMap<String, Option<Context>> = HashMap::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut activations: u32 = 0;
        let mut status = RunStatus::Completed;

        'walk: while let Some(node_id) = queue.pop_front() {
            let Some(node) = self.flow.node(&node_id) else {
                continue;
            };

            let pending = arrivals.remove(&node_id).unwrap_or_default();
            let input = if !pending.is_empty() {
                merge_arrivals(pending, self.engine.settings.merge_concat_messages)
            } else if entries.contains(node_id.as_str()) {
                seed.clone()
            } else {
                // Every inbound branch stopped or was routed elsewhere
                outputs.insert(node_id.clone(), None);
                continue;
            };

            activations += 1;
            if ceiling > 0 && activations > ceiling {
                log::warn!(
                    "Flow '{}' exceeded {} activations at node '{}'; aborting run",
                    self.flow.id,
                    ceiling,
                    node.display_name()
                );
                self.record(
                    &node_id,
                    node.display_name(),
                    "error",
                    json!({"error": "activation ceiling exceeded"}),
                );
                status = RunStatus::LoopExceeded {
                    node_id: node_id.clone(),
                };
                break 'walk;
            }

            self.record(
                &node_id,
                node.display_name(),
                "node_start",
                json!({"input": input.as_value()}),
            );

            let Some(executor) = self.engine.registry.resolve(&node.node_type).await else {
                let warning = format!(
                    "No executor for node type '{}' (node '{}'); node skipped",
                    node.node_type,
                    node.display_name()
                );
                log::warn!("{}", warning);
                warnings.push(warning);
                outputs.insert(node_id.clone(), None);
                continue;
            };

            let config = node_config(node, &self.flow.id);

            let processed = match executor.receive(input.clone(), &config).await {
                Ok(processed) => processed,
                Err(e) => {
                    log::error!(
                        "Execution failed at node '{}': {}",
                        node.display_name(),
                        e
                    );
                    self.record(
                        &node_id,
                        node.display_name(),
                        "error",
                        json!({"error": e.to_string()}),
                    );
                    status = RunStatus::Failed {
                        node_id: node_id.clone(),
                        reason: e.to_string(),
                    };
                    break 'walk;
                }
            };

            let Some(processed) = processed else {
                self.record(
                    &node_id,
                    node.display_name(),
                    "branch_stop",
                    json!({"reason": "receive returned stop"}),
                );
                outputs.insert(node_id.clone(), None);
                continue;
            };

            let mut outbound = match executor.send(processed).await {
                Ok(outbound) => outbound,
                Err(e) => {
                    log::error!(
                        "Execution failed at node '{}': {}",
                        node.display_name(),
                        e
                    );
                    self.record(
                        &node_id,
                        node.display_name(),
                        "error",
                        json!({"error": e.to_string()}),
                    );
                    status = RunStatus::Failed {
                        node_id: node_id.clone(),
                        reason: e.to_string(),
                    };
                    break 'walk;
                }
            };

            // Chains like input -> llm -> condition keep the conversation
            // unless a node replaces it on purpose
            if preserve_messages
                && !outbound.contains(MESSAGES_KEY)
                && input.contains(MESSAGES_KEY)
            {
                if let Some(messages) = input.get(MESSAGES_KEY) {
                    outbound.insert(MESSAGES_KEY, messages.clone());
                }
            }

            if let Some(directive) = outbound.remove(RESCHEDULE_KEY) {
                let delay = reschedule_delay(&directive);
                let task_id = self.schedule_repeat(&node_id, delay, outbound.clone());
                log::info!(
                    "Node '{}' scheduled background re-run {} in {:.1}s",
                    node.display_name(),
                    task_id,
                    delay.as_secs_f64()
                );
                self.record(
                    &node_id,
                    node.display_name(),
                    "repeat_scheduled",
                    json!({"task_id": task_id.as_str(), "delay_secs": delay.as_secs_f64()}),
                );
            }

            let outcome = route(&self.flow, &node_id, &mut outbound);
            for skipped in &outcome.skipped {
                self.record(
                    &node_id,
                    node.display_name(),
                    "routing_skip",
                    json!({"skipped": skipped}),
                );
            }
            let src_index = decl_index.get(node_id.as_str()).copied().unwrap_or(0);
            for (target, ctx) in outcome.fired {
                arrivals
                    .entry(target.clone())
                    .or_default()
                    .push((src_index, ctx));
                if !queue.contains(&target) {
                    self.record(
                        &node_id,
                        node.display_name(),
                        "queue_next",
                        json!({"next": target}),
                    );
                    queue.push_back(target);
                }
            }

            self.record(
                &node_id,
                node.display_name(),
                "node_end",
                json!({"output": outbound.as_value()}),
            );
            outputs.insert(node_id.clone(), Some(outbound));
        }

        self.record(
            "SYSTEM",
            "FlowRunner",
            if matches!(status, RunStatus::Completed) {
                "flow_complete"
            } else {
                "flow_aborted"
            },
            json!({"activations": activations}),
        );

        // Output of the last node (in plan order) that produced one
        let output = self
            .plan
            .order
            .iter()
            .rev()
            .find_map(|id| outputs.get(id).and_then(|o| o.clone()))
            .unwrap_or_default();

        RunReport {
            status,
            output,
            activations,
            warnings,
        }
    }

    /// Choose the nodes that receive the initial context and the walk order.
    fn seed_queue(
        &self,
        start_node: Option<&str>,
        input_source: Option<&str>,
    ) -> (VecDeque<String>, HashSet<String>) {
        if let Some(start) = start_node {
            let queue = VecDeque::from([start.to_string()]);
            return (queue, HashSet::from([start.to_string()]));
        }

        if let Some(source) = input_source {
            // A trigger tag like "chat" starts the flow at its chat_input
            // nodes; unknown tags fall back to the true sources.
            let target_type = format!("{}_input", source);
            let matched: Vec<String> = self
                .flow
                .nodes_of_type(&target_type)
                .map(|n| n.id.clone())
                .collect();
            let chosen = if matched.is_empty() {
                self.plan
                    .order
                    .iter()
                    .filter(|id| self.plan.in_degree.get(id.as_str()).copied().unwrap_or(0) == 0)
                    .cloned()
                    .collect()
            } else {
                matched
            };
            let entries: HashSet<String> = chosen.iter().cloned().collect();
            return (chosen.into(), entries);
        }

        let queue: VecDeque<String> = self.plan.order.iter().cloned().collect();
        let entries = self
            .plan
            .entry_nodes()
            .into_iter()
            .map(str::to_string)
            .collect();
        (queue, entries)
    }

    /// Hand the repeat to the supervisor; the current run is not kept alive.
    fn schedule_repeat(&self, node_id: &str, delay: Duration, next: Context) -> TaskId {
        let engine = self.engine.clone();
        let flow = Arc::clone(&self.flow);
        let flow_id = self.flow.id.clone();
        let task: BoxFuture<'static, ()> = Box::pin(async move {
            match engine.run(flow, next).await {
                Ok(report) => log::debug!(
                    "Background re-run of flow '{}' finished after {} activation(s)",
                    flow_id,
                    report.activations
                ),
                Err(e) => log::error!("Background re-run of flow '{}' failed: {}", flow_id, e),
            }
        });
        self.engine
            .supervisor
            .schedule(&self.flow.id, node_id, delay, task)
    }

    fn record(&self, node_id: &str, node_name: &str, event: &str, details: Value) {
        if self.debug {
            self.engine
                .trace
                .record(&self.flow.id, node_id, node_name, event, details);
        }
    }
}

/// Merge fan-in arrivals in predecessor declaration order.
fn merge_arrivals(mut pending: Vec<(usize, Context)>, concat_messages: bool) -> Context {
    pending.sort_by_key(|(index, _)| *index);
    let mut merged = Context::new();
    for (_, ctx) in &pending {
        if concat_messages {
            merged.merge_from(ctx);
        } else {
            merged.overwrite_from(ctx);
        }
    }
    merged
}

fn node_config(node: &NodeDefinition, flow_id: &str) -> NodeConfig {
    let mut config = node.config.clone();
    config.insert("_flow_id".to_string(), json!(flow_id));
    config.insert("_node_id".to_string(), json!(node.id));
    config
}

fn reschedule_delay(directive: &Value) -> Duration {
    let secs = match directive {
        Value::Object(map) => map.get("delay").and_then(Value::as_f64).unwrap_or(1.0),
        other => other.as_f64().unwrap_or(1.0),
    };
    Duration::from_secs_f64(secs.max(0.0))
}
