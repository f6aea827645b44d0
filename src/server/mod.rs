// SPDX-License-Identifier: MIT

//! HTTP trigger surface for the engine
//!
//! Thin layer over the engine entry points: flow CRUD, runs, single-node
//! invocation, background run management, executor-cache reload and the
//! debug trace (including a live SSE stream). Presentation belongs to the
//! callers; every handler returns plain JSON.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::engine::context::Context;
use crate::engine::error::EngineError;
use crate::engine::flow::store::FlowStore;
use crate::engine::flow::types::{EdgeDefinition, NodeDefinition};
use crate::engine::runner::FlowEngine;
use crate::engine::supervisor::TaskId;
use crate::nodes::LlmBridge;

#[derive(Clone)]
pub struct AppState {
    pub engine: FlowEngine,
    pub store: Arc<FlowStore>,
}

pub async fn serve(
    engine: FlowEngine,
    store: Arc<FlowStore>,
    port: u16,
) -> Result<(), EngineError> {
    let state = AppState {
        engine: engine.clone(),
        store,
    };

    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/llm-status", get(llm_status))
        .route("/api/flows", get(list_flows).post(save_flow))
        .route("/api/flows/{id}", get(get_flow).delete(delete_flow))
        .route("/api/flows/{id}/run", post(run_flow))
        .route("/api/flows/{id}/plan", get(plan_flow))
        .route("/api/flows/{id}/validate", get(validate_flow))
        .route("/api/runs/node", post(run_single_node))
        .route("/api/background", get(list_background))
        .route("/api/background/{task_id}", delete(stop_background))
        .route("/api/registry/reload", post(reload_registry))
        .route("/api/trace", get(get_trace).delete(clear_trace))
        .route("/api/trace/stream", get(stream_trace))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // No orphaned timers survive the process
    engine.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Could not install shutdown handler: {}", e);
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn llm_status(State(state): State<AppState>) -> Json<Value> {
    let online = match LlmBridge::new(state.engine.settings().llm_api_url.clone()) {
        Ok(bridge) => bridge.models().await.is_ok(),
        Err(_) => false,
    };
    Json(json!({ "online": online }))
}

async fn list_flows(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.store.list()))
}

async fn get_flow(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    match state.store.get(&id) {
        Some(flow) => Json(json!(flow)),
        None => Json(json!({"error": format!("Flow '{}' not found", id)})),
    }
}

#[derive(Deserialize)]
struct SaveFlowRequest {
    name: String,
    #[serde(default)]
    nodes: Vec<NodeDefinition>,
    #[serde(default)]
    edges: Vec<EdgeDefinition>,
    id: Option<String>,
}

async fn save_flow(
    State(state): State<AppState>,
    Json(payload): Json<SaveFlowRequest>,
) -> Json<Value> {
    match state
        .store
        .save_flow(&payload.name, payload.nodes, payload.edges, payload.id)
    {
        Ok(stored) => Json(json!(stored)),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

async fn delete_flow(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    match state.store.delete(&id) {
        Ok(true) => Json(json!({"deleted": id})),
        Ok(false) => Json(json!({"error": format!("Flow '{}' not found", id)})),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

#[derive(Deserialize)]
struct RunRequest {
    #[serde(default)]
    input: Value,
    start_node: Option<String>,
}

async fn run_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<RunRequest>,
) -> Json<Value> {
    let Some(flow) = state.store.get(&id) else {
        return Json(json!({"error": format!("Flow '{}' not found", id)}));
    };

    let initial = Context::from_value(payload.input);
    let result = state
        .engine
        .run_from(Arc::new(flow), initial, payload.start_node.as_deref())
        .await;

    match result {
        Ok(report) => Json(json!(report)),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

async fn plan_flow(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    let Some(flow) = state.store.get(&id) else {
        return Json(json!({"error": format!("Flow '{}' not found", id)}));
    };
    match state.engine.plan_flow(&flow) {
        Ok(plan) => Json(json!(plan)),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

async fn validate_flow(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    let Some(flow) = state.store.get(&id) else {
        return Json(json!({"error": format!("Flow '{}' not found", id)}));
    };
    Json(json!(state.engine.validate_flow(&flow).await))
}

#[derive(Deserialize)]
struct SingleNodeRequest {
    flow_id: String,
    node_id: String,
    #[serde(default)]
    input: Value,
}

async fn run_single_node(
    State(state): State<AppState>,
    Json(payload): Json<SingleNodeRequest>,
) -> Json<Value> {
    let Some(flow) = state.store.get(&payload.flow_id) else {
        return Json(json!({"error": format!("Flow '{}' not found", payload.flow_id)}));
    };

    let initial = Context::from_value(payload.input);
    match state
        .engine
        .run_single_node(&flow, &payload.node_id, initial)
        .await
    {
        Ok(Some(output)) => Json(json!({"stopped": false, "output": output})),
        Ok(None) => Json(json!({"stopped": true})),
        Err(e) => Json(json!({"error": e.to_string()})),
    }
}

#[derive(Deserialize)]
struct BackgroundQuery {
    flow_id: Option<String>,
}

async fn list_background(
    State(state): State<AppState>,
    Query(query): Query<BackgroundQuery>,
) -> Json<Value> {
    Json(json!(state
        .engine
        .list_background_runs(query.flow_id.as_deref())))
}

async fn stop_background(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<Value> {
    let id = TaskId::from(task_id.as_str());
    if state.engine.stop_background_run(&id) {
        Json(json!({"stopped": task_id}))
    } else {
        Json(json!({"error": format!("Background run '{}' not found", task_id)}))
    }
}

async fn reload_registry(State(state): State<AppState>) -> Json<Value> {
    state.engine.registry().invalidate_all().await;
    log::info!("Executor registry invalidated by reload request");
    Json(json!({"reloaded": true}))
}

async fn get_trace(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.engine.trace().entries()))
}

async fn clear_trace(State(state): State<AppState>) -> Json<Value> {
    state.engine.trace().clear();
    Json(json!({"cleared": true}))
}

async fn stream_trace(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.engine.trace().subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|event| event.ok())
        .map(|event| Ok(Event::default().json_data(event).unwrap_or_default()));

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new().interval(std::time::Duration::from_secs(1)),
    )
}
