use axum::{
    extract::{Path, Query, State},
    Json,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use crate::server::AppState;
use crate::Error;
use std::sync::Arc;

const DEFAULT_SEARCH_LIMIT: usize = 25;

#[derive(Deserialize)]
pub struct ExtractRequest {
    pub upload_id: String,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: Error) -> ApiError {
    let status = match err {
        Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }
    (status, Json(ErrorResponse { error: err.to_string() }))
}

fn not_found(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: message.to_string() }))
}

fn ensure_graph(state: &AppState, graph_id: &str) -> Result<(), ApiError> {
    if graph_id == state.graph_id {
        Ok(())
    } else {
        tracing::warn!("Unknown graph id requested: {}", graph_id);
        Err(not_found("graph_id not found"))
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn extract(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExtractRequest>,
) -> Json<Value> {
    let status = state.tracker.lock().await.start(&state.graph_id);
    Json(json!({
        "graph_id": state.graph_id,
        "status": status,
        "message": format!("Queued extraction for upload {}", request.upload_id),
    }))
}

/// 202 with a status body until extraction is ready, then the stored snapshot
pub async fn get_graph(
    State(state): State<Arc<AppState>>,
    Path(graph_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    ensure_graph(&state, &graph_id)?;

    let status = state.tracker.lock().await.state(&graph_id);
    if !status.is_ready() {
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({
                "status": status,
                "graph_id": graph_id,
                "message": status.message(),
            })),
        ));
    }

    let snapshot = state
        .store
        .lock()
        .await
        .latest_snapshot()
        .map_err(api_error)?
        .ok_or_else(|| not_found("no graph snapshot stored"))?;
    let payload = snapshot.payload_value().map_err(api_error)?;
    Ok((StatusCode::OK, Json(payload)))
}

pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path((graph_id, node_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    ensure_graph(&state, &graph_id)?;

    let store = state.store.lock().await;
    let node = store
        .node_by_external_id(&node_id)
        .map_err(api_error)?
        .ok_or_else(|| not_found("node_id not found"))?;
    let aliases = store.node_aliases(node.id).map_err(api_error)?;
    let edges = store.node_edges(node.id).map_err(api_error)?;

    Ok(Json(json!({
        "node": node,
        "aliases": aliases,
        "inbound": edges.inbound,
        "outbound": edges.outbound,
    })))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(graph_id): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    ensure_graph(&state, &graph_id)?;

    let query = params.q.unwrap_or_default();
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let results = state
        .store
        .lock()
        .await
        .search_nodes(&query, limit)
        .map_err(api_error)?;

    Ok(Json(json!({
        "graph_id": graph_id,
        "query": query,
        "results": results,
    })))
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let stats = state.store.lock().await.stats().map_err(api_error)?;
    Ok(Json(json!(stats)))
}
