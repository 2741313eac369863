use std::path::{Component, Path, PathBuf};

use axum::body::Bytes;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{instrument, warn};
use uuid::Uuid;

use grid_domain::{LabelValue, Labels, LockInfo, OutputCacheEntry, State as DomainState, StateGuid, StateRef};
use grid_graph::Direction;
use grid_store::{EdgeStore, LabelOp, LabelPredicate, StateFilter, StateStore};

use crate::error::ApiError;
use crate::state::AppState;

/// Parse a path segment as a state reference: a valid UUID is treated as
/// a guid, anything else as a logic id (§4.7 — every ref-shaped
/// parameter in the service layer accepts either).
fn parse_ref(raw: &str) -> StateRef {
    match Uuid::parse_str(raw) {
        Ok(id) => StateRef::Guid(StateGuid::new(id)),
        Err(_) => StateRef::LogicId(raw.to_string()),
    }
}

fn parse_guid(raw: &str) -> Result<StateGuid, ApiError> {
    Uuid::parse_str(raw)
        .map(StateGuid::new)
        .map_err(|_| ApiError::bad_request(format!("not a valid guid: {raw}")))
}

async fn resolve(states: &dyn StateStore, state_ref: &StateRef) -> Result<DomainState, ApiError> {
    let found = match state_ref {
        StateRef::Guid(guid) => states.get_by_guid(*guid).await?,
        StateRef::LogicId(logic_id) => states.get_by_logic_id(logic_id).await?,
    };
    found.ok_or_else(|| ApiError::not_found(format!("state not found: {state_ref}")))
}

// ── Health ───────────────────────────────────────────────────────────────────

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok\n")
}

pub async fn readyz(State(state): State<AppState>) -> Response {
    match state.states.list().await {
        Ok(_) => (StatusCode::OK, "ready\n").into_response(),
        Err(err) => {
            warn!(error = %err, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "not ready\n").into_response()
        }
    }
}

// ── State-backend protocol (Terraform HTTP backend) ─────────────────────────

#[derive(Debug, Deserialize)]
pub struct LockQuery {
    #[serde(rename = "ID")]
    pub id: Option<String>,
}

#[instrument(skip(state), fields(guid = %guid_raw))]
pub async fn get_tfstate(AxumPath(guid_raw): AxumPath<String>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let guid = parse_guid(&guid_raw)?;
    let found = state.states.get_by_guid(guid).await?.ok_or_else(|| ApiError::not_found("state not found"))?;
    if found.state_content.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(([("content-type", "application/json")], found.state_content).into_response())
}

#[instrument(skip(state, body), fields(guid = %guid_raw, bytes = body.len()))]
pub async fn post_tfstate(
    AxumPath(guid_raw): AxumPath<String>,
    Query(query): Query<LockQuery>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let guid = parse_guid(&guid_raw)?;

    if body.len() > state.max_blob_bytes {
        warn!(
            guid = %guid,
            bytes = body.len(),
            limit = state.max_blob_bytes,
            "state blob exceeds configured size limit; accepting anyway"
        );
    }

    let outcome = state
        .states
        .update_content_and_refresh_outputs(guid, body.to_vec(), query.id.as_deref())
        .await?;

    state.worker.clone().spawn(guid, outcome.parsed);
    Ok(StatusCode::OK)
}

#[instrument(skip(state), fields(guid = %guid_raw))]
pub async fn delete_tfstate(AxumPath(guid_raw): AxumPath<String>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let guid = parse_guid(&guid_raw)?;
    state.states.delete(guid).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state, lock_info), fields(guid = %guid_raw))]
pub async fn lock_tfstate(
    AxumPath(guid_raw): AxumPath<String>,
    State(state): State<AppState>,
    Json(lock_info): Json<LockInfo>,
) -> Result<Response, ApiError> {
    let guid = parse_guid(&guid_raw)?;
    match state.states.lock(guid, lock_info).await {
        Ok(()) => Ok(StatusCode::OK.into_response()),
        Err(grid_store::StoreError::Locked(_)) => {
            let current = state.states.get_by_guid(guid).await?;
            let body = current.and_then(|s| s.lock_info).map(|l| json!(l)).unwrap_or_else(|| json!({}));
            Ok((StatusCode::LOCKED, Json(body)).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct UnlockBody {
    #[serde(rename = "ID")]
    pub id: String,
}

#[instrument(skip(state, body), fields(guid = %guid_raw))]
pub async fn unlock_tfstate(
    AxumPath(guid_raw): AxumPath<String>,
    State(state): State<AppState>,
    Json(body): Json<UnlockBody>,
) -> Result<StatusCode, ApiError> {
    let guid = parse_guid(&guid_raw)?;
    state.states.unlock(guid, &body.id).await?;
    Ok(StatusCode::OK)
}

// ── States RPC surface ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateStateBody {
    pub guid: Uuid,
    pub logic_id: String,
}

#[instrument(skip(state, body))]
pub async fn create_state(State(state): State<AppState>, Json(body): Json<CreateStateBody>) -> Result<Response, ApiError> {
    let created = state.states.create(StateGuid::new(body.guid), &body.logic_id).await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListStatesQuery {
    /// Comma-separated `key:value` equality predicates, conjunctively
    /// applied (`StateFilter::all_of`). Absent or empty means no filter.
    pub label: Option<String>,
}

fn parse_label_filter(raw: &str) -> StateFilter {
    let all_of = raw
        .split(',')
        .filter_map(|pair| pair.split_once(':'))
        .map(|(key, value)| LabelPredicate {
            key: key.trim().to_string(),
            op: LabelOp::Eq(LabelValue::String(value.trim().to_string())),
        })
        .collect();
    StateFilter { all_of }
}

#[instrument(skip(state))]
pub async fn list_states(State(state): State<AppState>, Query(query): Query<ListStatesQuery>) -> Result<Response, ApiError> {
    let states = match query.label.filter(|s| !s.is_empty()) {
        Some(raw) => state.states.list_filtered(&parse_label_filter(&raw)).await?,
        None => state.states.list().await?,
    };
    Ok(Json(states).into_response())
}

#[derive(Debug, Serialize)]
pub struct StateInfoResponse {
    pub guid: StateGuid,
    pub logic_id: String,
    pub locked: bool,
    pub lock_info: Option<LockInfo>,
    pub labels: Labels,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub dependency_count: usize,
    pub dependent_count: usize,
    pub outputs: Vec<OutputCacheEntry>,
}

#[instrument(skip(state), fields(state_ref = %ref_raw))]
pub async fn get_state_info(AxumPath(ref_raw): AxumPath<String>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let state_ref = parse_ref(&ref_raw);
    let found = resolve(state.states.as_ref(), &state_ref).await?;

    let dependency_count = state.edges.incoming(found.guid).await?.len();
    let dependent_count = state.edges.outgoing(found.guid).await?.len();
    let outputs = state.states.output_cache(found.guid).await?;

    Ok(Json(StateInfoResponse {
        guid: found.guid,
        logic_id: found.logic_id,
        locked: found.locked,
        lock_info: found.lock_info,
        labels: found.labels,
        created_at: found.created_at,
        updated_at: found.updated_at,
        dependency_count,
        dependent_count,
        outputs,
    })
    .into_response())
}

#[instrument(skip(state), fields(state_ref = %ref_raw))]
pub async fn list_state_outputs(AxumPath(ref_raw): AxumPath<String>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let state_ref = parse_ref(&ref_raw);
    let found = resolve(state.states.as_ref(), &state_ref).await?;
    Ok(Json(state.states.output_cache(found.guid).await?).into_response())
}

#[derive(Debug, Deserialize)]
pub struct UpdateLabelsBody {
    pub labels: Labels,
}

#[instrument(skip(state, body), fields(state_ref = %ref_raw))]
pub async fn update_state_labels(
    AxumPath(ref_raw): AxumPath<String>,
    State(state): State<AppState>,
    Json(body): Json<UpdateLabelsBody>,
) -> Result<Response, ApiError> {
    let state_ref = parse_ref(&ref_raw);
    let found = resolve(state.states.as_ref(), &state_ref).await?;
    let updated = state.states.update_labels(found.guid, body.labels).await?;
    Ok(Json(updated).into_response())
}

#[instrument(skip(state), fields(state_ref = %ref_raw))]
pub async fn destroy_state(AxumPath(ref_raw): AxumPath<String>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let state_ref = parse_ref(&ref_raw);
    let found = resolve(state.states.as_ref(), &state_ref).await?;
    state.states.delete(found.guid).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state), fields(state_ref = %ref_raw))]
pub async fn get_state_status(AxumPath(ref_raw): AxumPath<String>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let state_ref = parse_ref(&ref_raw);
    let status = state.service.state_status(&state_ref).await?;
    Ok(Json(json!({
        "state": status.state,
        "verdict": format!("{:?}", status.verdict),
        "counts": status.counts,
        "incoming": status.incoming,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct TopologyQuery {
    pub direction: Option<String>,
}

#[instrument(skip(state), fields(state_ref = %ref_raw))]
pub async fn get_topology(
    AxumPath(ref_raw): AxumPath<String>,
    State(state): State<AppState>,
    Query(query): Query<TopologyQuery>,
) -> Result<Response, ApiError> {
    let state_ref = parse_ref(&ref_raw);
    let direction = match query.direction.as_deref() {
        Some("downstream") => Direction::Downstream,
        _ => Direction::Upstream,
    };
    let layers = state.service.topological_order(&state_ref, direction).await?;
    Ok(Json(layers).into_response())
}

#[instrument(skip(state), fields(state_ref = %ref_raw))]
pub async fn get_dependency_graph(AxumPath(ref_raw): AxumPath<String>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let state_ref = parse_ref(&ref_raw);
    let graph = state.service.dependency_graph(&state_ref).await?;
    Ok(Json(json!({
        "consumer": graph.consumer,
        "producers": graph.producers.iter().map(|p| json!({"guid": p.guid, "logic_id": p.logic_id})).collect::<Vec<_>>(),
        "edges": graph.edges,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct RenderBody {
    pub path: String,
}

fn resolve_render_path(root: &Path, raw: &str) -> Result<PathBuf, ApiError> {
    let rel = Path::new(raw);
    if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ApiError::bad_request("render path must be relative and contain no '..' components"));
    }
    Ok(root.join(rel))
}

#[instrument(skip(state, body), fields(state_ref = %ref_raw))]
pub async fn render_state(
    AxumPath(ref_raw): AxumPath<String>,
    State(state): State<AppState>,
    Json(body): Json<RenderBody>,
) -> Result<StatusCode, ApiError> {
    let render_root = state.render_root.clone().ok_or_else(|| ApiError::not_found("render endpoint is not enabled"))?;
    let state_ref = parse_ref(&ref_raw);
    let graph = state.service.dependency_graph(&state_ref).await?;
    let target = resolve_render_path(&render_root, &body.path)?;
    let config = state.render_config.clone();

    tokio::task::spawn_blocking(move || grid_render::render_to_file(&graph, &config, &target))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(StatusCode::OK)
}

// ── Dependencies RPC surface ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddDependencyBody {
    pub from_ref: String,
    pub from_output: String,
    pub to_ref: String,
    pub to_input_name: Option<String>,
    pub mock_value: Option<serde_json::Value>,
}

#[instrument(skip(state, body))]
pub async fn add_dependency(State(state): State<AppState>, Json(body): Json<AddDependencyBody>) -> Result<Response, ApiError> {
    let from_ref = parse_ref(&body.from_ref);
    let to_ref = parse_ref(&body.to_ref);
    let mock_value = body
        .mock_value
        .map(|v| serde_json::to_vec(&v))
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let outcome = state
        .service
        .add_dependency(&from_ref, &body.from_output, &to_ref, body.to_input_name, mock_value)
        .await?;

    let status = if outcome.already_exists { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(outcome.edge)).into_response())
}

#[instrument(skip(state))]
pub async fn remove_dependency(AxumPath(id_raw): AxumPath<i64>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.service.remove_dependency(grid_domain::EdgeId(id_raw)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ConsumerQuery {
    pub consumer: String,
}

#[instrument(skip(state))]
pub async fn list_dependencies(State(state): State<AppState>, Query(query): Query<ConsumerQuery>) -> Result<Response, ApiError> {
    let consumer_ref = parse_ref(&query.consumer);
    Ok(Json(state.service.list_dependencies(&consumer_ref).await?).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ProducerQuery {
    pub producer: String,
}

#[instrument(skip(state))]
pub async fn list_dependents(State(state): State<AppState>, Query(query): Query<ProducerQuery>) -> Result<Response, ApiError> {
    let producer_ref = parse_ref(&query.producer);
    Ok(Json(state.service.list_dependents(&producer_ref).await?).into_response())
}

#[instrument(skip(state))]
pub async fn search_by_output(AxumPath(output_name): AxumPath<String>, State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(state.service.search_by_output(&output_name).await?).into_response())
}

#[instrument(skip(state))]
pub async fn list_all_edges(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(state.service.list_all_edges().await?).into_response())
}
