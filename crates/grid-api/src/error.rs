use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use grid_domain::DomainError;
use grid_graph::GraphError;
use grid_render::RenderError;
use grid_service::ServiceError;
use grid_store::StoreError;
use grid_worker::WorkerError;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: msg.into() }
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::UNPROCESSABLE_ENTITY, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::CONFLICT, message: msg.into() }
    }

    pub fn locked(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::LOCKED, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// §7's error-to-status table. `StoreError` is the root of most failure
/// paths; every other crate's error either wraps one or adds its own
/// handful of cases on top.
impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::StateNotFound(_) | StoreError::EdgeNotFound(_) => ApiError::not_found(e.to_string()),
            StoreError::DuplicateLogicId(_) | StoreError::DuplicateEdge { .. } | StoreError::AliasConflict { .. } => {
                ApiError::conflict(e.to_string())
            }
            StoreError::Locked(_) => ApiError::locked(e.to_string()),
            StoreError::NotLocked(_) | StoreError::LockIdMismatch(_) => ApiError::conflict(e.to_string()),
            StoreError::CycleDetected { .. } => ApiError::unprocessable(e.to_string()),
            StoreError::Domain(domain_err) => domain_err.into(),
            StoreError::Serialization(_) | StoreError::Internal(_) => ApiError::internal(e.to_string()),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::StateNotFound(_) | DomainError::EdgeNotFound(_) => ApiError::not_found(e.to_string()),
            DomainError::DuplicateLogicId(_)
            | DomainError::DuplicateEdge { .. }
            | DomainError::AliasConflict { .. }
            | DomainError::MalformedState(_) => ApiError::conflict(e.to_string()),
            DomainError::Locked(_) => ApiError::locked(e.to_string()),
            DomainError::NotLocked(_) | DomainError::LockIdMismatch(_) => ApiError::conflict(e.to_string()),
            DomainError::CycleDetected { .. } | DomainError::ValidationFailed(_) => ApiError::unprocessable(e.to_string()),
            DomainError::Internal(_) => ApiError::internal(e.to_string()),
        }
    }
}

impl From<GraphError> for ApiError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::CycleDetected { .. } => ApiError::unprocessable(e.to_string()),
            GraphError::UnknownState(_) => ApiError::not_found(e.to_string()),
            GraphError::InconsistentGraph(_) => ApiError::internal(e.to_string()),
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::Store(store_err) => store_err.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::StateNotFound(msg) => ApiError::not_found(msg),
            ServiceError::Store(store_err) => store_err.into(),
            ServiceError::Graph(graph_err) => graph_err.into(),
            ServiceError::Worker(worker_err) => worker_err.into(),
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(e: RenderError) -> Self {
        ApiError::internal(e.to_string())
    }
}
