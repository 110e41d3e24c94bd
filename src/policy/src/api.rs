//! HTTP adapter over [`PolicyService`]
//!
//! - `POST /v1/policies` - Create (idempotent)
//! - `GET /v1/policies` - List, filtered by `namespace_id`, `role_id`, `action_id`
//! - `GET /v1/policies/:id` - Get
//! - `PUT /v1/policies/:id` - Update
//! - `GET /health` - Health check

use crate::error::PolicyError;
use crate::service::PolicyService;
use crate::store::PolicyStore;
use crate::sync::{RelationStore, SyncFailure};
use crate::types::{Policy, PolicyBinding, PolicyFilters};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Shared application state
pub struct AppState<S, R> {
    service: PolicyService<S, R>,
    start_time: Instant,
}

impl<S, R> Clone for AppState<S, R> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            start_time: self.start_time,
        }
    }
}

/// Create/update request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub role_id: String,
    pub namespace_id: String,
    pub action_id: String,
}

impl From<PolicyRequest> for PolicyBinding {
    fn from(req: PolicyRequest) -> Self {
        PolicyBinding::new(req.role_id, req.namespace_id, req.action_id)
    }
}

/// List response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPoliciesResponse {
    pub policies: Vec<Policy>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SyncFailure>,
}

/// Application error type
#[derive(Debug)]
pub struct ApiError(PolicyError);

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.0.to_string();
        let (status, body) = match self.0 {
            PolicyError::Validation { field, .. } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "validation_error".to_string(),
                    message,
                    field: Some(field.to_string()),
                    policy_id: None,
                    failures: Vec::new(),
                },
            ),
            PolicyError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "not_found".to_string(),
                    message,
                    field: None,
                    policy_id: Some(id),
                    failures: Vec::new(),
                },
            ),
            PolicyError::Store(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: "store_error".to_string(),
                    message,
                    field: None,
                    policy_id: None,
                    failures: Vec::new(),
                },
            ),
            // Durable but not yet propagated
            PolicyError::Sync { policy_id, failures } => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse {
                    error: "sync_error".to_string(),
                    message,
                    field: None,
                    policy_id: Some(policy_id),
                    failures,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Build the router with tracing and a request deadline
pub fn build_router<S, R>(service: PolicyService<S, R>, request_timeout: Duration) -> Router
where
    S: PolicyStore + 'static,
    R: RelationStore + 'static,
{
    let state = AppState {
        service,
        start_time: Instant::now(),
    };

    Router::new()
        .route("/health", get(health::<S, R>))
        .route(
            "/v1/policies",
            get(list_policies::<S, R>).post(create_policy::<S, R>),
        )
        .route(
            "/v1/policies/:id",
            get(get_policy::<S, R>).put(update_policy::<S, R>),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

/// GET /health
async fn health<S, R>(State(state): State<AppState<S, R>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: crate::VERSION.to_string(),
    })
}

/// POST /v1/policies
async fn create_policy<S: PolicyStore, R: RelationStore>(
    State(state): State<AppState<S, R>>,
    Json(req): Json<PolicyRequest>,
) -> Result<Json<Policy>, ApiError> {
    let policy = state.service.create_policy(req.into()).await?;
    Ok(Json(policy))
}

/// PUT /v1/policies/:id
async fn update_policy<S: PolicyStore, R: RelationStore>(
    State(state): State<AppState<S, R>>,
    Path(id): Path<String>,
    Json(req): Json<PolicyRequest>,
) -> Result<Json<Policy>, ApiError> {
    let policy = state.service.update_policy(&id, req.into()).await?;
    Ok(Json(policy))
}

/// GET /v1/policies/:id
async fn get_policy<S: PolicyStore, R: RelationStore>(
    State(state): State<AppState<S, R>>,
    Path(id): Path<String>,
) -> Result<Json<Policy>, ApiError> {
    let policy = state.service.get_policy(&id).await?;
    Ok(Json(policy))
}

/// GET /v1/policies
async fn list_policies<S: PolicyStore, R: RelationStore>(
    State(state): State<AppState<S, R>>,
    Query(filters): Query<PolicyFilters>,
) -> Result<Json<ListPoliciesResponse>, ApiError> {
    let policies = state.service.list_policies(&filters).await?;
    Ok(Json(ListPoliciesResponse { policies }))
}
