//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::errors::DeployError;
use crate::models::deployment::DeploymentRequest;
use crate::server::state::ServerState;
use crate::services::deployments::DEFAULT_LIST_LIMIT;
use crate::utils::version_info;

/// Error response with a `{"detail": ...}` body
pub struct ApiError(DeployError);

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self.0 {
            DeployError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            DeployError::InvalidState(detail) => (StatusCode::BAD_REQUEST, detail),
            other => {
                error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Service info response
#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub status: String,
}

pub async fn root_handler() -> impl IntoResponse {
    let version = version_info();
    Json(RootResponse {
        name: version.name,
        version: version.version,
        status: "online".to_string(),
    })
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: version_info().version,
    })
}

/// Run one monitor tick in the background
pub async fn trigger_monitor_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let monitor = state.monitor.clone();
    tokio::spawn(async move {
        if let Err(e) = monitor.tick().await {
            error!("Triggered monitoring run failed: {}", e);
        }
    });
    Json(json!({ "message": "Deployment monitoring triggered" }))
}

pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<DeploymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.deployments.create(request).await?;
    Ok(Json(created))
}

/// Query parameters for listing deployments
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_handler(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let deployments = state
        .deployments
        .list(
            params.user_id.as_deref(),
            params.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        )
        .await?;
    Ok(Json(deployments))
}

/// Raw deployment record
pub async fn get_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.deployments.get(&deployment_id).await?))
}

pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.deployments.status(&deployment_id).await?))
}

pub async fn stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.deployments.stop(&deployment_id).await?))
}

pub async fn delete_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.deployments.delete(&deployment_id).await?))
}
