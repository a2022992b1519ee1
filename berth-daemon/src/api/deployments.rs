//! Deployment endpoints.

use crate::api::error::ApiResult;
use crate::api::AppState;
use axum::extract::{Path, State};
use axum::Json;
use berth_core::{Deployment, DeploymentRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Deployment trigger request.
#[derive(Debug, Deserialize, Default)]
pub struct DeployRequest {
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Deployment representation returned to clients.
#[derive(Debug, Serialize)]
pub struct DeploymentResponse {
    pub id: Uuid,
    pub stack_id: Uuid,
    pub version: String,
    pub git_ref: String,
    pub message: String,
    pub variables: HashMap<String, String>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: String,
    pub logs: Vec<String>,
    pub previous: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Deployment> for DeploymentResponse {
    fn from(deployment: Deployment) -> Self {
        Self {
            id: deployment.id,
            stack_id: deployment.stack_id,
            version: deployment.version,
            git_ref: deployment.git_ref,
            message: deployment.message,
            variables: deployment.variables,
            status: deployment.status.to_string(),
            started_at: deployment.started_at,
            completed_at: deployment.completed_at,
            error: deployment.error,
            logs: deployment.logs,
            previous: deployment.previous,
            created_at: deployment.created_at,
            updated_at: deployment.updated_at,
        }
    }
}

/// Outcome of a rollback: the deployment taken out of service and the one
/// put back in.
#[derive(Debug, Serialize)]
pub struct RollbackResponse {
    pub rolled_back: DeploymentResponse,
    pub restored: DeploymentResponse,
}

/// Trigger a deployment of a stack.
pub async fn deploy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<DeployRequest>,
) -> ApiResult<Json<DeploymentResponse>> {
    let deployment = state
        .deployments
        .trigger(DeploymentRequest { stack_id: id, variables: req.variables })
        .await?;
    Ok(Json(deployment.into()))
}

/// List a stack's deployment history.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<DeploymentResponse>>> {
    // surface NotFound for unknown stacks instead of an empty history
    state.stacks.get(id)?;
    let deployments = state.deployments.list_by_stack(id)?;
    Ok(Json(deployments.into_iter().map(DeploymentResponse::from).collect()))
}

/// Roll a stack back to its previous successful deployment.
pub async fn rollback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RollbackResponse>> {
    let (rolled_back, restored) = state.deployments.rollback(id).await?;
    Ok(Json(RollbackResponse {
        rolled_back: rolled_back.into(),
        restored: restored.into(),
    }))
}
