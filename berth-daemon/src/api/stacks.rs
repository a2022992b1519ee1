//! Stack endpoints.

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use berth_core::{GitAuth, Stack, StackChange, StackDraft};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Stack creation request.
#[derive(Debug, Deserialize)]
pub struct CreateStackRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub git_url: String,
    #[serde(default)]
    pub git_branch: String,
    #[serde(default)]
    pub git_auth: GitAuth,
    #[serde(default)]
    pub compose_path: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Stack partial-update request. Absent fields are left untouched.
#[derive(Debug, Deserialize, Default)]
pub struct UpdateStackRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub git_url: Option<String>,
    pub git_branch: Option<String>,
    pub git_auth: Option<GitAuth>,
    pub compose_path: Option<String>,
    pub variables: Option<HashMap<String, String>>,
    pub labels: Option<HashMap<String, String>>,
}

/// Stack representation returned to clients. Credentials are not exposed.
#[derive(Debug, Serialize)]
pub struct StackResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub git_url: String,
    pub git_branch: String,
    pub compose_path: String,
    pub variables: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub status: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_deploy: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Stack> for StackResponse {
    fn from(stack: Stack) -> Self {
        Self {
            id: stack.id,
            name: stack.name,
            description: stack.description,
            git_url: stack.git_url,
            git_branch: stack.git_branch,
            compose_path: stack.compose_path,
            variables: stack.variables,
            labels: stack.labels,
            status: stack.status.to_string(),
            last_sync: stack.last_sync,
            last_deploy: stack.last_deploy,
            created_at: stack.created_at,
            updated_at: stack.updated_at,
        }
    }
}

/// Create a stack.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateStackRequest>,
) -> ApiResult<(StatusCode, Json<StackResponse>)> {
    if req.name.is_empty() {
        return Err(ApiError(berth_core::BerthError::InvalidConfig {
            reason: "stack name is required".to_string(),
        }));
    }

    let draft = StackDraft {
        name: req.name,
        description: req.description,
        git_url: req.git_url,
        git_branch: req.git_branch,
        git_auth: req.git_auth,
        compose_path: req.compose_path,
        variables: req.variables,
        labels: req.labels,
    };

    let stack = state.stacks.create(draft).await?;
    Ok((StatusCode::CREATED, Json(stack.into())))
}

/// List all stacks.
pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<StackResponse>>> {
    let stacks = state.stacks.list()?;
    Ok(Json(stacks.into_iter().map(StackResponse::from).collect()))
}

/// Get a stack by id.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StackResponse>> {
    let stack = state.stacks.get(id)?;
    Ok(Json(stack.into()))
}

/// Apply a partial update to a stack.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStackRequest>,
) -> ApiResult<Json<StackResponse>> {
    let change = StackChange {
        name: req.name,
        description: req.description,
        git_url: req.git_url,
        git_branch: req.git_branch,
        git_auth: req.git_auth,
        compose_path: req.compose_path,
        variables: req.variables,
        labels: req.labels,
    };
    let stack = state.stacks.update(id, change).await?;
    Ok(Json(stack.into()))
}

/// Delete a stack.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.stacks.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
