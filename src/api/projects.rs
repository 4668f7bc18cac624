use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;

use super::guard::Caller;
use super::validation::{RecordPath, ValidatedJson};
use super::{ApiError, ApiResponse, AppState, ClientFilter, MessageResponse};
use crate::services::{ProjectInput, ProjectView};

/// GET /projects?client_id=
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ClientFilter>,
) -> Result<Json<ApiResponse<Vec<ProjectView>>>, ApiError> {
    let projects = state.projects().list(filter.client_id).await?;
    Ok(Json(ApiResponse::success(projects)))
}

/// GET /projects/{id}
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    RecordPath(id): RecordPath,
) -> Result<Json<ApiResponse<ProjectView>>, ApiError> {
    let project = state.projects().get(id).await?;
    Ok(Json(ApiResponse::success(project)))
}

/// POST /projects
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    ValidatedJson(input): ValidatedJson<ProjectInput>,
) -> Result<Json<ApiResponse<ProjectView>>, ApiError> {
    let project = state.projects().create(&actor, &input).await?;
    Ok(Json(ApiResponse::success(project)))
}

/// PUT /projects/{id}
pub async fn update_project(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
    ValidatedJson(input): ValidatedJson<ProjectInput>,
) -> Result<Json<ApiResponse<ProjectView>>, ApiError> {
    let project = state.projects().update(&actor, id, &input).await?;
    Ok(Json(ApiResponse::success(project)))
}

/// DELETE /projects/{id}
/// Networks assigned to the project are kept and detached
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.projects().delete(&actor, id).await?;
    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("Project {id} deleted"),
    })))
}
