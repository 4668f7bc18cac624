use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;

use super::guard::Caller;
use super::validation::{RecordPath, ValidatedJson};
use super::{ApiError, ApiResponse, AppState, ClientFilter, MessageResponse};
use crate::services::{VpuUserInput, VpuUserView};

/// GET /vpu-users?client_id=
pub async fn list_vpu_users(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ClientFilter>,
) -> Result<Json<ApiResponse<Vec<VpuUserView>>>, ApiError> {
    let vpu_users = state.vpu_users().list(filter.client_id).await?;
    Ok(Json(ApiResponse::success(vpu_users)))
}

/// GET /vpu-users/{id}
pub async fn get_vpu_user(
    State(state): State<Arc<AppState>>,
    RecordPath(id): RecordPath,
) -> Result<Json<ApiResponse<VpuUserView>>, ApiError> {
    let vpu_user = state.vpu_users().get(id).await?;
    Ok(Json(ApiResponse::success(vpu_user)))
}

/// POST /vpu-users
pub async fn create_vpu_user(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    ValidatedJson(input): ValidatedJson<VpuUserInput>,
) -> Result<Json<ApiResponse<VpuUserView>>, ApiError> {
    let vpu_user = state.vpu_users().create(&actor, &input).await?;
    Ok(Json(ApiResponse::success(vpu_user)))
}

/// PUT /vpu-users/{id}
pub async fn update_vpu_user(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
    ValidatedJson(input): ValidatedJson<VpuUserInput>,
) -> Result<Json<ApiResponse<VpuUserView>>, ApiError> {
    let vpu_user = state.vpu_users().update(&actor, id, &input).await?;
    Ok(Json(ApiResponse::success(vpu_user)))
}

/// DELETE /vpu-users/{id}
pub async fn delete_vpu_user(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.vpu_users().delete(&actor, id).await?;
    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("VPU user {id} deleted"),
    })))
}
