use axum::{Json, extract::State};
use std::sync::Arc;

use super::guard::Caller;
use super::validation::{RecordPath, ValidatedJson};
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::services::{ClientInput, ClientView};

/// GET /clients
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ClientView>>>, ApiError> {
    let clients = state.clients().list().await?;
    Ok(Json(ApiResponse::success(clients)))
}

/// GET /clients/{id}
pub async fn get_client(
    State(state): State<Arc<AppState>>,
    RecordPath(id): RecordPath,
) -> Result<Json<ApiResponse<ClientView>>, ApiError> {
    let client = state.clients().get(id).await?;
    Ok(Json(ApiResponse::success(client)))
}

/// POST /clients
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    ValidatedJson(input): ValidatedJson<ClientInput>,
) -> Result<Json<ApiResponse<ClientView>>, ApiError> {
    let client = state.clients().create(&actor, &input).await?;
    tracing::info!(client_id = client.id, user_id = actor.user_id(), "Created client");
    Ok(Json(ApiResponse::success(client)))
}

/// PUT /clients/{id}
pub async fn update_client(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
    ValidatedJson(input): ValidatedJson<ClientInput>,
) -> Result<Json<ApiResponse<ClientView>>, ApiError> {
    let client = state.clients().update(&actor, id, &input).await?;
    Ok(Json(ApiResponse::success(client)))
}

/// DELETE /clients/{id}
/// Removes the client together with its projects, networks and VPU users
pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.clients().delete(&actor, id).await?;
    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("Client {id} deleted"),
    })))
}
