use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;

use super::guard::Caller;
use super::validation::{RecordPath, ValidatedJson};
use super::{ApiError, ApiResponse, AppState, ClientFilter, MessageResponse};
use crate::services::{NetworkInput, NetworkView};

/// GET /networks?client_id=
pub async fn list_networks(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ClientFilter>,
) -> Result<Json<ApiResponse<Vec<NetworkView>>>, ApiError> {
    let networks = state.networks().list(filter.client_id).await?;
    Ok(Json(ApiResponse::success(networks)))
}

/// GET /networks/{id}
pub async fn get_network(
    State(state): State<Arc<AppState>>,
    RecordPath(id): RecordPath,
) -> Result<Json<ApiResponse<NetworkView>>, ApiError> {
    let network = state.networks().get(id).await?;
    Ok(Json(ApiResponse::success(network)))
}

/// POST /networks
pub async fn create_network(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    ValidatedJson(input): ValidatedJson<NetworkInput>,
) -> Result<Json<ApiResponse<NetworkView>>, ApiError> {
    let network = state.networks().create(&actor, &input).await?;
    tracing::info!(
        network_id = network.id,
        client_id = network.client_id,
        cidr = %network.cidr,
        "Allocated network"
    );
    Ok(Json(ApiResponse::success(network)))
}

/// PUT /networks/{id}
pub async fn update_network(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
    ValidatedJson(input): ValidatedJson<NetworkInput>,
) -> Result<Json<ApiResponse<NetworkView>>, ApiError> {
    let network = state.networks().update(&actor, id, &input).await?;
    Ok(Json(ApiResponse::success(network)))
}

/// DELETE /networks/{id}
pub async fn delete_network(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.networks().delete(&actor, id).await?;
    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("Network {id} deleted"),
    })))
}
