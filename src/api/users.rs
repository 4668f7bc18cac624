use axum::{Json, extract::State};
use std::sync::Arc;

use super::guard::Caller;
use super::validation::{RecordPath, ValidatedJson};
use super::{ApiError, ApiResponse, AppState};
use crate::db::User;
use crate::services::{MfaConfirmInput, MfaEnrollment, NewUserInput, UserUpdateInput};

/// GET /users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<User>>>, ApiError> {
    let users = state.users().list().await?;
    Ok(Json(ApiResponse::success(users)))
}

/// POST /users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    ValidatedJson(input): ValidatedJson<NewUserInput>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state.users().create(&actor, &input).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// PUT /users/{id}
/// Changes role and/or password. Existing sessions keep their old role until
/// they expire
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
    ValidatedJson(input): ValidatedJson<UserUpdateInput>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state.users().update(&actor, id, &input).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// POST /users/{id}/mfa
/// Starts enrollment with a new TOTP secret. The secret is only ever returned here
pub async fn enable_mfa(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
) -> Result<Json<ApiResponse<MfaEnrollment>>, ApiError> {
    let enrollment = state.users().enable_mfa(&actor, id).await?;
    Ok(Json(ApiResponse::success(enrollment)))
}

/// POST /users/{id}/mfa/confirm
/// Turns MFA on once a code from the new secret checks out
pub async fn confirm_mfa(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
    ValidatedJson(input): ValidatedJson<MfaConfirmInput>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state.users().confirm_mfa(&actor, id, &input).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// DELETE /users/{id}/mfa
pub async fn disable_mfa(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    RecordPath(id): RecordPath,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state.users().disable_mfa(&actor, id).await?;
    Ok(Json(ApiResponse::success(user)))
}
