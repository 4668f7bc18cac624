use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::guard::{Caller, ClientIp};
use super::validation::{Validate, ValidatedJson};
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::db::User;
use crate::security::Identity;
use crate::services::{Actor, AuditAction, AuditEntry, FieldErrors, users};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub totp_code: Option<String>,
    /// Return the token in the body for clients sending `Authorization: Bearer`.
    #[serde(default)]
    pub bearer: bool,
}

impl Validate for LoginRequest {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.username.trim().is_empty() {
            errors.insert("username".to_string(), "is required".to_string());
        }
        if self.password.is_empty() {
            errors.insert("password".to_string(), "is required".to_string());
        }
        errors
    }
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub expires_at: String,
}

#[derive(Serialize)]
pub struct CurrentUserResponse {
    #[serde(flatten)]
    pub user: User,
    /// Admin flag carried by the session, which may lag behind the stored role.
    pub session_is_admin: bool,
}

fn set_cookie(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|e| ApiError::internal(format!("Invalid cookie: {e}")))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Verifies credentials (and TOTP when enrolled), then issues a session
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Response, ApiError> {
    let identity = state
        .auth_service()
        .authenticate(
            payload.username.trim(),
            &payload.password,
            payload.totp_code.as_deref(),
        )
        .await?;

    let session = state
        .sessions()
        .issue(&identity)
        .map_err(|e| ApiError::internal(format!("Failed to issue session: {e}")))?;

    let actor = Actor::new(identity.clone(), ip);
    state
        .audit()
        .record(AuditEntry::new(
            &actor,
            AuditAction::Login,
            users::ENTITY,
            identity.id,
        ))
        .await
        .map_err(|e| ApiError::internal(format!("Failed to record login: {e}")))?;

    let cookie = state.sessions().session_cookie(&session.token);
    let body = ApiResponse::success(LoginResponse {
        id: identity.id,
        username: identity.username,
        is_admin: identity.is_admin,
        token: payload.bearer.then_some(session.token),
        expires_at: session.expires_at.to_rfc3339(),
    });

    Ok((
        [(header::SET_COOKIE, set_cookie(&cookie.to_string())?)],
        Json(body),
    )
        .into_response())
}

/// POST /auth/logout
/// Clears the session cookie. Tokens are stateless and stay valid until expiry
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
) -> Result<Response, ApiError> {
    state
        .audit()
        .record(AuditEntry::new(
            &actor,
            AuditAction::Logout,
            users::ENTITY,
            actor.user_id(),
        ))
        .await
        .map_err(|e| ApiError::internal(format!("Failed to record logout: {e}")))?;

    tracing::info!(user_id = actor.user_id(), "User logged out");

    let cookie = state.sessions().removal_cookie();
    Ok((
        [(header::SET_COOKIE, set_cookie(&cookie.to_string())?)],
        Json(ApiResponse::success(MessageResponse {
            message: "Logged out".to_string(),
        })),
    )
        .into_response())
}

/// GET /auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<CurrentUserResponse>>, ApiError> {
    let user = state
        .auth_service()
        .current_user(identity.id)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    Ok(Json(ApiResponse::success(CurrentUserResponse {
        user,
        session_is_admin: identity.is_admin,
    })))
}
