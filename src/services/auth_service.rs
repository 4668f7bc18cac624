//! Domain service for operator authentication.
//!
//! Login is a small state machine: password first, then the TOTP code when
//! the account has MFA enabled. Outcomes are typed so the HTTP layer can map
//! them to distinct, machine-readable responses.

use std::time::Duration;
use thiserror::Error;

use crate::db::User;
use crate::security::Identity;

/// Errors specific to authentication operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown user or wrong password. The two are indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("MFA code required")]
    MfaRequired,

    #[error("Invalid MFA code")]
    InvalidMfaCode,

    #[error("Account temporarily locked")]
    Locked { retry_after: Duration },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable identifier surfaced to API clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::MfaRequired => "mfa_required",
            Self::InvalidMfaCode => "invalid_mfa_code",
            Self::Locked { .. } => "account_locked",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies a username/password pair and, when MFA is enabled, the TOTP
    /// code.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredentials`] for an unknown user or bad password.
    /// - [`AuthError::MfaRequired`] when the password is right but no code
    ///   was supplied.
    /// - [`AuthError::InvalidMfaCode`] when the supplied code does not verify.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        totp_code: Option<&str>,
    ) -> Result<Identity, AuthError>;

    /// Current stored view of a session's user, if it still exists.
    async fn current_user(&self, id: i32) -> Result<Option<User>, AuthError>;
}
