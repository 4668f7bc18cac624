use std::collections::BTreeMap;
use thiserror::Error;

use crate::security::CipherError;
use crate::services::audit::AuditError;

/// Field name to human readable message.
pub type FieldErrors = BTreeMap<String, String>;

/// Errors shared by the inventory and account services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("{0}")]
    Conflict(String),

    #[error("forbidden")]
    Forbidden,

    #[error("field encryption failed: {0}")]
    Cipher(#[from] CipherError),

    #[error("audit write failed: {0}")]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    #[must_use]
    pub const fn not_found(entity: &'static str, id: i32) -> Self {
        Self::NotFound { entity, id }
    }

    /// Single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), message.into());
        Self::Validation(fields)
    }
}

impl From<sea_orm::DbErr> for ServiceError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Internal(err.into())
    }
}
