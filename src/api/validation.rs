use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Request, rejection::JsonRejection},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use super::ApiError;
use crate::constants::limits::MAX_PAGE_SIZE;
use crate::services::clients::ClientInput;
use crate::services::networks::NetworkInput;
use crate::services::projects::{ProjectInput, STATUS_ACTIVE, STATUS_ARCHIVED};
use crate::services::users::{self, MfaConfirmInput, NewUserInput, UserUpdateInput};
use crate::services::vpu_users::VpuUserInput;
use crate::services::{FieldErrors, ServiceError};

const MAX_NAME_LEN: usize = 255;
const MAX_TEXT_LEN: usize = 4000;

/// Request payloads that can report their own field errors.
pub trait Validate {
    fn validate(&self) -> FieldErrors;
}

/// `Json<T>` that also runs [`Validate`], rejecting with a 400 field map.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::validation("body", rejection.body_text()))?;

        let errors = value.validate();
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        Ok(Self(value))
    }
}

/// `{id}` path segment, rejected with the same field map as bad bodies.
#[derive(Debug, Clone, Copy)]
pub struct RecordPath(pub i32);

impl<S: Send + Sync> FromRequestParts<S> for RecordPath {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i32>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::validation("id", "must be a positive integer"))?;
        validate_id(id).map(Self)
    }
}

fn require(errors: &mut FieldErrors, field: &str, value: &str, max_len: usize) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.insert(field.to_string(), "is required".to_string());
    } else if trimmed.chars().count() > max_len {
        errors.insert(
            field.to_string(),
            format!("must be {max_len} characters or less"),
        );
    }
}

fn optional(errors: &mut FieldErrors, field: &str, value: Option<&str>, max_len: usize) {
    if let Some(value) = value
        && value.trim().chars().count() > max_len
    {
        errors.insert(
            field.to_string(),
            format!("must be {max_len} characters or less"),
        );
    }
}

fn positive_id(errors: &mut FieldErrors, field: &str, id: i32) {
    if id <= 0 {
        errors.insert(field.to_string(), "must be a positive integer".to_string());
    }
}

/// Loose shape check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn email(errors: &mut FieldErrors, field: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty())
        && !is_valid_email(value)
    {
        errors.insert(field.to_string(), "must be a valid email address".to_string());
    }
}

fn merge(errors: &mut FieldErrors, result: Result<(), ServiceError>) {
    if let Err(ServiceError::Validation(fields)) = result {
        errors.extend(fields);
    }
}

impl Validate for ClientInput {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        require(&mut errors, "name", &self.name, MAX_NAME_LEN);
        optional(&mut errors, "contact_name", self.contact_name.as_deref(), MAX_NAME_LEN);
        email(&mut errors, "contact_email", self.contact_email.as_deref());
        optional(&mut errors, "notes", self.notes.as_deref(), MAX_TEXT_LEN);
        errors
    }
}

impl Validate for ProjectInput {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        positive_id(&mut errors, "client_id", self.client_id);
        require(&mut errors, "name", &self.name, MAX_NAME_LEN);
        optional(&mut errors, "description", self.description.as_deref(), MAX_TEXT_LEN);
        if let Some(status) = self.status.as_deref() {
            let status = status.trim().to_ascii_lowercase();
            if status != STATUS_ACTIVE && status != STATUS_ARCHIVED {
                errors.insert(
                    "status".to_string(),
                    format!("must be '{STATUS_ACTIVE}' or '{STATUS_ARCHIVED}'"),
                );
            }
        }
        errors
    }
}

impl Validate for NetworkInput {
    fn validate(&self) -> FieldErrors {
        let mut errors = self.check();
        positive_id(&mut errors, "client_id", self.client_id);
        if let Some(project_id) = self.project_id {
            positive_id(&mut errors, "project_id", project_id);
        }
        optional(&mut errors, "description", self.description.as_deref(), MAX_TEXT_LEN);
        errors
    }
}

impl Validate for VpuUserInput {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        positive_id(&mut errors, "client_id", self.client_id);
        require(&mut errors, "username", &self.username, MAX_NAME_LEN);
        optional(&mut errors, "full_name", self.full_name.as_deref(), MAX_NAME_LEN);
        email(&mut errors, "email", self.email.as_deref());
        errors
    }
}

impl Validate for NewUserInput {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        merge(&mut errors, users::check_username(self.username.trim()));
        merge(&mut errors, users::check_password(&self.password));
        errors
    }
}

impl Validate for UserUpdateInput {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if let Some(password) = self.password.as_deref() {
            merge(&mut errors, users::check_password(password));
        }
        errors
    }
}

impl Validate for MfaConfirmInput {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        let code = self.code.trim();
        if code.is_empty() {
            errors.insert("code".to_string(), "is required".to_string());
        } else if !code.bytes().all(|b| b.is_ascii_digit()) {
            errors.insert("code".to_string(), "must contain only digits".to_string());
        }
        errors
    }
}

pub fn validate_id(id: i32) -> Result<i32, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation("id", "must be a positive integer"));
    }
    Ok(id)
}

pub fn validate_page(page: u64, page_size: u64) -> Result<(u64, u64), ApiError> {
    let mut errors = FieldErrors::new();
    if page == 0 {
        errors.insert("page".to_string(), "must be 1 or greater".to_string());
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        errors.insert(
            "page_size".to_string(),
            format!("must be between 1 and {MAX_PAGE_SIZE}"),
        );
    }
    if errors.is_empty() {
        Ok((page, page_size))
    } else {
        Err(ApiError::Validation(errors))
    }
}
