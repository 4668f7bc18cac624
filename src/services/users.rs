//! Operator account management: creation, role and password changes, and
//! TOTP enrollment.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::constants::limits::MIN_PASSWORD_LEN;
use crate::db::{Store, User, UserChanges, UserRepository};
use crate::security::{FieldCipher, Identity, PasswordHasherConfig, TotpVerifier};
use crate::services::audit::{Actor, AuditAction, AuditEntry, AuditRecorder};
use crate::services::error::ServiceError;

pub const ENTITY: &str = "user";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUserInput {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdateInput {
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Code from the authenticator app, proving a pending enrollment was set up.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MfaConfirmInput {
    pub code: String,
}

/// Returned once when enrollment starts; the secret is never shown again.
#[derive(Debug, Clone, Serialize)]
pub struct MfaEnrollment {
    pub secret: String,
    pub otpauth_uri: String,
}

/// Audit snapshot of an account. Credentials are never part of it.
#[derive(Debug, Clone, Serialize)]
struct UserSnapshot<'a> {
    #[serde(flatten)]
    user: &'a User,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    password_changed: bool,
}

impl<'a> UserSnapshot<'a> {
    const fn of(user: &'a User) -> Self {
        Self {
            user,
            password_changed: false,
        }
    }
}

pub(crate) fn check_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::invalid(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

pub(crate) fn check_username(username: &str) -> Result<(), ServiceError> {
    let valid = !username.is_empty()
        && username.len() <= 64
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@'));
    if !valid {
        return Err(ServiceError::invalid(
            "username",
            "must be 1-64 characters of letters, digits, '.', '_', '-' or '@'",
        ));
    }
    Ok(())
}

pub struct UserService {
    store: Store,
    cipher: Arc<FieldCipher>,
    totp: Arc<TotpVerifier>,
    hasher: PasswordHasherConfig,
    audit: Arc<AuditRecorder>,
}

impl UserService {
    #[must_use]
    pub const fn new(
        store: Store,
        cipher: Arc<FieldCipher>,
        totp: Arc<TotpVerifier>,
        hasher: PasswordHasherConfig,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            store,
            cipher,
            totp,
            hasher,
            audit,
        }
    }

    pub async fn list(&self) -> Result<Vec<User>, ServiceError> {
        Ok(self.store.list_users().await?)
    }

    pub async fn get(&self, id: i32) -> Result<User, ServiceError> {
        self.store
            .get_user_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))
    }

    pub async fn create(&self, actor: &Actor, input: &NewUserInput) -> Result<User, ServiceError> {
        let username = input.username.trim();
        check_username(username)?;
        check_password(&input.password)?;

        if self.store.username_exists(username).await? {
            return Err(ServiceError::Conflict(format!(
                "username '{username}' is already taken"
            )));
        }

        let hash = self.hasher.hash_async(&input.password).await?;

        let txn = self.store.begin().await?;
        let user = UserRepository::insert(&txn, username, hash, input.is_admin).await?;

        let entry = AuditEntry::new(actor, AuditAction::Create, ENTITY, user.id)
            .with_new(&UserSnapshot::of(&user))?;
        self.audit.commit(txn, vec![entry]).await?;

        info!(user_id = user.id, username = %user.username, is_admin = user.is_admin, "Created user");
        Ok(user)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: i32,
        input: &UserUpdateInput,
    ) -> Result<User, ServiceError> {
        let password_hash = match input.password.as_deref() {
            Some(password) => {
                check_password(password)?;
                Some(self.hasher.hash_async(password).await?)
            }
            None => None,
        };
        let password_changed = password_hash.is_some();

        let txn = self.store.begin().await?;
        let before = UserRepository::find_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;

        let changes = UserChanges {
            is_admin: input.is_admin,
            password_hash,
        };
        let after = UserRepository::update(&txn, id, changes)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;

        let entry = AuditEntry::new(actor, AuditAction::Update, ENTITY, id)
            .with_old(&UserSnapshot::of(&before))?
            .with_new(&UserSnapshot {
                user: &after,
                password_changed,
            })?;
        self.audit.commit(txn, vec![entry]).await?;

        Ok(after)
    }

    /// Starts enrollment for `id` with a fresh TOTP secret. MFA stays off
    /// until [`UserService::confirm_mfa`] sees a code for it. Admins may
    /// enroll anyone; everyone else only themselves.
    pub async fn enable_mfa(&self, actor: &Actor, id: i32) -> Result<MfaEnrollment, ServiceError> {
        ensure_admin_or_self(&actor.identity, id)?;

        let secret = self.totp.generate_secret();
        let encrypted = self.cipher.encrypt(&secret)?;

        let txn = self.store.begin().await?;
        let before = UserRepository::find_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;
        if before.mfa_enabled {
            return Err(ServiceError::Conflict(
                "MFA is already enabled; disable it before enrolling again".to_string(),
            ));
        }
        let after = UserRepository::set_pending_mfa(&txn, id, encrypted)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;

        let entry = AuditEntry::new(actor, AuditAction::Update, ENTITY, id)
            .with_old(&UserSnapshot::of(&before))?
            .with_new(&UserSnapshot::of(&after))?;
        self.audit.commit(txn, vec![entry]).await?;

        let otpauth_uri = self.totp.totp_uri(&secret, &after.username);
        info!(user_id = id, "MFA enrollment started");
        Ok(MfaEnrollment {
            secret,
            otpauth_uri,
        })
    }

    /// Turns MFA on once `code` matches the pending secret. The step of the
    /// confirming code counts as used.
    pub async fn confirm_mfa(
        &self,
        actor: &Actor,
        id: i32,
        input: &MfaConfirmInput,
    ) -> Result<User, ServiceError> {
        ensure_admin_or_self(&actor.identity, id)?;

        let txn = self.store.begin().await?;
        let credentials = UserRepository::find_credentials_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;
        if credentials.user.mfa_enabled {
            return Err(ServiceError::Conflict("MFA is already enabled".to_string()));
        }
        let Some(pending) = credentials.mfa_pending_encrypted else {
            return Err(ServiceError::Conflict(
                "no MFA enrollment is pending".to_string(),
            ));
        };

        let secret = self.cipher.decrypt(&pending)?;
        let step = self
            .totp
            .verify_step(&secret, &input.code)
            .ok_or_else(|| ServiceError::invalid("code", "does not match the authenticator"))?;
        let step = i64::try_from(step).map_err(|_| anyhow::anyhow!("TOTP step out of range"))?;

        let after = UserRepository::activate_mfa(&txn, id, pending, Some(step))
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;

        let entry = AuditEntry::new(actor, AuditAction::Update, ENTITY, id)
            .with_old(&UserSnapshot::of(&credentials.user))?
            .with_new(&UserSnapshot::of(&after))?;
        self.audit.commit(txn, vec![entry]).await?;

        info!(user_id = id, "MFA enabled");
        Ok(after)
    }

    pub async fn disable_mfa(&self, actor: &Actor, id: i32) -> Result<User, ServiceError> {
        ensure_admin_or_self(&actor.identity, id)?;

        let txn = self.store.begin().await?;
        let before = UserRepository::find_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;
        let after = UserRepository::clear_mfa(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;

        let entry = AuditEntry::new(actor, AuditAction::Update, ENTITY, id)
            .with_old(&UserSnapshot::of(&before))?
            .with_new(&UserSnapshot::of(&after))?;
        self.audit.commit(txn, vec![entry]).await?;

        info!(user_id = id, "MFA disabled");
        Ok(after)
    }
}

fn ensure_admin_or_self(identity: &Identity, target: i32) -> Result<(), ServiceError> {
    if identity.is_admin || identity.id == target {
        Ok(())
    } else {
        Err(ServiceError::Forbidden)
    }
}
