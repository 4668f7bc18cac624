//! Append-only audit trail of mutations and logins.
//!
//! Every successful mutation produces one entry per affected record. How a
//! failed audit write is treated depends on [`AuditFailureMode`]:
//!
//! - `FailOpen` commits the mutation first, then writes the entry. Write
//!   errors are logged and counted but never surface to the caller.
//! - `FailClosed` writes the entry inside the mutation's transaction, so a
//!   failed write rolls the mutation back.

use sea_orm::DatabaseTransaction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::AuditFailureMode;
use crate::db::{AuditFilter, AuditPage, AuditRepository, NewAuditRow, Store, now_timestamp};
use crate::entities::audit_logs;
use crate::security::Identity;
use crate::services::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "LOGIN" => Ok(Self::Login),
            "LOGOUT" => Ok(Self::Logout),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

/// A user or record id as handed to the recorder, either numeric or textual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Canonical integer form stored in the trail.
    pub fn normalize(&self) -> Result<i32, AuditError> {
        match self {
            Self::Int(value) => {
                i32::try_from(*value).map_err(|_| AuditError::InvalidId(value.to_string()))
            }
            Self::Text(text) => text
                .trim()
                .parse::<i32>()
                .map_err(|_| AuditError::InvalidId(text.clone())),
        }
    }
}

impl From<i32> for RecordId {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("invalid record id: {0:?}")]
    InvalidId(String),

    #[error("failed to serialize snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("failed to store audit entry: {0}")]
    Storage(anyhow::Error),
}

/// Who is acting and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub identity: Identity,
    pub ip_address: String,
}

impl Actor {
    #[must_use]
    pub fn new(identity: Identity, ip_address: impl Into<String>) -> Self {
        Self {
            identity,
            ip_address: ip_address.into(),
        }
    }

    /// Actor for changes made from the command line, outside any session.
    #[must_use]
    pub fn system() -> Self {
        Self::new(
            Identity {
                id: 0,
                username: "system".to_string(),
                is_admin: true,
            },
            "local",
        )
    }

    #[must_use]
    pub const fn user_id(&self) -> i32 {
        self.identity.id
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.identity.is_admin
    }
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: RecordId,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: RecordId,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub ip_address: String,
}

impl AuditEntry {
    pub fn new(
        actor: &Actor,
        action: AuditAction,
        entity_type: &str,
        entity_id: impl Into<RecordId>,
    ) -> Self {
        Self {
            user_id: RecordId::from(actor.user_id()),
            action,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.into(),
            old_values: None,
            new_values: None,
            ip_address: actor.ip_address.clone(),
        }
    }

    pub fn with_old<T: Serialize>(mut self, snapshot: &T) -> Result<Self, AuditError> {
        self.old_values = Some(serde_json::to_value(snapshot)?);
        Ok(self)
    }

    pub fn with_new<T: Serialize>(mut self, snapshot: &T) -> Result<Self, AuditError> {
        self.new_values = Some(serde_json::to_value(snapshot)?);
        Ok(self)
    }

    fn into_row(self) -> Result<NewAuditRow, AuditError> {
        Ok(NewAuditRow {
            user_id: self.user_id.normalize()?,
            action: self.action.as_str().to_string(),
            entity_type: self.entity_type,
            entity_id: self.entity_id.normalize()?,
            old_values: self.old_values.map(|v| v.to_string()),
            new_values: self.new_values.map(|v| v.to_string()),
            ip_address: self.ip_address,
            timestamp: now_timestamp(),
        })
    }
}

pub struct AuditRecorder {
    store: Store,
    mode: AuditFailureMode,
}

impl AuditRecorder {
    #[must_use]
    pub const fn new(store: Store, mode: AuditFailureMode) -> Self {
        Self { store, mode }
    }

    #[must_use]
    pub const fn mode(&self) -> AuditFailureMode {
        self.mode
    }

    /// Writes a standalone entry (no surrounding mutation). Returns `None`
    /// when the write failed in fail-open mode.
    pub async fn record(&self, entry: AuditEntry) -> Result<Option<audit_logs::Model>, AuditError> {
        let result = match entry.into_row() {
            Ok(row) => AuditRepository::insert(&self.store.conn, row)
                .await
                .map_err(AuditError::Storage),
            Err(e) => Err(e),
        };

        match result {
            Ok(model) => Ok(Some(model)),
            Err(e) => self.swallow_or_raise(e).map(|()| None),
        }
    }

    /// Finishes a mutation: commits `txn` and records `entries` in the order
    /// the configured failure mode requires.
    pub async fn commit(
        &self,
        txn: DatabaseTransaction,
        entries: Vec<AuditEntry>,
    ) -> Result<(), ServiceError> {
        match self.mode {
            AuditFailureMode::FailClosed => {
                for entry in entries {
                    let row = entry.into_row().inspect_err(|e| {
                        metrics::counter!("audit_write_failures_total").increment(1);
                        error!(error = %e, "Audit entry rejected; rolling back");
                    })?;
                    AuditRepository::insert(&txn, row).await.map_err(|e| {
                        metrics::counter!("audit_write_failures_total").increment(1);
                        error!(error = %e, "Audit write failed; rolling back");
                        AuditError::Storage(e)
                    })?;
                }
                txn.commit().await?;
            }
            AuditFailureMode::FailOpen => {
                txn.commit().await?;
                for entry in entries {
                    self.record(entry).await?;
                }
            }
        }
        Ok(())
    }

    pub async fn list(
        &self,
        filter: &AuditFilter,
        page: u64,
        page_size: u64,
    ) -> anyhow::Result<AuditPage> {
        self.store.list_audit_entries(filter, page, page_size).await
    }

    fn swallow_or_raise(&self, err: AuditError) -> Result<(), AuditError> {
        metrics::counter!("audit_write_failures_total").increment(1);
        match self.mode {
            AuditFailureMode::FailOpen => {
                warn!(error = %err, "Audit write failed; continuing");
                Ok(())
            }
            AuditFailureMode::FailClosed => {
                error!(error = %err, "Audit write failed");
                Err(err)
            }
        }
    }
}
