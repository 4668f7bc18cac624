use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{
    ClientRepository, ClientRow, NetworkRepository, ProjectRepository, Store, VpuUserRepository,
};
use crate::entities::clients;
use crate::security::FieldCipher;
use crate::services::audit::{Actor, AuditAction, AuditEntry, AuditRecorder};
use crate::services::error::ServiceError;
use crate::services::{networks, projects, vpu_users};

pub const ENTITY: &str = "client";

/// Plaintext view of a client, as returned by the API and recorded in audit
/// snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientView {
    pub id: i32,
    pub name: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Create and replace payload. Omitted optional fields are cleared on update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientInput {
    pub name: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub struct ClientService {
    store: Store,
    cipher: Arc<FieldCipher>,
    audit: Arc<AuditRecorder>,
}

impl ClientService {
    #[must_use]
    pub const fn new(store: Store, cipher: Arc<FieldCipher>, audit: Arc<AuditRecorder>) -> Self {
        Self {
            store,
            cipher,
            audit,
        }
    }

    fn decrypt(&self, model: &clients::Model) -> Result<ClientView, ServiceError> {
        Ok(ClientView {
            id: model.id,
            name: self.cipher.decrypt(&model.name_encrypted)?,
            contact_name: self
                .cipher
                .decrypt_opt(model.contact_name_encrypted.as_deref())?,
            contact_email: self
                .cipher
                .decrypt_opt(model.contact_email_encrypted.as_deref())?,
            notes: model.notes.clone(),
            created_at: model.created_at.clone(),
            updated_at: model.updated_at.clone(),
        })
    }

    fn encrypt(&self, input: &ClientInput) -> Result<ClientRow, ServiceError> {
        Ok(ClientRow {
            name_encrypted: self.cipher.encrypt(input.name.trim())?,
            contact_name_encrypted: self
                .cipher
                .encrypt_opt(non_blank(input.contact_name.as_deref()))?,
            contact_email_encrypted: self
                .cipher
                .encrypt_opt(non_blank(input.contact_email.as_deref()))?,
            notes: non_blank(input.notes.as_deref()).map(str::to_string),
        })
    }

    pub async fn list(&self) -> Result<Vec<ClientView>, ServiceError> {
        self.store
            .clients()
            .list()
            .await?
            .iter()
            .map(|m| self.decrypt(m))
            .collect()
    }

    pub async fn get(&self, id: i32) -> Result<ClientView, ServiceError> {
        let model = self
            .store
            .clients()
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;
        self.decrypt(&model)
    }

    pub async fn create(
        &self,
        actor: &Actor,
        input: &ClientInput,
    ) -> Result<ClientView, ServiceError> {
        let row = self.encrypt(input)?;

        let txn = self.store.begin().await?;
        let model = ClientRepository::insert(&txn, row).await?;
        let view = self.decrypt(&model)?;

        let entry =
            AuditEntry::new(actor, AuditAction::Create, ENTITY, model.id).with_new(&view)?;
        self.audit.commit(txn, vec![entry]).await?;

        Ok(view)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: i32,
        input: &ClientInput,
    ) -> Result<ClientView, ServiceError> {
        let row = self.encrypt(input)?;

        let txn = self.store.begin().await?;
        let existing = ClientRepository::find_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;
        let before = self.decrypt(&existing)?;

        let model = ClientRepository::update(&txn, existing, row).await?;
        let after = self.decrypt(&model)?;

        let entry = AuditEntry::new(actor, AuditAction::Update, ENTITY, id)
            .with_old(&before)?
            .with_new(&after)?;
        self.audit.commit(txn, vec![entry]).await?;

        Ok(after)
    }

    /// Deletes the client together with its projects, networks and VPU users.
    /// One DELETE entry is recorded per removed row.
    pub async fn delete(&self, actor: &Actor, id: i32) -> Result<(), ServiceError> {
        let txn = self.store.begin().await?;
        let existing = ClientRepository::find_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;
        let client = self.decrypt(&existing)?;

        let mut entries = Vec::new();

        for model in VpuUserRepository::list_in(&txn, id).await? {
            let view = vpu_users::decrypt(&self.cipher, &model)?;
            entries.push(
                AuditEntry::new(actor, AuditAction::Delete, vpu_users::ENTITY, model.id)
                    .with_old(&view)?,
            );
        }
        for model in NetworkRepository::list_in(&txn, id).await? {
            let view = networks::NetworkView::from(&model);
            entries.push(
                AuditEntry::new(actor, AuditAction::Delete, networks::ENTITY, model.id)
                    .with_old(&view)?,
            );
        }
        for model in ProjectRepository::list_in(&txn, id).await? {
            let view = projects::ProjectView::from(&model);
            entries.push(
                AuditEntry::new(actor, AuditAction::Delete, projects::ENTITY, model.id)
                    .with_old(&view)?,
            );
        }

        ClientRepository::delete_cascade(&txn, id).await?;
        entries.push(AuditEntry::new(actor, AuditAction::Delete, ENTITY, id).with_old(&client)?);

        self.audit.commit(txn, entries).await
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
