use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{ClientRepository, Store, VpuUserRepository, VpuUserRow};
use crate::entities::vpu_users;
use crate::security::FieldCipher;
use crate::services::audit::{Actor, AuditAction, AuditEntry, AuditRecorder};
use crate::services::clients::non_blank;
use crate::services::error::ServiceError;

pub const ENTITY: &str = "vpu_user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VpuUserView {
    pub id: i32,
    pub client_id: i32,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VpuUserInput {
    pub client_id: i32,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

pub(crate) fn decrypt(
    cipher: &FieldCipher,
    model: &vpu_users::Model,
) -> Result<VpuUserView, ServiceError> {
    Ok(VpuUserView {
        id: model.id,
        client_id: model.client_id,
        username: cipher.decrypt(&model.username_encrypted)?,
        full_name: cipher.decrypt_opt(model.full_name_encrypted.as_deref())?,
        email: cipher.decrypt_opt(model.email_encrypted.as_deref())?,
        created_at: model.created_at.clone(),
        updated_at: model.updated_at.clone(),
    })
}

pub struct VpuUserService {
    store: Store,
    cipher: Arc<FieldCipher>,
    audit: Arc<AuditRecorder>,
}

impl VpuUserService {
    #[must_use]
    pub const fn new(store: Store, cipher: Arc<FieldCipher>, audit: Arc<AuditRecorder>) -> Self {
        Self {
            store,
            cipher,
            audit,
        }
    }

    fn encrypt(&self, input: &VpuUserInput) -> Result<VpuUserRow, ServiceError> {
        Ok(VpuUserRow {
            client_id: input.client_id,
            username_encrypted: self.cipher.encrypt(input.username.trim())?,
            full_name_encrypted: self
                .cipher
                .encrypt_opt(non_blank(input.full_name.as_deref()))?,
            email_encrypted: self
                .cipher
                .encrypt_opt(non_blank(input.email.as_deref()))?,
        })
    }

    pub async fn list(&self, client_id: Option<i32>) -> Result<Vec<VpuUserView>, ServiceError> {
        self.store
            .vpu_users()
            .list(client_id)
            .await?
            .iter()
            .map(|m| decrypt(&self.cipher, m))
            .collect()
    }

    pub async fn get(&self, id: i32) -> Result<VpuUserView, ServiceError> {
        let model = self
            .store
            .vpu_users()
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;
        decrypt(&self.cipher, &model)
    }

    pub async fn create(
        &self,
        actor: &Actor,
        input: &VpuUserInput,
    ) -> Result<VpuUserView, ServiceError> {
        let row = self.encrypt(input)?;

        let txn = self.store.begin().await?;
        if ClientRepository::find_in(&txn, input.client_id).await?.is_none() {
            return Err(ServiceError::invalid("client_id", "client does not exist"));
        }

        let model = VpuUserRepository::insert(&txn, row).await?;
        let view = decrypt(&self.cipher, &model)?;

        let entry =
            AuditEntry::new(actor, AuditAction::Create, ENTITY, model.id).with_new(&view)?;
        self.audit.commit(txn, vec![entry]).await?;

        Ok(view)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: i32,
        input: &VpuUserInput,
    ) -> Result<VpuUserView, ServiceError> {
        let row = self.encrypt(input)?;

        let txn = self.store.begin().await?;
        let existing = VpuUserRepository::find_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;
        if existing.client_id != input.client_id
            && ClientRepository::find_in(&txn, input.client_id).await?.is_none()
        {
            return Err(ServiceError::invalid("client_id", "client does not exist"));
        }

        let before = decrypt(&self.cipher, &existing)?;
        let model = VpuUserRepository::update(&txn, existing, row).await?;
        let after = decrypt(&self.cipher, &model)?;

        let entry = AuditEntry::new(actor, AuditAction::Update, ENTITY, id)
            .with_old(&before)?
            .with_new(&after)?;
        self.audit.commit(txn, vec![entry]).await?;

        Ok(after)
    }

    pub async fn delete(&self, actor: &Actor, id: i32) -> Result<(), ServiceError> {
        let txn = self.store.begin().await?;
        let existing = VpuUserRepository::find_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;
        let before = decrypt(&self.cipher, &existing)?;

        VpuUserRepository::delete(&txn, id).await?;

        let entry = AuditEntry::new(actor, AuditAction::Delete, ENTITY, id).with_old(&before)?;
        self.audit.commit(txn, vec![entry]).await
    }
}
