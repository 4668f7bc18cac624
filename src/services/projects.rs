use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{ClientRepository, NetworkRepository, ProjectRepository, ProjectRow, Store};
use crate::entities::projects;
use crate::services::audit::{Actor, AuditAction, AuditEntry, AuditRecorder};
use crate::services::clients::non_blank;
use crate::services::error::ServiceError;
use crate::services::networks;

pub const ENTITY: &str = "project";

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_ARCHIVED: &str = "archived";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectView {
    pub id: i32,
    pub client_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&projects::Model> for ProjectView {
    fn from(model: &projects::Model) -> Self {
        Self {
            id: model.id,
            client_id: model.client_id,
            name: model.name.clone(),
            description: model.description.clone(),
            status: model.status.clone(),
            created_at: model.created_at.clone(),
            updated_at: model.updated_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectInput {
    pub client_id: i32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ProjectInput {
    fn to_row(&self) -> ProjectRow {
        ProjectRow {
            client_id: self.client_id,
            name: self.name.trim().to_string(),
            description: non_blank(self.description.as_deref()).map(str::to_string),
            status: self
                .status
                .as_deref()
                .map_or(STATUS_ACTIVE, str::trim)
                .to_ascii_lowercase(),
        }
    }
}

pub struct ProjectService {
    store: Store,
    audit: Arc<AuditRecorder>,
}

impl ProjectService {
    #[must_use]
    pub const fn new(store: Store, audit: Arc<AuditRecorder>) -> Self {
        Self { store, audit }
    }

    pub async fn list(&self, client_id: Option<i32>) -> Result<Vec<ProjectView>, ServiceError> {
        let projects = self.store.projects().list(client_id).await?;
        Ok(projects.iter().map(ProjectView::from).collect())
    }

    pub async fn get(&self, id: i32) -> Result<ProjectView, ServiceError> {
        self.store
            .projects()
            .get(id)
            .await?
            .map(|m| ProjectView::from(&m))
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))
    }

    pub async fn create(
        &self,
        actor: &Actor,
        input: &ProjectInput,
    ) -> Result<ProjectView, ServiceError> {
        let txn = self.store.begin().await?;
        if ClientRepository::find_in(&txn, input.client_id).await?.is_none() {
            return Err(ServiceError::invalid("client_id", "client does not exist"));
        }

        let model = ProjectRepository::insert(&txn, input.to_row()).await?;
        let view = ProjectView::from(&model);

        let entry =
            AuditEntry::new(actor, AuditAction::Create, ENTITY, model.id).with_new(&view)?;
        self.audit.commit(txn, vec![entry]).await?;

        Ok(view)
    }

    /// Moving a project to another client is not allowed while networks
    /// still reference it.
    pub async fn update(
        &self,
        actor: &Actor,
        id: i32,
        input: &ProjectInput,
    ) -> Result<ProjectView, ServiceError> {
        let txn = self.store.begin().await?;
        let existing = ProjectRepository::find_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;

        if existing.client_id != input.client_id {
            if ClientRepository::find_in(&txn, input.client_id).await?.is_none() {
                return Err(ServiceError::invalid("client_id", "client does not exist"));
            }
            if !NetworkRepository::list_for_project_in(&txn, id).await?.is_empty() {
                return Err(ServiceError::invalid(
                    "client_id",
                    "project still has networks assigned",
                ));
            }
        }

        let before = ProjectView::from(&existing);
        let model = ProjectRepository::update(&txn, existing, input.to_row()).await?;
        let after = ProjectView::from(&model);

        let entry = AuditEntry::new(actor, AuditAction::Update, ENTITY, id)
            .with_old(&before)?
            .with_new(&after)?;
        self.audit.commit(txn, vec![entry]).await?;

        Ok(after)
    }

    /// Deletes the project; networks assigned to it are kept but detached.
    pub async fn delete(&self, actor: &Actor, id: i32) -> Result<(), ServiceError> {
        let txn = self.store.begin().await?;
        let existing = ProjectRepository::find_in(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(ENTITY, id))?;

        let attached = NetworkRepository::list_for_project_in(&txn, id).await?;
        ProjectRepository::delete_detaching(&txn, id).await?;

        let mut entries = Vec::with_capacity(attached.len() + 1);
        for model in attached {
            let before = networks::NetworkView::from(&model);
            let after = NetworkRepository::find_in(&txn, model.id)
                .await?
                .map(|m| networks::NetworkView::from(&m));
            entries.push(
                AuditEntry::new(actor, AuditAction::Update, networks::ENTITY, model.id)
                    .with_old(&before)?
                    .with_new(&after)?,
            );
        }
        entries.push(
            AuditEntry::new(actor, AuditAction::Delete, ENTITY, id)
                .with_old(&ProjectView::from(&existing))?,
        );

        self.audit.commit(txn, entries).await
    }
}
