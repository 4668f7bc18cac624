use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::info;

use crate::db::now_timestamp;
use crate::entities::{clients, networks, prelude::*, projects, vpu_users};

/// Column values for a client in storage form (sensitive fields already
/// encrypted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRow {
    pub name_encrypted: String,
    pub contact_name_encrypted: Option<String>,
    pub contact_email_encrypted: Option<String>,
    pub notes: Option<String>,
}

impl From<&clients::Model> for ClientRow {
    fn from(model: &clients::Model) -> Self {
        Self {
            name_encrypted: model.name_encrypted.clone(),
            contact_name_encrypted: model.contact_name_encrypted.clone(),
            contact_email_encrypted: model.contact_email_encrypted.clone(),
            notes: model.notes.clone(),
        }
    }
}

/// Rows removed along with a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    pub projects: u64,
    pub networks: u64,
    pub vpu_users: u64,
}

pub struct ClientRepository {
    conn: DatabaseConnection,
}

impl ClientRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list(&self) -> Result<Vec<clients::Model>> {
        Clients::find()
            .order_by_asc(clients::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list clients")
    }

    pub async fn get(&self, id: i32) -> Result<Option<clients::Model>> {
        Self::find_in(&self.conn, id).await
    }

    pub async fn find_in<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<clients::Model>> {
        Clients::find_by_id(id)
            .one(db)
            .await
            .context("Failed to query client by ID")
    }

    pub async fn insert<C: ConnectionTrait>(db: &C, row: ClientRow) -> Result<clients::Model> {
        let now = now_timestamp();
        let active = clients::ActiveModel {
            name_encrypted: Set(row.name_encrypted),
            contact_name_encrypted: Set(row.contact_name_encrypted),
            contact_email_encrypted: Set(row.contact_email_encrypted),
            notes: Set(row.notes),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        active.insert(db).await.context("Failed to insert client")
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        existing: clients::Model,
        row: ClientRow,
    ) -> Result<clients::Model> {
        let mut active: clients::ActiveModel = existing.into();
        active.name_encrypted = Set(row.name_encrypted);
        active.contact_name_encrypted = Set(row.contact_name_encrypted);
        active.contact_email_encrypted = Set(row.contact_email_encrypted);
        active.notes = Set(row.notes);
        active.updated_at = Set(now_timestamp());

        active.update(db).await.context("Failed to update client")
    }

    /// Deletes the client and everything that belongs to it. Children go
    /// first; callers run this inside a transaction.
    pub async fn delete_cascade<C: ConnectionTrait>(db: &C, id: i32) -> Result<CascadeSummary> {
        let vpu = VpuUsers::delete_many()
            .filter(vpu_users::Column::ClientId.eq(id))
            .exec(db)
            .await
            .context("Failed to delete client VPU users")?;

        let nets = Networks::delete_many()
            .filter(networks::Column::ClientId.eq(id))
            .exec(db)
            .await
            .context("Failed to delete client networks")?;

        let projs = Projects::delete_many()
            .filter(projects::Column::ClientId.eq(id))
            .exec(db)
            .await
            .context("Failed to delete client projects")?;

        Clients::delete_by_id(id)
            .exec(db)
            .await
            .context("Failed to delete client")?;

        let summary = CascadeSummary {
            projects: projs.rows_affected,
            networks: nets.rows_affected,
            vpu_users: vpu.rows_affected,
        };

        info!(
            client_id = id,
            projects = summary.projects,
            networks = summary.networks,
            vpu_users = summary.vpu_users,
            "Deleted client with dependents"
        );

        Ok(summary)
    }
}
