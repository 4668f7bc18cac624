use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::db::now_timestamp;
use crate::entities::{networks, prelude::*};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRow {
    pub client_id: i32,
    pub project_id: Option<i32>,
    pub cidr: String,
    pub vlan_id: Option<i32>,
    pub gateway: Option<String>,
    pub description: Option<String>,
}

impl From<&networks::Model> for NetworkRow {
    fn from(model: &networks::Model) -> Self {
        Self {
            client_id: model.client_id,
            project_id: model.project_id,
            cidr: model.cidr.clone(),
            vlan_id: model.vlan_id,
            gateway: model.gateway.clone(),
            description: model.description.clone(),
        }
    }
}

pub struct NetworkRepository {
    conn: DatabaseConnection,
}

impl NetworkRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list(&self, client_id: Option<i32>) -> Result<Vec<networks::Model>> {
        let mut query = Networks::find().order_by_asc(networks::Column::Id);
        if let Some(client_id) = client_id {
            query = query.filter(networks::Column::ClientId.eq(client_id));
        }

        query
            .all(&self.conn)
            .await
            .context("Failed to list networks")
    }

    pub async fn get(&self, id: i32) -> Result<Option<networks::Model>> {
        Self::find_in(&self.conn, id).await
    }

    pub async fn find_in<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Option<networks::Model>> {
        Networks::find_by_id(id)
            .one(db)
            .await
            .context("Failed to query network by ID")
    }

    /// Rows owned by `client_id`, read through `db` (usually a transaction).
    pub async fn list_in<C: ConnectionTrait>(
        db: &C,
        client_id: i32,
    ) -> Result<Vec<networks::Model>> {
        Networks::find()
            .filter(networks::Column::ClientId.eq(client_id))
            .order_by_asc(networks::Column::Id)
            .all(db)
            .await
            .context("Failed to list client networks")
    }

    pub async fn list_for_project_in<C: ConnectionTrait>(
        db: &C,
        project_id: i32,
    ) -> Result<Vec<networks::Model>> {
        Networks::find()
            .filter(networks::Column::ProjectId.eq(project_id))
            .order_by_asc(networks::Column::Id)
            .all(db)
            .await
            .context("Failed to list project networks")
    }

    pub async fn insert<C: ConnectionTrait>(db: &C, row: NetworkRow) -> Result<networks::Model> {
        let now = now_timestamp();
        let active = networks::ActiveModel {
            client_id: Set(row.client_id),
            project_id: Set(row.project_id),
            cidr: Set(row.cidr),
            vlan_id: Set(row.vlan_id),
            gateway: Set(row.gateway),
            description: Set(row.description),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        active.insert(db).await.context("Failed to insert network")
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        existing: networks::Model,
        row: NetworkRow,
    ) -> Result<networks::Model> {
        let mut active: networks::ActiveModel = existing.into();
        active.client_id = Set(row.client_id);
        active.project_id = Set(row.project_id);
        active.cidr = Set(row.cidr);
        active.vlan_id = Set(row.vlan_id);
        active.gateway = Set(row.gateway);
        active.description = Set(row.description);
        active.updated_at = Set(now_timestamp());

        active.update(db).await.context("Failed to update network")
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: i32) -> Result<bool> {
        let result = Networks::delete_by_id(id)
            .exec(db)
            .await
            .context("Failed to delete network")?;

        Ok(result.rows_affected > 0)
    }
}
