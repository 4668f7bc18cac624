use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::db::now_timestamp;
use crate::entities::{prelude::*, vpu_users};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpuUserRow {
    pub client_id: i32,
    pub username_encrypted: String,
    pub full_name_encrypted: Option<String>,
    pub email_encrypted: Option<String>,
}

impl From<&vpu_users::Model> for VpuUserRow {
    fn from(model: &vpu_users::Model) -> Self {
        Self {
            client_id: model.client_id,
            username_encrypted: model.username_encrypted.clone(),
            full_name_encrypted: model.full_name_encrypted.clone(),
            email_encrypted: model.email_encrypted.clone(),
        }
    }
}

pub struct VpuUserRepository {
    conn: DatabaseConnection,
}

impl VpuUserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list(&self, client_id: Option<i32>) -> Result<Vec<vpu_users::Model>> {
        let mut query = VpuUsers::find().order_by_asc(vpu_users::Column::Id);
        if let Some(client_id) = client_id {
            query = query.filter(vpu_users::Column::ClientId.eq(client_id));
        }

        query
            .all(&self.conn)
            .await
            .context("Failed to list VPU users")
    }

    pub async fn get(&self, id: i32) -> Result<Option<vpu_users::Model>> {
        Self::find_in(&self.conn, id).await
    }

    pub async fn find_in<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Option<vpu_users::Model>> {
        VpuUsers::find_by_id(id)
            .one(db)
            .await
            .context("Failed to query VPU user by ID")
    }

    /// Rows owned by `client_id`, read through `db` (usually a transaction).
    pub async fn list_in<C: ConnectionTrait>(
        db: &C,
        client_id: i32,
    ) -> Result<Vec<vpu_users::Model>> {
        VpuUsers::find()
            .filter(vpu_users::Column::ClientId.eq(client_id))
            .order_by_asc(vpu_users::Column::Id)
            .all(db)
            .await
            .context("Failed to list client VPU users")
    }

    pub async fn insert<C: ConnectionTrait>(db: &C, row: VpuUserRow) -> Result<vpu_users::Model> {
        let now = now_timestamp();
        let active = vpu_users::ActiveModel {
            client_id: Set(row.client_id),
            username_encrypted: Set(row.username_encrypted),
            full_name_encrypted: Set(row.full_name_encrypted),
            email_encrypted: Set(row.email_encrypted),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        active.insert(db).await.context("Failed to insert VPU user")
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        existing: vpu_users::Model,
        row: VpuUserRow,
    ) -> Result<vpu_users::Model> {
        let mut active: vpu_users::ActiveModel = existing.into();
        active.client_id = Set(row.client_id);
        active.username_encrypted = Set(row.username_encrypted);
        active.full_name_encrypted = Set(row.full_name_encrypted);
        active.email_encrypted = Set(row.email_encrypted);
        active.updated_at = Set(now_timestamp());

        active.update(db).await.context("Failed to update VPU user")
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: i32) -> Result<bool> {
        let result = VpuUsers::delete_by_id(id)
            .exec(db)
            .await
            .context("Failed to delete VPU user")?;

        Ok(result.rows_affected > 0)
    }
}
