use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, sea_query::Expr,
};

use crate::db::now_timestamp;
use crate::entities::{networks, prelude::*, projects};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRow {
    pub client_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
}

impl From<&projects::Model> for ProjectRow {
    fn from(model: &projects::Model) -> Self {
        Self {
            client_id: model.client_id,
            name: model.name.clone(),
            description: model.description.clone(),
            status: model.status.clone(),
        }
    }
}

pub struct ProjectRepository {
    conn: DatabaseConnection,
}

impl ProjectRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list(&self, client_id: Option<i32>) -> Result<Vec<projects::Model>> {
        let mut query = Projects::find().order_by_asc(projects::Column::Id);
        if let Some(client_id) = client_id {
            query = query.filter(projects::Column::ClientId.eq(client_id));
        }

        query
            .all(&self.conn)
            .await
            .context("Failed to list projects")
    }

    pub async fn get(&self, id: i32) -> Result<Option<projects::Model>> {
        Self::find_in(&self.conn, id).await
    }

    pub async fn find_in<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Option<projects::Model>> {
        Projects::find_by_id(id)
            .one(db)
            .await
            .context("Failed to query project by ID")
    }

    /// Rows owned by `client_id`, read through `db` (usually a transaction).
    pub async fn list_in<C: ConnectionTrait>(
        db: &C,
        client_id: i32,
    ) -> Result<Vec<projects::Model>> {
        Projects::find()
            .filter(projects::Column::ClientId.eq(client_id))
            .order_by_asc(projects::Column::Id)
            .all(db)
            .await
            .context("Failed to list client projects")
    }

    pub async fn insert<C: ConnectionTrait>(db: &C, row: ProjectRow) -> Result<projects::Model> {
        let now = now_timestamp();
        let active = projects::ActiveModel {
            client_id: Set(row.client_id),
            name: Set(row.name),
            description: Set(row.description),
            status: Set(row.status),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        active.insert(db).await.context("Failed to insert project")
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        existing: projects::Model,
        row: ProjectRow,
    ) -> Result<projects::Model> {
        let mut active: projects::ActiveModel = existing.into();
        active.client_id = Set(row.client_id);
        active.name = Set(row.name);
        active.description = Set(row.description);
        active.status = Set(row.status);
        active.updated_at = Set(now_timestamp());

        active.update(db).await.context("Failed to update project")
    }

    /// Detaches the project's networks, then deletes the project. Returns the
    /// number of networks detached.
    pub async fn delete_detaching<C: ConnectionTrait>(db: &C, id: i32) -> Result<u64> {
        let detached = Networks::update_many()
            .col_expr(networks::Column::ProjectId, Expr::value(Option::<i32>::None))
            .col_expr(networks::Column::UpdatedAt, Expr::value(now_timestamp()))
            .filter(networks::Column::ProjectId.eq(id))
            .exec(db)
            .await
            .context("Failed to detach project networks")?;

        Projects::delete_by_id(id)
            .exec(db)
            .await
            .context("Failed to delete project")?;

        Ok(detached.rows_affected)
    }
}
