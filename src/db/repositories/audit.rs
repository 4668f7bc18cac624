use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{audit_logs, prelude::*};

/// A fully normalized row, ready to insert.
#[derive(Debug, Clone)]
pub struct NewAuditRow {
    pub user_id: i32,
    pub action: String,
    pub entity_type: String,
    pub entity_id: i32,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub ip_address: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<i32>,
    pub user_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct AuditPage {
    pub items: Vec<audit_logs::Model>,
    pub total: u64,
    pub total_pages: u64,
}

/// Insert-only access to the audit trail.
pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert<C: ConnectionTrait>(db: &C, row: NewAuditRow) -> Result<audit_logs::Model> {
        let active = audit_logs::ActiveModel {
            user_id: Set(row.user_id),
            action: Set(row.action),
            entity_type: Set(row.entity_type),
            entity_id: Set(row.entity_id),
            old_values: Set(row.old_values),
            new_values: Set(row.new_values),
            ip_address: Set(row.ip_address),
            timestamp: Set(row.timestamp),
            ..Default::default()
        };

        active
            .insert(db)
            .await
            .context("Failed to insert audit entry")
    }

    /// Newest first; ties on timestamp fall back to insertion order.
    pub async fn list(&self, filter: &AuditFilter, page: u64, page_size: u64) -> Result<AuditPage> {
        let mut query = AuditLogs::find()
            .order_by_desc(audit_logs::Column::Timestamp)
            .order_by_desc(audit_logs::Column::Id);

        if let Some(action) = &filter.action {
            query = query.filter(audit_logs::Column::Action.eq(action.to_uppercase()));
        }
        if let Some(entity_type) = &filter.entity_type {
            query = query.filter(audit_logs::Column::EntityType.eq(entity_type.as_str()));
        }
        if let Some(entity_id) = filter.entity_id {
            query = query.filter(audit_logs::Column::EntityId.eq(entity_id));
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(audit_logs::Column::UserId.eq(user_id));
        }

        let paginator = query.paginate(&self.conn, page_size.max(1));
        let counts = paginator
            .num_items_and_pages()
            .await
            .context("Failed to count audit entries")?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .context("Failed to fetch audit entries")?;

        Ok(AuditPage {
            items,
            total: counts.number_of_items,
            total_pages: counts.number_of_pages,
        })
    }

    /// Oldest first, for reconstructing one record's history.
    pub async fn for_entity(
        &self,
        entity_type: &str,
        entity_id: i32,
    ) -> Result<Vec<audit_logs::Model>> {
        AuditLogs::find()
            .filter(audit_logs::Column::EntityType.eq(entity_type))
            .filter(audit_logs::Column::EntityId.eq(entity_id))
            .order_by_asc(audit_logs::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query audit history")
    }
}
