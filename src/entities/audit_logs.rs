use sea_orm::entity::prelude::*;
use serde::Serialize;

/// Append-only audit trail. Rows are inserted once and never updated.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub user_id: i32,

    pub action: String,

    pub entity_type: String,

    pub entity_id: i32,

    /// JSON snapshot before the change.
    pub old_values: Option<String>,

    /// JSON snapshot after the change.
    pub new_values: Option<String>,

    pub ip_address: String,

    pub timestamp: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
