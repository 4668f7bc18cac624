use sea_orm::entity::prelude::*;

/// Client organization. Identifying fields are stored encrypted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "clients")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_name = "_name")]
    pub name_encrypted: String,

    #[sea_orm(column_name = "_contact_name")]
    pub contact_name_encrypted: Option<String>,

    #[sea_orm(column_name = "_contact_email")]
    pub contact_email_encrypted: Option<String>,

    pub notes: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::projects::Entity")]
    Projects,
    #[sea_orm(has_many = "super::networks::Entity")]
    Networks,
    #[sea_orm(has_many = "super::vpu_users::Entity")]
    VpuUsers,
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Projects.def()
    }
}

impl Related<super::networks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Networks.def()
    }
}

impl Related<super::vpu_users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VpuUsers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
