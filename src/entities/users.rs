use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    /// Argon2id password hash
    pub password_hash: String,

    pub is_admin: bool,

    pub mfa_enabled: bool,

    /// Encrypted TOTP secret, present only while MFA is enabled.
    pub mfa_secret: Option<String>,

    /// Encrypted secret handed out at enrollment, until a code confirms it.
    pub mfa_pending_secret: Option<String>,

    /// Last TOTP time step accepted for this account.
    pub totp_last_step: Option<i64>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
