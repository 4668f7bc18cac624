use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;

use crate::db::now_timestamp;
use crate::entities::users;

/// User data returned from repository (without password hash or MFA secret)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
    pub mfa_enabled: bool,
    /// An enrollment was started but not yet confirmed with a code.
    pub mfa_pending: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            is_admin: model.is_admin,
            mfa_enabled: model.mfa_enabled,
            mfa_pending: model.mfa_pending_secret.is_some(),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Everything the authenticator needs. Never leaves the service layer.
#[derive(Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
    pub mfa_secret_encrypted: Option<String>,
    pub mfa_pending_encrypted: Option<String>,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl From<users::Model> for UserCredentials {
    fn from(model: users::Model) -> Self {
        let password_hash = model.password_hash.clone();
        let mfa_secret_encrypted = model.mfa_secret.clone();
        let mfa_pending_encrypted = model.mfa_pending_secret.clone();
        Self {
            user: User::from(model),
            password_hash,
            mfa_secret_encrypted,
            mfa_pending_encrypted,
        }
    }
}

/// Changes applied by [`UserRepository::update`]. `None` leaves a column alone.
#[derive(Debug, Default, Clone)]
pub struct UserChanges {
    pub is_admin: Option<bool>,
    pub password_hash: Option<String>,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Get user by username together with the password hash and MFA secret
    pub async fn get_credentials(&self, username: &str) -> Result<Option<UserCredentials>> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        Ok(user.map(UserCredentials::from))
    }

    pub async fn get_credentials_by_id(&self, id: i32) -> Result<Option<UserCredentials>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(UserCredentials::from))
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let users = users::Entity::find()
            .order_by_asc(users::Column::Username)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(users.into_iter().map(User::from).collect())
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        let count = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .count(&self.conn)
            .await
            .context("Failed to check username")?;

        Ok(count > 0)
    }

    pub async fn count(&self) -> Result<u64> {
        users::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count users")
    }

    pub async fn find_in<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(db)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    pub async fn find_credentials_in<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Option<UserCredentials>> {
        let user = users::Entity::find_by_id(id)
            .one(db)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(UserCredentials::from))
    }

    pub async fn insert<C: ConnectionTrait>(
        db: &C,
        username: &str,
        password_hash: String,
        is_admin: bool,
    ) -> Result<User> {
        let now = now_timestamp();
        let active = users::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash),
            is_admin: Set(is_admin),
            mfa_enabled: Set(false),
            mfa_secret: Set(None),
            mfa_pending_secret: Set(None),
            totp_last_step: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(db)
            .await
            .context("Failed to insert user")?;

        Ok(User::from(model))
    }

    /// Returns `None` when the user does not exist.
    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: i32,
        changes: UserChanges,
    ) -> Result<Option<User>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(db)
            .await
            .context("Failed to query user for update")?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        if let Some(is_admin) = changes.is_admin {
            active.is_admin = Set(is_admin);
        }
        if let Some(hash) = changes.password_hash {
            active.password_hash = Set(hash);
        }
        active.updated_at = Set(now_timestamp());

        let model = active.update(db).await.context("Failed to update user")?;
        Ok(Some(User::from(model)))
    }

    /// Records a started enrollment without turning MFA on.
    pub async fn set_pending_mfa<C: ConnectionTrait>(
        db: &C,
        id: i32,
        secret_encrypted: String,
    ) -> Result<Option<User>> {
        Self::update_mfa(db, id, |active| {
            active.mfa_pending_secret = Set(Some(secret_encrypted));
        })
        .await
    }

    /// Turns MFA on with a confirmed secret and drops any pending one.
    pub async fn activate_mfa<C: ConnectionTrait>(
        db: &C,
        id: i32,
        secret_encrypted: String,
        last_step: Option<i64>,
    ) -> Result<Option<User>> {
        Self::update_mfa(db, id, |active| {
            active.mfa_enabled = Set(true);
            active.mfa_secret = Set(Some(secret_encrypted));
            active.mfa_pending_secret = Set(None);
            active.totp_last_step = Set(last_step);
        })
        .await
    }

    pub async fn clear_mfa<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<User>> {
        Self::update_mfa(db, id, |active| {
            active.mfa_enabled = Set(false);
            active.mfa_secret = Set(None);
            active.mfa_pending_secret = Set(None);
            active.totp_last_step = Set(None);
        })
        .await
    }

    async fn update_mfa<C: ConnectionTrait>(
        db: &C,
        id: i32,
        apply: impl FnOnce(&mut users::ActiveModel),
    ) -> Result<Option<User>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(db)
            .await
            .context("Failed to query user for MFA update")?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        apply(&mut active);
        active.updated_at = Set(now_timestamp());

        let model = active
            .update(db)
            .await
            .context("Failed to update MFA settings")?;
        Ok(Some(User::from(model)))
    }

    /// Marks `step` as used. Returns `false` when it, or a later step, was
    /// already accepted, in a single statement so concurrent logins cannot
    /// both claim it.
    pub async fn claim_totp_step<C: ConnectionTrait>(db: &C, id: i32, step: i64) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::TotpLastStep, Expr::value(step))
            .filter(users::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(users::Column::TotpLastStep.is_null())
                    .add(users::Column::TotpLastStep.lt(step)),
            )
            .exec(db)
            .await
            .context("Failed to record TOTP step")?;

        Ok(result.rows_affected == 1)
    }
}
