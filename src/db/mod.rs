use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, Statement,
    TransactionTrait,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::audit::{AuditFilter, AuditPage, AuditRepository, NewAuditRow};
pub use repositories::client::{CascadeSummary, ClientRepository, ClientRow};
pub use repositories::network::{NetworkRepository, NetworkRow};
pub use repositories::project::{ProjectRepository, ProjectRow};
pub use repositories::user::{User, UserChanges, UserCredentials, UserRepository};
pub use repositories::vpu_user::{VpuUserRepository, VpuUserRow};

/// Fixed-width UTC timestamp so string ordering matches time ordering.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");
        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // every pooled connection to `sqlite::memory:` is its own database
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);
        if !in_memory {
            opt.idle_timeout(Duration::from_secs(300))
                .max_lifetime(Duration::from_secs(600));
        }

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        Ok(self.conn.begin().await?)
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn audit_repo(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn clients(&self) -> ClientRepository {
        ClientRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn projects(&self) -> ProjectRepository {
        ProjectRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn networks(&self) -> NetworkRepository {
        NetworkRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn vpu_users(&self) -> VpuUserRepository {
        VpuUserRepository::new(self.conn.clone())
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_credentials(&self, username: &str) -> Result<Option<UserCredentials>> {
        self.user_repo().get_credentials(username).await
    }

    pub async fn get_user_credentials_by_id(&self, id: i32) -> Result<Option<UserCredentials>> {
        self.user_repo().get_credentials_by_id(id).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.user_repo().list().await
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        self.user_repo().username_exists(username).await
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.user_repo().count().await
    }

    pub async fn claim_totp_step(&self, user_id: i32, step: i64) -> Result<bool> {
        UserRepository::claim_totp_step(&self.conn, user_id, step).await
    }

    // ========================================================================
    // Audit log
    // ========================================================================

    pub async fn list_audit_entries(
        &self,
        filter: &AuditFilter,
        page: u64,
        page_size: u64,
    ) -> Result<AuditPage> {
        self.audit_repo().list(filter, page, page_size).await
    }

    pub async fn audit_entries_for(
        &self,
        entity_type: &str,
        entity_id: i32,
    ) -> Result<Vec<crate::entities::audit_logs::Model>> {
        self.audit_repo().for_entity(entity_type, entity_id).await
    }
}
