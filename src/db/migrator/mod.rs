use sea_orm_migration::prelude::*;

mod m20261001_create_users;
mod m20261001_create_inventory;
mod m20261002_create_audit_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_create_users::Migration),
            Box::new(m20261001_create_inventory::Migration),
            Box::new(m20261002_create_audit_logs::Migration),
        ]
    }
}
