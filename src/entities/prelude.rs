pub use super::audit_logs::Entity as AuditLogs;
pub use super::clients::Entity as Clients;
pub use super::networks::Entity as Networks;
pub use super::projects::Entity as Projects;
pub use super::users::Entity as Users;
pub use super::vpu_users::Entity as VpuUsers;
