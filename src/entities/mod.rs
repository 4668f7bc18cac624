pub mod prelude;

pub mod audit_logs;
pub mod clients;
pub mod networks;
pub mod projects;
pub mod users;
pub mod vpu_users;
