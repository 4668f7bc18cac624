pub mod audit;
pub use audit::{Actor, AuditAction, AuditEntry, AuditError, AuditRecorder, RecordId};

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService};
pub use auth_service_impl::SeaOrmAuthService;

pub mod error;
pub use error::{FieldErrors, ServiceError};

pub mod clients;
pub use clients::{ClientInput, ClientService, ClientView};

pub mod projects;
pub use projects::{ProjectInput, ProjectService, ProjectView};

pub mod networks;
pub use networks::{Cidr, NetworkInput, NetworkService, NetworkView};

pub mod vpu_users;
pub use vpu_users::{VpuUserInput, VpuUserService, VpuUserView};

pub mod users;
pub use users::{MfaConfirmInput, MfaEnrollment, NewUserInput, UserService, UserUpdateInput};
