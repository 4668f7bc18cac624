mod config;
mod keys;
mod users;

pub use config::{cmd_check_config, cmd_init};
pub use keys::cmd_generate_key;
pub use users::cmd_create_user;
