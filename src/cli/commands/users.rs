//! Create operator accounts from the command line

use crate::config::Config;
use crate::services::{Actor, NewUserInput, ServiceError};
use crate::state::SharedState;

pub async fn cmd_create_user(
    config: Config,
    username: &str,
    password: &str,
    admin: bool,
) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;

    let input = NewUserInput {
        username: username.to_string(),
        password: password.to_string(),
        is_admin: admin,
    };
    let user = state
        .users
        .create(&Actor::system(), &input)
        .await
        .map_err(|e| match e {
            ServiceError::Validation(fields) => {
                let details = fields
                    .iter()
                    .map(|(field, msg)| format!("{field} {msg}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                anyhow::anyhow!("Invalid input: {details}")
            }
            other => anyhow::anyhow!("Failed to create user: {other}"),
        })?;

    println!(
        "Created {} '{}' (id {})",
        if user.is_admin { "admin" } else { "operator" },
        user.username,
        user.id
    );
    Ok(())
}
