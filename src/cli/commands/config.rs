//! Configuration commands

use std::path::Path;

use crate::config::Config;

pub fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    config.validate()?;

    println!("Configuration OK");
    println!("{:-<50}", "");
    println!("  Database:        {}", config.general.database_url);
    println!(
        "  Listen:          {}:{}",
        config.server.bind_address, config.server.port
    );
    println!("  Audit mode:      {:?}", config.audit.failure_mode);
    println!(
        "  Login lockout:   {}",
        if config.security.login_lockout.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    if config.security.field_encryption_key.is_empty() {
        println!();
        println!("WARNING: no field encryption key set; a temporary key will be used");
        println!("         and encrypted data will not survive a restart.");
        println!("         Generate one with: inventory-admin generate-key");
    }
    if config.security.session_secret.is_empty() {
        println!();
        println!("WARNING: no session secret set; sessions end on every restart.");
    }

    Ok(())
}

pub fn cmd_init(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    Config::default().save_to_path(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
