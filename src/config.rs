use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub rate_limits: RateLimitConfig,

    pub audit: AuditConfig,

    pub observability: ObservabilityConfig,
}

/// A configured secret. Never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("SecretValue(<unset>)")
        } else {
            f.write_str("SecretValue(<redacted>)")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_url: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/inventory.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on the session cookie.
    /// Default: true. Set to false for local development without HTTPS.
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            cors_allowed_origins: vec![
                "http://localhost:5000".to_string(),
                "http://127.0.0.1:5000".to_string(),
            ],
            secure_cookies: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 32-byte AES key, hex encoded. Generated per process when empty.
    pub field_encryption_key: SecretValue,

    /// HMAC secret used to sign session tokens. Generated per process when empty.
    pub session_secret: SecretValue,

    pub session_ttl_hours: u32,

    /// Argon2 memory cost in KiB
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,

    /// Issuer shown by authenticator apps.
    pub totp_issuer: String,

    /// Accepted clock drift, in 30 second steps, on either side of now.
    pub totp_skew_steps: u8,

    /// Peers allowed to supply `X-Forwarded-For`.
    ///
    /// When empty, forwarded headers are ignored and the socket peer address
    /// is used for rate limiting and audit entries.
    pub trusted_proxy_ips: Vec<String>,

    pub login_lockout: LoginLockoutConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            field_encryption_key: SecretValue::default(),
            session_secret: SecretValue::default(),
            session_ttl_hours: 8,
            argon2_memory_cost_kib: 19 * 1024,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
            totp_issuer: "Inventory".to_string(),
            totp_skew_steps: 1,
            trusted_proxy_ips: Vec::new(),
            login_lockout: LoginLockoutConfig::default(),
        }
    }
}

/// Optional lockout after repeated failed logins. Off unless enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginLockoutConfig {
    pub enabled: bool,

    /// Failed attempts within the window before the account is locked.
    pub max_attempts: u32,

    pub window_seconds: u64,

    pub lockout_seconds: u64,

    /// Usernames tracked at once; the least valuable entries are dropped past this.
    pub max_tracked: u64,
}

impl Default for LoginLockoutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 5,
            window_seconds: 5 * 60,
            lockout_seconds: 2 * 60,
            max_tracked: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_ms: u64,

    /// Upper bound on distinct counters kept in memory.
    pub max_keys: usize,

    pub read_limit: u32,

    pub create_limit: u32,

    pub update_limit: u32,

    pub delete_limit: u32,

    pub login_limit: u32,

    /// Admin listings (users, audit log, metrics).
    pub sensitive_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_keys: 500,
            read_limit: 10,
            create_limit: 5,
            update_limit: 5,
            delete_limit: 3,
            login_limit: 5,
            sensitive_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditFailureMode {
    /// Commit the mutation first; a failed audit write is only logged.
    #[default]
    FailOpen,

    /// Write the audit entry in the mutation's transaction.
    FailClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuditConfig {
    pub failure_mode: AuditFailureMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            rate_limits: RateLimitConfig::default(),
            audit: AuditConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Loads `.env`, the first config file found, then environment overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load_file()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but reads an explicit file instead of searching.
    pub fn load_from(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load_from_path(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("INVENTORY_DATABASE_URL") {
            self.general.database_url = url;
        }
        if let Some(level) = lookup("INVENTORY_LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Some(port) = lookup("INVENTORY_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(key) = lookup("INVENTORY_FIELD_KEY") {
            self.security.field_encryption_key = SecretValue::new(key);
        }
        if let Some(secret) = lookup("INVENTORY_SESSION_SECRET") {
            self.security.session_secret = SecretValue::new(secret);
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("inventory").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".inventory").join("config.toml"));
        }

        paths
    }

    pub fn validate(&self) -> Result<()> {
        let key = self.security.field_encryption_key.expose();
        if !key.is_empty() {
            let decoded = hex::decode(key)
                .map_err(|_| anyhow::anyhow!("field_encryption_key must be hex encoded"))?;
            if decoded.len() != 32 {
                anyhow::bail!(
                    "field_encryption_key must be 32 bytes (64 hex characters), got {} bytes",
                    decoded.len()
                );
            }
        }

        if self.security.session_ttl_hours == 0 {
            anyhow::bail!("session_ttl_hours must be > 0");
        }

        let limits = &self.rate_limits;
        if limits.window_ms == 0 || limits.max_keys == 0 {
            anyhow::bail!("rate_limits.window_ms and rate_limits.max_keys must be > 0");
        }
        if [
            limits.read_limit,
            limits.create_limit,
            limits.update_limit,
            limits.delete_limit,
            limits.login_limit,
            limits.sensitive_limit,
        ]
        .contains(&0)
        {
            anyhow::bail!("per-route rate limits must be > 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.security.session_ttl_hours, 8);
        assert_eq!(config.rate_limits.window_ms, 60_000);
        assert_eq!(config.rate_limits.delete_limit, 3);
        assert_eq!(config.audit.failure_mode, AuditFailureMode::FailOpen);
        assert!(!config.security.login_lockout.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [rate_limits]
            create_limit = 2

            [audit]
            failure_mode = "fail_closed"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.rate_limits.create_limit, 2);
        assert_eq!(config.rate_limits.read_limit, 10);
        assert_eq!(config.audit.failure_mode, AuditFailureMode::FailClosed);
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let mut config = Config::default();
        config.security.session_secret = SecretValue::new("super-secret-value");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "INVENTORY_PORT" => Some("8088".to_string()),
            "INVENTORY_DATABASE_URL" => Some("sqlite::memory:".to_string()),
            _ => None,
        });
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.general.database_url, "sqlite::memory:");
    }

    #[test]
    fn test_validate_rejects_short_key() {
        let mut config = Config::default();
        config.security.field_encryption_key = SecretValue::new("abcd");
        assert!(config.validate().is_err());

        config.security.field_encryption_key = SecretValue::new("zz".repeat(32));
        assert!(config.validate().is_err());

        config.security.field_encryption_key = SecretValue::new("ab".repeat(32));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = Config::default();
        config.rate_limits.login_limit = 0;
        assert!(config.validate().is_err());
    }
}
