use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Store;
use crate::security::{
    AttemptLockout, FieldCipher, LoginAttemptPolicy, NoLockout, PasswordHasherConfig,
    RateLimiter, SessionKeys, TotpVerifier,
};
use crate::services::{
    AuditRecorder, AuthService, ClientService, NetworkService, ProjectService, SeaOrmAuthService,
    UserService, VpuUserService,
};

/// Everything a request handler needs, built once at startup and shared
/// read-only between tasks. The only interior mutability lives inside the
/// rate limiter and lockout policy.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub cipher: Arc<FieldCipher>,

    pub totp: Arc<TotpVerifier>,

    pub sessions: Arc<SessionKeys>,

    pub rate_limiter: Arc<RateLimiter>,

    pub trusted_proxies: Arc<Vec<IpAddr>>,

    pub audit: Arc<AuditRecorder>,

    pub auth_service: Arc<dyn AuthService>,

    pub clients: Arc<ClientService>,

    pub projects: Arc<ProjectService>,

    pub networks: Arc<NetworkService>,

    pub vpu_users: Arc<VpuUserService>,

    pub users: Arc<UserService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_url,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Store) -> anyhow::Result<Self> {
        let security = &config.security;

        let cipher = Arc::new(if security.field_encryption_key.is_empty() {
            warn!(
                "No field encryption key configured; using a temporary key. \
                 Encrypted fields written now will be unreadable after a restart"
            );
            FieldCipher::from_hex(&FieldCipher::generate_key_hex())?
        } else {
            FieldCipher::from_hex(security.field_encryption_key.expose())?
        });

        let session_secret = if security.session_secret.is_empty() {
            warn!("No session secret configured; sessions will not survive a restart");
            let bytes: [u8; 32] = rand::random();
            bytes.to_vec()
        } else {
            security.session_secret.expose().as_bytes().to_vec()
        };
        let sessions = Arc::new(SessionKeys::new(
            &session_secret,
            security.session_ttl_hours,
            config.server.secure_cookies,
        ));

        let totp = Arc::new(TotpVerifier::new(
            security.totp_issuer.clone(),
            security.totp_skew_steps,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(
            Duration::from_millis(config.rate_limits.window_ms),
            config.rate_limits.max_keys,
        ));

        let trusted_proxies = security
            .trusted_proxy_ips
            .iter()
            .filter_map(|ip| match ip.parse::<IpAddr>() {
                Ok(addr) => Some(addr),
                Err(_) => {
                    warn!(value = %ip, "Ignoring invalid trusted proxy address");
                    None
                }
            })
            .collect::<Vec<_>>();

        let attempts: Arc<dyn LoginAttemptPolicy> = if security.login_lockout.enabled {
            info!(
                max_attempts = security.login_lockout.max_attempts,
                "Login lockout enabled"
            );
            Arc::new(AttemptLockout::new(&security.login_lockout))
        } else {
            Arc::new(NoLockout)
        };

        let hasher = PasswordHasherConfig::from(security);
        let audit = Arc::new(AuditRecorder::new(store.clone(), config.audit.failure_mode));

        let auth_service: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            cipher.clone(),
            totp.clone(),
            attempts,
            hasher.clone(),
        ));

        let clients = Arc::new(ClientService::new(store.clone(), cipher.clone(), audit.clone()));
        let projects = Arc::new(ProjectService::new(store.clone(), audit.clone()));
        let networks = Arc::new(NetworkService::new(store.clone(), audit.clone()));
        let vpu_users = Arc::new(VpuUserService::new(
            store.clone(),
            cipher.clone(),
            audit.clone(),
        ));
        let users = Arc::new(UserService::new(
            store.clone(),
            cipher.clone(),
            totp.clone(),
            hasher,
            audit.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            cipher,
            totp,
            sessions,
            rate_limiter,
            trusted_proxies: Arc::new(trusted_proxies),
            audit,
            auth_service,
            clients,
            projects,
            networks,
            vpu_users,
            users,
        })
    }
}
