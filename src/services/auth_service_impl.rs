//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::db::{Store, User};
use crate::security::{
    FieldCipher, Identity, LoginAttemptPolicy, PasswordHasherConfig, TotpVerifier, password,
};
use crate::services::auth_service::{AuthError, AuthService};

pub struct SeaOrmAuthService {
    store: Store,
    cipher: Arc<FieldCipher>,
    totp: Arc<TotpVerifier>,
    attempts: Arc<dyn LoginAttemptPolicy>,
    hasher: PasswordHasherConfig,
    /// Hash verified against when the username is unknown, so that path
    /// costs the same as a wrong password.
    dummy_hash: OnceCell<String>,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        cipher: Arc<FieldCipher>,
        totp: Arc<TotpVerifier>,
        attempts: Arc<dyn LoginAttemptPolicy>,
        hasher: PasswordHasherConfig,
    ) -> Self {
        Self {
            store,
            cipher,
            totp,
            attempts,
            hasher,
            dummy_hash: OnceCell::new(),
        }
    }

    async fn dummy_hash(&self) -> Result<&str, AuthError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| self.hasher.hash_async("not-a-real-password"))
            .await?;
        Ok(hash.as_str())
    }

    fn fail(&self, username: &str, err: AuthError) -> AuthError {
        if matches!(err, AuthError::InvalidCredentials | AuthError::InvalidMfaCode) {
            self.attempts.record_failure(username);
        }
        metrics::counter!("auth_attempts_total", "outcome" => err.code()).increment(1);
        debug!(outcome = err.code(), "Login rejected");
        err
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        totp_code: Option<&str>,
    ) -> Result<Identity, AuthError> {
        if let Err(locked) = self.attempts.check(username) {
            warn!(username = %username, "Login attempt on locked account");
            return Err(self.fail(
                username,
                AuthError::Locked {
                    retry_after: locked.retry_after,
                },
            ));
        }

        let Some(credentials) = self.store.get_user_credentials(username).await? else {
            let dummy = self.dummy_hash().await?;
            let _ = password::verify_async(password, dummy).await;
            return Err(self.fail(username, AuthError::InvalidCredentials));
        };

        let valid = password::verify_async(password, &credentials.password_hash).await?;
        if !valid {
            return Err(self.fail(username, AuthError::InvalidCredentials));
        }

        let user = credentials.user;
        let identity = Identity {
            id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin,
        };

        if user.mfa_enabled {
            let code = totp_code.map(str::trim).filter(|c| !c.is_empty());
            let Some(code) = code else {
                return Err(self.fail(username, AuthError::MfaRequired));
            };

            let stored = credentials.mfa_secret_encrypted.ok_or_else(|| {
                AuthError::Internal(format!("user {} has MFA enabled but no secret", user.id))
            })?;
            let secret = self
                .cipher
                .decrypt(&stored)
                .map_err(|e| AuthError::Internal(format!("failed to decrypt MFA secret: {e}")))?;

            let Some(step) = self.totp.verify_step(&secret, code) else {
                return Err(self.fail(username, AuthError::InvalidMfaCode));
            };

            let step = i64::try_from(step)
                .map_err(|_| AuthError::Internal("TOTP step out of range".to_string()))?;
            if !self.store.claim_totp_step(user.id, step).await? {
                debug!(user_id = user.id, "TOTP code already used");
                return Err(self.fail(username, AuthError::InvalidMfaCode));
            }
        }

        self.attempts.record_success(username);
        metrics::counter!("auth_attempts_total", "outcome" => "success").increment(1);
        info!(user_id = identity.id, username = %identity.username, "Login succeeded");

        Ok(identity)
    }

    async fn current_user(&self, id: i32) -> Result<Option<User>, AuthError> {
        Ok(self.store.get_user_by_id(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoginLockoutConfig;
    use crate::db::UserRepository;
    use crate::security::{AttemptLockout, NoLockout};
    use std::time::{SystemTime, UNIX_EPOCH};

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn fast_hasher() -> PasswordHasherConfig {
        PasswordHasherConfig::new(1024, 1, 1)
    }

    async fn setup(policy: Arc<dyn LoginAttemptPolicy>) -> (SeaOrmAuthService, Store) {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let hash = fast_hasher().hash("correct horse").unwrap();
        UserRepository::insert(&store.conn, "alice", hash, true)
            .await
            .unwrap();

        let service = SeaOrmAuthService::new(
            store.clone(),
            Arc::new(FieldCipher::from_hex(KEY).unwrap()),
            Arc::new(TotpVerifier::new("Inventory", 1)),
            policy,
            fast_hasher(),
        );
        (service, store)
    }

    async fn enable_mfa(service: &SeaOrmAuthService, store: &Store) -> String {
        let secret = service.totp.generate_secret();
        let encrypted = service.cipher.encrypt(&secret).unwrap();
        let id = store
            .get_user_credentials("alice")
            .await
            .unwrap()
            .unwrap()
            .user
            .id;
        UserRepository::activate_mfa(&store.conn, id, encrypted, None)
            .await
            .unwrap();
        secret
    }

    fn current_code(service: &SeaOrmAuthService, secret: &str) -> String {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        service.totp.code_at(secret, now).unwrap()
    }

    #[tokio::test]
    async fn test_valid_password_without_mfa() {
        let (service, _) = setup(Arc::new(NoLockout)).await;
        let identity = service
            .authenticate("alice", "correct horse", None)
            .await
            .unwrap();
        assert_eq!(identity.username, "alice");
        assert!(identity.is_admin);
    }

    #[tokio::test]
    async fn test_unknown_user_and_wrong_password_look_the_same() {
        let (service, _) = setup(Arc::new(NoLockout)).await;
        let unknown = service
            .authenticate("mallory", "correct horse", None)
            .await
            .unwrap_err();
        let wrong = service
            .authenticate("alice", "wrong", None)
            .await
            .unwrap_err();
        assert_eq!(unknown, AuthError::InvalidCredentials);
        assert_eq!(unknown, wrong);
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_mfa_gating() {
        let (service, store) = setup(Arc::new(NoLockout)).await;
        let secret = enable_mfa(&service, &store).await;

        assert_eq!(
            service.authenticate("alice", "correct horse", None).await,
            Err(AuthError::MfaRequired)
        );
        assert_eq!(
            service.authenticate("alice", "correct horse", Some("  ")).await,
            Err(AuthError::MfaRequired)
        );
        assert_eq!(
            service.authenticate("alice", "correct horse", Some("abc")).await,
            Err(AuthError::InvalidMfaCode)
        );

        let code = current_code(&service, &secret);
        let identity = service
            .authenticate("alice", "correct horse", Some(&code))
            .await
            .unwrap();
        assert_eq!(identity.username, "alice");
    }

    #[tokio::test]
    async fn test_totp_code_cannot_be_replayed() {
        let (service, store) = setup(Arc::new(NoLockout)).await;
        let secret = enable_mfa(&service, &store).await;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let previous = service.totp.code_at(&secret, now - 30).unwrap();
        let current = service.totp.code_at(&secret, now).unwrap();

        assert!(
            service
                .authenticate("alice", "correct horse", Some(&current))
                .await
                .is_ok()
        );
        assert_eq!(
            service
                .authenticate("alice", "correct horse", Some(&current))
                .await,
            Err(AuthError::InvalidMfaCode)
        );
        // an older step is refused once a newer one was accepted
        assert_eq!(
            service
                .authenticate("alice", "correct horse", Some(&previous))
                .await,
            Err(AuthError::InvalidMfaCode)
        );
    }

    #[tokio::test]
    async fn test_wrong_password_with_mfa_is_invalid_credentials() {
        let (service, store) = setup(Arc::new(NoLockout)).await;
        let secret = enable_mfa(&service, &store).await;
        let code = current_code(&service, &secret);

        assert_eq!(
            service.authenticate("alice", "wrong", Some(&code)).await,
            Err(AuthError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_failures_do_not_change_user_state() {
        let (service, store) = setup(Arc::new(NoLockout)).await;
        let before = store.get_user_credentials("alice").await.unwrap().unwrap();
        for _ in 0..3 {
            let _ = service.authenticate("alice", "wrong", None).await;
        }
        let after = store.get_user_credentials("alice").await.unwrap().unwrap();
        assert_eq!(before.user, after.user);
        assert_eq!(before.password_hash, after.password_hash);
    }

    #[tokio::test]
    async fn test_lockout_policy_is_consulted() {
        let config = LoginLockoutConfig {
            enabled: true,
            max_attempts: 2,
            window_seconds: 60,
            lockout_seconds: 60,
            max_tracked: 100,
        };
        let (service, _) = setup(Arc::new(AttemptLockout::new(&config))).await;

        let _ = service.authenticate("alice", "wrong", None).await;
        let _ = service.authenticate("alice", "wrong", None).await;

        let err = service
            .authenticate("alice", "correct horse", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Locked { .. }));
        assert_eq!(err.code(), "account_locked");
    }
}
