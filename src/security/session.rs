//! Stateless session tokens.
//!
//! A session is an HS256-signed token carrying the operator's id, username
//! and admin flag. Nothing is stored server side; a token stays valid until
//! it expires, even if the user's role changes meanwhile.

use chrono::{DateTime, Duration, Utc};
use cookie::{Cookie, SameSite};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::constants::session::COOKIE_NAME;

/// The authenticated principal carried by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    username: String,
    is_admin: bool,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session expired")]
    Expired,

    #[error("invalid session token")]
    Invalid,

    #[error("failed to sign session token")]
    Signing,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
    secure_cookie: bool,
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("ttl", &self.ttl)
            .field("secure_cookie", &self.secure_cookie)
            .finish_non_exhaustive()
    }
}

impl SessionKeys {
    #[must_use]
    pub fn new(secret: &[u8], ttl_hours: u32, secure_cookie: bool) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::hours(i64::from(ttl_hours)),
            secure_cookie,
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, identity: &Identity) -> Result<IssuedSession, SessionError> {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, SessionError> {
        let expires_at = now + self.ttl;
        let claims = SessionClaims {
            sub: identity.id.to_string(),
            username: identity.username.clone(),
            is_admin: identity.is_admin,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| SessionError::Signing)?;

        Ok(IssuedSession { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<Identity, SessionError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid,
            },
        )?;

        let claims = data.claims;
        let id = claims.sub.parse().map_err(|_| SessionError::Invalid)?;

        Ok(Identity {
            id,
            username: claims.username,
            is_admin: claims.is_admin,
        })
    }

    /// `HttpOnly; SameSite=Lax; Path=/` cookie carrying the token.
    #[must_use]
    pub fn session_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build((COOKIE_NAME, token.to_string()))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(self.ttl.num_seconds()))
            .build()
    }

    #[must_use]
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((COOKIE_NAME, ""))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::ZERO)
            .expires(time::OffsetDateTime::UNIX_EPOCH)
            .build()
    }
}

/// Pulls the session token out of a `Cookie` header value.
#[must_use]
pub fn token_from_cookie_header(header: &str) -> Option<String> {
    Cookie::split_parse(header)
        .filter_map(Result::ok)
        .find(|c| c.name() == COOKIE_NAME && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::new(b"test-session-secret", 8, true)
    }

    fn identity() -> Identity {
        Identity {
            id: 7,
            username: "ops".to_string(),
            is_admin: true,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let keys = keys();
        let issued = keys.issue(&identity()).unwrap();
        assert_eq!(keys.verify(&issued.token).unwrap(), identity());
    }

    #[test]
    fn test_ttl_is_eight_hours() {
        let keys = keys();
        let now = Utc::now();
        let issued = keys.issue_at(&identity(), now).unwrap();
        assert_eq!(issued.expires_at - now, Duration::hours(8));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = keys();
        let issued = keys
            .issue_at(&identity(), Utc::now() - Duration::hours(9))
            .unwrap();
        assert_eq!(keys.verify(&issued.token), Err(SessionError::Expired));
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let issued = SessionKeys::new(b"other-secret", 8, true)
            .issue(&identity())
            .unwrap();
        assert_eq!(keys().verify(&issued.token), Err(SessionError::Invalid));
        assert_eq!(keys().verify("garbage"), Err(SessionError::Invalid));
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = keys().session_cookie("abc").to_string();
        assert!(cookie.starts_with("session=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Max-Age=28800"));
    }

    #[test]
    fn test_token_from_cookie_header() {
        assert_eq!(
            token_from_cookie_header("theme=dark; session=tok123").as_deref(),
            Some("tok123")
        );
        assert_eq!(token_from_cookie_header("theme=dark"), None);
        assert_eq!(token_from_cookie_header("session="), None);
    }
}
