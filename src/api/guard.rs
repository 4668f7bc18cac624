//! Per-route request authorization.
//!
//! Every route is wrapped by [`enforce`] with its own [`RoutePolicy`]. The
//! guard runs the same fixed sequence for each request: rate limit keyed by
//! route and client address, session resolution, the cross-site origin check
//! for cookie sessions, then the admin check. Only when all of them pass does
//! the handler run, with the caller's [`Identity`] and [`ClientIp`] available
//! as request extensions.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

use super::{ApiError, AppState};
use crate::config::RateLimitConfig;
use crate::security::{Identity, SessionKeys, session::token_from_cookie_header};
use crate::services::Actor;

/// Which configured limit a route draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitClass {
    Read,
    Create,
    Update,
    Delete,
    Login,
    Sensitive,
}

impl LimitClass {
    #[must_use]
    pub const fn limit(self, config: &RateLimitConfig) -> u32 {
        match self {
            Self::Read => config.read_limit,
            Self::Create => config.create_limit,
            Self::Update => config.update_limit,
            Self::Delete => config.delete_limit,
            Self::Login => config.login_limit,
            Self::Sensitive => config.sensitive_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Admin,
}

#[derive(Debug, Clone, Copy)]
pub struct RoutePolicy {
    /// Rate limit bucket name, also used as the metrics label.
    pub name: &'static str,
    pub class: LimitClass,
    pub access: Access,
}

impl RoutePolicy {
    pub const fn public(name: &'static str, class: LimitClass) -> Self {
        Self {
            name,
            class,
            access: Access::Public,
        }
    }

    pub const fn authenticated(name: &'static str, class: LimitClass) -> Self {
        Self {
            name,
            class,
            access: Access::Authenticated,
        }
    }

    pub const fn admin(name: &'static str, class: LimitClass) -> Self {
        Self {
            name,
            class,
            access: Access::Admin,
        }
    }
}

/// Resolved client address, as text. `"unknown"` when it cannot be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

pub const UNKNOWN_IP: &str = "unknown";

/// The socket peer, unless that peer is a trusted proxy, in which case the
/// first `X-Forwarded-For` entry wins.
pub fn resolve_client_ip(peer: Option<IpAddr>, headers: &HeaderMap, trusted: &[IpAddr]) -> String {
    let Some(peer) = peer else {
        return UNKNOWN_IP.to_string();
    };

    if trusted.contains(&peer)
        && let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .and_then(|v| v.parse::<IpAddr>().ok())
    {
        return forwarded.to_string();
    }

    peer.to_string()
}

/// Where a request's session token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Sent by the browser on its own, so exposed to cross-site forgery.
    Cookie,
    Bearer,
}

/// Session token from the `session` cookie, else `Authorization: Bearer`.
fn session_token(headers: &HeaderMap) -> Option<(String, TokenSource)> {
    if let Some(token) = headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(token_from_cookie_header)
    {
        return Some((token, TokenSource::Cookie));
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| (t.to_string(), TokenSource::Bearer))
}

pub fn authenticate_headers(
    sessions: &SessionKeys,
    headers: &HeaderMap,
) -> Result<(Identity, TokenSource), ApiError> {
    let (token, source) = session_token(headers).ok_or(ApiError::Unauthenticated)?;
    let identity = sessions.verify(&token).map_err(|e| {
        debug!(error = %e, "Rejected session token");
        ApiError::Unauthenticated
    })?;
    Ok((identity, source))
}

/// Whether a state-changing request comes from this site or a configured
/// CORS origin.
///
/// `Origin` is checked first, then `Referer`. Requests carrying neither are
/// let through, as browsers always send one of them on cross-site writes.
pub fn same_origin(headers: &HeaderMap, allowed_origins: &[String]) -> bool {
    let Some(source) = [header::ORIGIN, header::REFERER]
        .iter()
        .find_map(|name| headers.get(name).and_then(|h| h.to_str().ok()))
    else {
        return true;
    };

    let Ok(url) = url::Url::parse(source) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let matches_host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| h.eq_ignore_ascii_case(&authority));
    if matches_host {
        return true;
    }

    allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| url::Url::parse(o).ok())
        .any(|o| o.origin() == url.origin())
}

pub async fn enforce(
    State((state, policy)): State<(Arc<AppState>, RoutePolicy)>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let ip = resolve_client_ip(peer, request.headers(), &state.shared.trusted_proxies);

    let limit = policy.class.limit(&state.config().rate_limits);
    let key = format!("{}:{}", policy.name, ip);
    if let Err(exceeded) = state.rate_limiter().check(limit, &key) {
        metrics::counter!("rate_limit_rejections_total", "route" => policy.name).increment(1);
        debug!(route = policy.name, ip = %ip, "Rate limit exceeded");
        return Err(exceeded.into());
    }

    if policy.access != Access::Public {
        let (identity, source) = authenticate_headers(state.sessions(), request.headers())?;
        tracing::Span::current().record("user_id", identity.id);

        if source == TokenSource::Cookie
            && !request.method().is_safe()
            && !same_origin(request.headers(), &state.config().server.cors_allowed_origins)
        {
            debug!(route = policy.name, user_id = identity.id, "Cross-site request refused");
            return Err(ApiError::Forbidden);
        }

        if policy.access == Access::Admin && !identity.is_admin {
            debug!(route = policy.name, user_id = identity.id, "Admin route refused");
            return Err(ApiError::Forbidden);
        }

        request.extensions_mut().insert(identity);
    }

    request.extensions_mut().insert(ClientIp(ip));
    Ok(next.run(request).await)
}

/// The authenticated operator behind a request, ready to be recorded as the
/// actor of an audited change.
#[derive(Debug, Clone)]
pub struct Caller(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(ApiError::Unauthenticated)?;
        let ip = parts
            .extensions
            .get::<ClientIp>()
            .map_or_else(|| UNKNOWN_IP.to_string(), |ip| ip.0.clone());

        Ok(Self(Actor::new(identity, ip)))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or_else(|| Self(UNKNOWN_IP.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_untrusted_peer_ignores_forwarded_for() {
        let peer: IpAddr = "203.0.113.9".parse().unwrap();
        let ip = resolve_client_ip(Some(peer), &forwarded("10.1.1.1"), &[]);
        assert_eq!(ip, "203.0.113.9");
    }

    #[test]
    fn test_trusted_proxy_uses_first_forwarded_entry() {
        let proxy: IpAddr = "127.0.0.1".parse().unwrap();
        let ip = resolve_client_ip(
            Some(proxy),
            &forwarded("198.51.100.7, 10.0.0.1"),
            &[proxy],
        );
        assert_eq!(ip, "198.51.100.7");

        let garbage = resolve_client_ip(Some(proxy), &forwarded("not-an-ip"), &[proxy]);
        assert_eq!(garbage, "127.0.0.1");
    }

    #[test]
    fn test_missing_peer_is_unknown() {
        assert_eq!(resolve_client_ip(None, &HeaderMap::new(), &[]), UNKNOWN_IP);
    }

    #[test]
    fn test_session_token_sources() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def"),
        );
        assert_eq!(
            session_token(&headers),
            Some(("abc.def".to_string(), TokenSource::Bearer))
        );

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=from-cookie"),
        );
        assert_eq!(
            session_token(&headers),
            Some(("from-cookie".to_string(), TokenSource::Cookie))
        );

        assert!(session_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_limit_classes_map_to_config() {
        let config = RateLimitConfig::default();
        assert_eq!(LimitClass::Delete.limit(&config), config.delete_limit);
        assert_eq!(LimitClass::Login.limit(&config), config.login_limit);
    }

    fn origin_headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(name.clone(), HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_same_origin_checks() {
        let host = (header::HOST, "inventory.local:3000");

        assert!(same_origin(&origin_headers(&[host.clone()]), &[]));
        assert!(same_origin(
            &origin_headers(&[host.clone(), (header::ORIGIN, "http://inventory.local:3000")]),
            &[]
        ));
        assert!(!same_origin(
            &origin_headers(&[host.clone(), (header::ORIGIN, "https://evil.example")]),
            &[]
        ));
        assert!(!same_origin(
            &origin_headers(&[host.clone(), (header::ORIGIN, "null")]),
            &[]
        ));
        assert!(same_origin(
            &origin_headers(&[
                host.clone(),
                (header::REFERER, "http://inventory.local:3000/clients?page=2"),
            ]),
            &[]
        ));

        let allowed = vec!["https://admin.example".to_string(), "*".to_string()];
        assert!(same_origin(
            &origin_headers(&[host.clone(), (header::ORIGIN, "https://admin.example")]),
            &allowed
        ));
        assert!(!same_origin(
            &origin_headers(&[host, (header::ORIGIN, "https://other.example")]),
            &allowed
        ));
    }
}
