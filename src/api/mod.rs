use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{MethodRouter, delete, get, post, put},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::security::{RateLimiter, SessionKeys};
use crate::services::{
    AuditRecorder, AuthService, ClientService, NetworkService, ProjectService, UserService,
    VpuUserService,
};
use crate::state::SharedState;

mod audit;
pub mod auth;
mod clients;
mod error;
pub mod guard;
mod networks;
mod observability;
mod projects;
mod types;
mod users;
pub mod validation;
mod vpu_users;

pub use error::ApiError;
pub use guard::{Access, LimitClass, RoutePolicy};
pub use observability::CONTENT_SECURITY_POLICY;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionKeys {
        &self.shared.sessions
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.shared.rate_limiter
    }

    #[must_use]
    pub fn audit(&self) -> &AuditRecorder {
        &self.shared.audit
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn clients(&self) -> &ClientService {
        &self.shared.clients
    }

    #[must_use]
    pub fn projects(&self) -> &ProjectService {
        &self.shared.projects
    }

    #[must_use]
    pub fn networks(&self) -> &NetworkService {
        &self.shared.networks
    }

    #[must_use]
    pub fn vpu_users(&self) -> &VpuUserService {
        &self.shared.vpu_users
    }

    #[must_use]
    pub fn users(&self) -> &UserService {
        &self.shared.users
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().server.cors_allowed_origins.clone();

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", create_api_router(&state))
        .route("/health", get(observability::health))
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wraps one method route in the authorization guard with its own policy.
fn guarded(
    state: &Arc<AppState>,
    policy: RoutePolicy,
    route: MethodRouter<Arc<AppState>>,
) -> MethodRouter<Arc<AppState>> {
    route.route_layer(middleware::from_fn_with_state(
        (state.clone(), policy),
        guard::enforce,
    ))
}

fn create_api_router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    use LimitClass::{Create, Delete, Login, Read, Sensitive, Update};

    let public = RoutePolicy::public;
    let authed = RoutePolicy::authenticated;
    let admin = RoutePolicy::admin;
    let g = |policy, route| guarded(state, policy, route);

    Router::new()
        .route(
            "/auth/login",
            g(public("auth.login", Login), post(auth::login)),
        )
        .route(
            "/auth/logout",
            g(authed("auth.logout", Update), post(auth::logout)),
        )
        .route("/auth/me", g(authed("auth.me", Read), get(auth::me)))
        .route(
            "/clients",
            g(authed("clients.list", Read), get(clients::list_clients))
                .merge(g(admin("clients.create", Create), post(clients::create_client))),
        )
        .route(
            "/clients/{id}",
            g(authed("clients.get", Read), get(clients::get_client))
                .merge(g(admin("clients.update", Update), put(clients::update_client)))
                .merge(g(
                    admin("clients.delete", Delete),
                    delete(clients::delete_client),
                )),
        )
        .route(
            "/projects",
            g(authed("projects.list", Read), get(projects::list_projects)).merge(g(
                admin("projects.create", Create),
                post(projects::create_project),
            )),
        )
        .route(
            "/projects/{id}",
            g(authed("projects.get", Read), get(projects::get_project))
                .merge(g(
                    admin("projects.update", Update),
                    put(projects::update_project),
                ))
                .merge(g(
                    admin("projects.delete", Delete),
                    delete(projects::delete_project),
                )),
        )
        .route(
            "/networks",
            g(authed("networks.list", Read), get(networks::list_networks)).merge(g(
                admin("networks.create", Create),
                post(networks::create_network),
            )),
        )
        .route(
            "/networks/{id}",
            g(authed("networks.get", Read), get(networks::get_network))
                .merge(g(
                    admin("networks.update", Update),
                    put(networks::update_network),
                ))
                .merge(g(
                    admin("networks.delete", Delete),
                    delete(networks::delete_network),
                )),
        )
        .route(
            "/vpu-users",
            g(authed("vpu_users.list", Read), get(vpu_users::list_vpu_users)).merge(g(
                admin("vpu_users.create", Create),
                post(vpu_users::create_vpu_user),
            )),
        )
        .route(
            "/vpu-users/{id}",
            g(authed("vpu_users.get", Read), get(vpu_users::get_vpu_user))
                .merge(g(
                    admin("vpu_users.update", Update),
                    put(vpu_users::update_vpu_user),
                ))
                .merge(g(
                    admin("vpu_users.delete", Delete),
                    delete(vpu_users::delete_vpu_user),
                )),
        )
        .route(
            "/users",
            g(admin("users.list", Sensitive), get(users::list_users))
                .merge(g(admin("users.create", Create), post(users::create_user))),
        )
        .route(
            "/users/{id}",
            g(admin("users.update", Update), put(users::update_user)),
        )
        // Admin or self; the service decides.
        .route(
            "/users/{id}/mfa",
            g(authed("users.mfa.enable", Update), post(users::enable_mfa)).merge(g(
                authed("users.mfa.disable", Update),
                delete(users::disable_mfa),
            )),
        )
        .route(
            "/users/{id}/mfa/confirm",
            g(authed("users.mfa.confirm", Update), post(users::confirm_mfa)),
        )
        .route(
            "/audit",
            g(admin("audit.list", Sensitive), get(audit::list_audit)),
        )
        .route(
            "/metrics",
            g(
                admin("metrics", Sensitive),
                get(observability::get_metrics),
            ),
        )
}
