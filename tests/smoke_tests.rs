//! End-to-end inventory flows: encryption at rest, audit trail, cascades.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use inventory_admin::api::AppState;
use inventory_admin::config::{AuditFailureMode, Config, SecretValue};
use inventory_admin::services::{Actor, NewUserInput};
use sea_orm::ConnectionTrait;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const FIELD_KEY: &str = "1f1e1d1c1b1a191817161514131211100f0e0d0c0b0a09080706050403020100";
const ADMIN_PASSWORD: &str = "smoke-admin-password";

async fn spawn_app(failure_mode: AuditFailureMode) -> (Arc<AppState>, Router, String) {
    let mut config = Config::default();
    config.general.database_url = "sqlite::memory:".to_string();
    config.server.secure_cookies = false;
    config.security.field_encryption_key = SecretValue::new(FIELD_KEY);
    config.security.session_secret = SecretValue::new("smoke-test-session-secret");
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.security.argon2_parallelism = 1;
    config.observability.metrics_enabled = false;
    config.audit.failure_mode = failure_mode;
    config.rate_limits.read_limit = 200;
    config.rate_limits.create_limit = 200;
    config.rate_limits.update_limit = 200;
    config.rate_limits.delete_limit = 200;
    config.rate_limits.sensitive_limit = 200;

    let state = inventory_admin::api::create_app_state_from_config(config, None)
        .await
        .expect("failed to create app state");

    state
        .users()
        .create(
            &Actor::system(),
            &NewUserInput {
                username: "admin".to_string(),
                password: ADMIN_PASSWORD.to_string(),
                is_admin: true,
            },
        )
        .await
        .expect("failed to seed admin");

    let router = inventory_admin::api::router(state.clone());

    let (status, body) = call(
        &router,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "admin", "password": ADMIN_PASSWORD, "bearer": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    (state, router, token)
}

async fn call(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn id_of(body: &Value) -> i64 {
    body["data"]["id"]
        .as_i64()
        .unwrap_or_else(|| panic!("no id in {body}"))
}

/// Creates the Acme client with one project, one network in that project
/// and one VPU user. Returns their ids in that order.
async fn seed_acme(router: &Router, token: &str) -> (i64, i64, i64, i64) {
    let (status, body) = call(
        router,
        "POST",
        "/api/clients",
        Some(token),
        Some(json!({
            "name": "Acme Corp",
            "contact_name": "Wile E. Coyote",
            "contact_email": "wile@acme.example",
            "notes": "Prefers rockets",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let client_id = id_of(&body);

    let (status, body) = call(
        router,
        "POST",
        "/api/projects",
        Some(token),
        Some(json!({ "client_id": client_id, "name": "Roadrunner Tracking" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "active");
    let project_id = id_of(&body);

    let (status, body) = call(
        router,
        "POST",
        "/api/networks",
        Some(token),
        Some(json!({
            "client_id": client_id,
            "project_id": project_id,
            "cidr": "10.20.0.9/24",
            "vlan_id": 120,
            "gateway": "10.20.0.1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["cidr"], "10.20.0.0/24");
    let network_id = id_of(&body);

    let (status, body) = call(
        router,
        "POST",
        "/api/vpu-users",
        Some(token),
        Some(json!({
            "client_id": client_id,
            "username": "wcoyote",
            "full_name": "Wile E. Coyote",
            "email": "wile@acme.example",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let vpu_user_id = id_of(&body);

    (client_id, project_id, network_id, vpu_user_id)
}

#[tokio::test]
async fn test_acme_end_to_end() {
    let (state, router, token) = spawn_app(AuditFailureMode::FailOpen).await;
    let (client_id, _, _, vpu_user_id) = seed_acme(&router, &token).await;
    let client_id = i32::try_from(client_id).unwrap();

    // Stored encrypted, served decrypted
    let stored = state
        .store()
        .clients()
        .get(client_id)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored.name_encrypted, "Acme Corp");
    assert!(stored.name_encrypted.contains(':'));
    assert_eq!(stored.notes.as_deref(), Some("Prefers rockets"));

    let stored_vpu = state
        .store()
        .vpu_users()
        .get(i32::try_from(vpu_user_id).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored_vpu.username_encrypted, "wcoyote");

    let (status, body) = call(
        &router,
        "GET",
        &format!("/api/clients/{client_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Acme Corp");
    assert_eq!(body["data"]["contact_email"], "wile@acme.example");

    let (_, body) = call(
        &router,
        "GET",
        &format!("/api/vpu-users?client_id={client_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["data"][0]["username"], "wcoyote");

    // Full replacement: omitted optional fields are cleared
    let (status, body) = call(
        &router,
        "PUT",
        &format!("/api/clients/{client_id}"),
        Some(&token),
        Some(json!({ "name": "Acme Corporation", "contact_email": "ops@acme.example" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Acme Corporation");
    assert!(body["data"]["contact_name"].is_null());

    let (status, body) = call(
        &router,
        "GET",
        &format!("/api/audit?entity_type=client&entity_id={client_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);

    let update = &body["data"]["items"][0];
    assert_eq!(update["action"], "UPDATE");
    assert_eq!(update["old_values"]["name"], "Acme Corp");
    assert_eq!(update["new_values"]["name"], "Acme Corporation");
    assert_eq!(update["ip_address"], "unknown");

    let create = &body["data"]["items"][1];
    assert_eq!(create["action"], "CREATE");
    assert!(create["old_values"].is_null());
    assert_eq!(create["new_values"]["contact_name"], "Wile E. Coyote");

    let (_, body) = call(
        &router,
        "GET",
        "/api/audit?action=CREATE",
        Some(&token),
        None,
    )
    .await;
    let entity_types: Vec<&str> = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["entity_type"].as_str().unwrap())
        .collect();
    for expected in ["client", "project", "network", "vpu_user", "user"] {
        assert!(entity_types.contains(&expected), "missing {expected}");
    }
}

#[tokio::test]
async fn test_client_delete_cascades_in_one_transaction() {
    let (state, router, token) = spawn_app(AuditFailureMode::FailOpen).await;
    let (client_id, project_id, network_id, vpu_user_id) = seed_acme(&router, &token).await;

    // A second client that must be untouched
    let (_, body) = call(
        &router,
        "POST",
        "/api/clients",
        Some(&token),
        Some(json!({ "name": "Globex" })),
    )
    .await;
    let other_id = id_of(&body);

    let (status, _) = call(
        &router,
        "DELETE",
        &format!("/api/clients/{client_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for uri in [
        format!("/api/clients/{client_id}"),
        format!("/api/projects/{project_id}"),
        format!("/api/networks/{network_id}"),
        format!("/api/vpu-users/{vpu_user_id}"),
    ] {
        let (status, body) = call(&router, "GET", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["code"], "not_found");
    }

    let (status, _) = call(
        &router,
        "GET",
        &format!("/api/clients/{other_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let page = state
        .audit()
        .list(
            &inventory_admin::db::AuditFilter {
                action: Some("DELETE".to_string()),
                ..Default::default()
            },
            1,
            50,
        )
        .await
        .unwrap();
    let mut deleted: Vec<(String, i32)> = page
        .items
        .iter()
        .map(|e| (e.entity_type.clone(), e.entity_id))
        .collect();
    deleted.sort();
    assert_eq!(
        deleted,
        vec![
            ("client".to_string(), i32::try_from(client_id).unwrap()),
            ("network".to_string(), i32::try_from(network_id).unwrap()),
            ("project".to_string(), i32::try_from(project_id).unwrap()),
            ("vpu_user".to_string(), i32::try_from(vpu_user_id).unwrap()),
        ]
    );

    let (status, _) = call(
        &router,
        "DELETE",
        &format!("/api/clients/{client_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_cascade_leaves_everything_in_place() {
    let (state, router, token) = spawn_app(AuditFailureMode::FailOpen).await;
    let (client_id, project_id, network_id, vpu_user_id) = seed_acme(&router, &token).await;

    state
        .store()
        .conn
        .execute_unprepared(
            "CREATE TRIGGER refuse_project_delete BEFORE DELETE ON projects \
             BEGIN SELECT RAISE(ABORT, 'project delete refused'); END",
        )
        .await
        .unwrap();

    let (status, body) = call(
        &router,
        "DELETE",
        &format!("/api/clients/{client_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "internal_error");

    for uri in [
        format!("/api/clients/{client_id}"),
        format!("/api/projects/{project_id}"),
        format!("/api/networks/{network_id}"),
        format!("/api/vpu-users/{vpu_user_id}"),
    ] {
        let (status, _) = call(&router, "GET", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }

    let page = state
        .audit()
        .list(
            &inventory_admin::db::AuditFilter {
                action: Some("DELETE".to_string()),
                ..Default::default()
            },
            1,
            50,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_project_delete_detaches_networks() {
    let (_state, router, token) = spawn_app(AuditFailureMode::FailOpen).await;
    let (_, project_id, network_id, _) = seed_acme(&router, &token).await;

    let (status, _) = call(
        &router,
        "DELETE",
        &format!("/api/projects/{project_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &router,
        "GET",
        &format!("/api/networks/{network_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["project_id"].is_null());

    let (_, body) = call(
        &router,
        "GET",
        &format!("/api/audit?entity_type=network&entity_id={network_id}&action=UPDATE"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(
        body["data"]["items"][0]["old_values"]["project_id"],
        project_id
    );
    assert!(body["data"]["items"][0]["new_values"]["project_id"].is_null());
}

#[tokio::test]
async fn test_network_references_and_shape_are_validated() {
    let (_state, router, token) = spawn_app(AuditFailureMode::FailOpen).await;
    let (_, project_id, _, _) = seed_acme(&router, &token).await;

    let (_, body) = call(
        &router,
        "POST",
        "/api/clients",
        Some(&token),
        Some(json!({ "name": "Globex" })),
    )
    .await;
    let other_client = id_of(&body);

    let (status, body) = call(
        &router,
        "POST",
        "/api/networks",
        Some(&token),
        Some(json!({
            "client_id": other_client,
            "project_id": project_id,
            "cidr": "192.168.0.0/16",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["project_id"].is_string());

    let (status, body) = call(
        &router,
        "POST",
        "/api/networks",
        Some(&token),
        Some(json!({
            "client_id": other_client,
            "cidr": "192.168.0.0/33",
            "vlan_id": 5000,
            "gateway": "10.0.0.1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["cidr"].is_string());
    assert!(body["fields"]["vlan_id"].is_string());

    let (status, body) = call(
        &router,
        "POST",
        "/api/projects",
        Some(&token),
        Some(json!({ "client_id": 9999, "name": "Orphan" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"]["client_id"], "client does not exist");

    let (status, body) = call(
        &router,
        "POST",
        "/api/clients",
        Some(&token),
        Some(json!({ "name": "", "contact_email": "not-an-email" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["name"].is_string());
    assert!(body["fields"]["contact_email"].is_string());

    let (status, _) = call(
        &router,
        "POST",
        "/api/clients",
        Some(&token),
        Some(json!({ "contact_name": "missing name field" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fail_closed_mode_commits_mutation_with_its_entry() {
    let (state, router, token) = spawn_app(AuditFailureMode::FailClosed).await;
    assert_eq!(state.audit().mode(), AuditFailureMode::FailClosed);

    let (client_id, _, _, _) = seed_acme(&router, &token).await;

    let (status, body) = call(
        &router,
        "GET",
        &format!("/api/audit?entity_type=client&entity_id={client_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["action"], "CREATE");
}

#[tokio::test]
async fn test_audit_pagination() {
    let (_state, router, token) = spawn_app(AuditFailureMode::FailOpen).await;

    for name in ["One", "Two", "Three"] {
        let (status, _) = call(
            &router,
            "POST",
            "/api/clients",
            Some(&token),
            Some(json!({ "name": name })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = call(
        &router,
        "GET",
        "/api/audit?entity_type=client&page=1&page_size=2",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["total_pages"], 2);
    assert_eq!(body["data"]["items"][0]["new_values"]["name"], "Three");
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

    let (_, body) = call(
        &router,
        "GET",
        "/api/audit?entity_type=client&page=2&page_size=2",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["data"]["items"][0]["new_values"]["name"], "One");
}
