use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use super::validation::validate_page;
use super::{ApiError, ApiResponse, AppState, Paginated};
use crate::constants::limits::DEFAULT_PAGE_SIZE;
use crate::db::AuditFilter;
use crate::entities::audit_logs;
use crate::services::AuditAction;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<i32>,
    pub user_id: Option<i32>,
}

const fn default_page() -> u64 {
    1
}

const fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Serialize)]
pub struct AuditEntryDto {
    pub id: i64,
    pub user_id: i32,
    pub action: String,
    pub entity_type: String,
    pub entity_id: i32,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub ip_address: String,
    pub timestamp: String,
}

/// Snapshots are stored as JSON text; anything unparseable is passed through
/// as a plain string.
fn snapshot(raw: Option<String>) -> Option<serde_json::Value> {
    raw.map(|text| serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
}

impl From<audit_logs::Model> for AuditEntryDto {
    fn from(model: audit_logs::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            action: model.action,
            entity_type: model.entity_type,
            entity_id: model.entity_id,
            old_values: snapshot(model.old_values),
            new_values: snapshot(model.new_values),
            ip_address: model.ip_address,
            timestamp: model.timestamp,
        }
    }
}

/// GET /audit
/// Newest first, filterable by action, entity and user
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<Paginated<AuditEntryDto>>>, ApiError> {
    let (page, page_size) = validate_page(query.page, query.page_size)?;

    let action = query
        .action
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .map(|a| {
            AuditAction::from_str(a.trim())
                .map_err(|_| ApiError::validation("action", format!("unknown action '{a}'")))
        })
        .transpose()?;

    let filter = AuditFilter {
        action: action.map(|a| a.as_str().to_string()),
        entity_type: query.entity_type.filter(|t| !t.trim().is_empty()),
        entity_id: query.entity_id,
        user_id: query.user_id,
    };

    let result = state.audit().list(&filter, page, page_size).await?;

    Ok(Json(ApiResponse::success(Paginated {
        items: result.items.into_iter().map(AuditEntryDto::from).collect(),
        total: result.total,
        page,
        page_size,
        total_pages: result.total_pages,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_parsing() {
        assert_eq!(snapshot(None), None);
        assert_eq!(
            snapshot(Some(r#"{"name":"Acme"}"#.to_string())),
            Some(serde_json::json!({"name": "Acme"}))
        );
        assert_eq!(
            snapshot(Some("not json".to_string())),
            Some(serde_json::Value::String("not json".to_string()))
        );
    }
}
