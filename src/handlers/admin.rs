//! Admin API handlers: consistency tooling and backups.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::errors::ServiceError;
use crate::AppState;

/// `GET /admin/audit` — compare catalog entries against stored blobs.
#[utoipa::path(
    get,
    path = "/admin/audit",
    tag = "Admin",
    operation_id = "Audit",
    responses((status = 200, description = "Audit report: health flag plus issues"))
)]
pub async fn audit(State(state): State<Arc<AppState>>) -> Result<Response, ServiceError> {
    let report = state.auditor.audit().await?;
    Ok(Json(report).into_response())
}

/// `POST /admin/repair` — reconcile catalog and blob store divergence.
#[utoipa::path(
    post,
    path = "/admin/repair",
    tag = "Admin",
    operation_id = "Repair",
    responses((status = 200, description = "Actions taken plus advisory warnings"))
)]
pub async fn repair(State(state): State<Arc<AppState>>) -> Result<Response, ServiceError> {
    let report = state.auditor.repair().await?;
    Ok(Json(report).into_response())
}

/// `POST /admin/backups` — archive the current catalog.
#[utoipa::path(
    post,
    path = "/admin/backups",
    tag = "Admin",
    operation_id = "CreateBackup",
    responses((status = 200, description = "Details of the new archive"))
)]
pub async fn create_backup(
    State(state): State<Arc<AppState>>,
) -> Result<Response, ServiceError> {
    let info = state.backups.create_backup().await?;
    Ok(Json(info).into_response())
}

/// `GET /admin/backups` — enumerate archives, newest first.
#[utoipa::path(
    get,
    path = "/admin/backups",
    tag = "Admin",
    operation_id = "ListBackups",
    responses((status = 200, description = "Archive names and timestamps"))
)]
pub async fn list_backups(
    State(state): State<Arc<AppState>>,
) -> Result<Response, ServiceError> {
    let listing = state.backups.list_backups()?;
    Ok(Json(serde_json::json!({ "backups": listing })).into_response())
}
