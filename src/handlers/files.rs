//! File-level API handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;

use crate::errors::ServiceError;
use crate::export;
use crate::server::Identity;
use crate::service::{BulkOutcome, PutRequest};
use crate::AppState;

// -- Request bodies -----------------------------------------------------------

/// JSON body for single and bulk uploads.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PutFileBody {
    /// Record id; omitted on create.
    #[serde(default)]
    pub id: Option<String>,
    /// File name including extension.
    pub name: String,
    /// MIME content type; defaults to application/octet-stream.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Uploader display name; defaults to the authenticated username.
    #[serde(default)]
    pub uploader_name: Option<String>,
    /// File content, base64-encoded.
    pub content: String,
}

/// JSON body for `POST /files/bulk`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BulkPutBody {
    pub files: Vec<PutFileBody>,
}

/// Query parameters for `GET /files/search`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Substring matched against name, uploader, and mime type.
    #[serde(default)]
    pub q: String,
}

/// Query parameters for `GET /files/export`.
#[derive(Debug, Deserialize)]
pub struct ExportParams {
    /// Output format: `json` (default) or `csv`.
    #[serde(default = "default_export_format")]
    pub format: String,
}

fn default_export_format() -> String {
    "json".to_string()
}

impl PutFileBody {
    /// Split the body into service-level request fields plus decoded bytes.
    fn into_request(self, identity: &Identity) -> Result<(PutRequest, Bytes), ServiceError> {
        let content = base64::engine::general_purpose::STANDARD
            .decode(self.content.as_bytes())
            .map_err(|e| ServiceError::InvalidArgument {
                message: format!("content is not valid base64: {e}"),
            })?;
        Ok((
            PutRequest {
                id: self.id,
                name: self.name,
                mime_type: self
                    .mime_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                uploader_name: self
                    .uploader_name
                    .unwrap_or_else(|| identity.0.clone()),
            },
            Bytes::from(content),
        ))
    }
}

// -- Handlers -----------------------------------------------------------------

/// `GET /files` — list the caller's files with blob liveness flags.
#[utoipa::path(
    get,
    path = "/files",
    tag = "Files",
    operation_id = "ListFiles",
    responses(
        (status = 200, description = "Listing of the caller's files"),
        (status = 401, description = "Missing or wrong credentials")
    )
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, ServiceError> {
    let entries = state.service.list_by_owner(&identity.0).await?;
    Ok(Json(serde_json::json!({ "files": entries })).into_response())
}

/// `GET /files/{id}` — fetch one file's content.
#[utoipa::path(
    get,
    path = "/files/{id}",
    tag = "Files",
    operation_id = "GetFile",
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "Raw file content"),
        (status = 404, description = "No such file for this owner"),
        (status = 500, description = "Blob could not be read")
    )
)]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let (record, content) = state.service.get(&id, &identity.0).await?;

    let mut response = content.into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&record.mime_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&record.name) {
        headers.insert("x-file-name", value);
    }
    Ok(response)
}

/// `PUT /files` — create or overwrite a file.
#[utoipa::path(
    put,
    path = "/files",
    tag = "Files",
    operation_id = "PutFile",
    responses(
        (status = 201, description = "File stored"),
        (status = 415, description = "Extension not on the allow-list"),
        (status = 400, description = "Malformed body")
    )
)]
pub async fn put_file(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<PutFileBody>,
) -> Result<Response, ServiceError> {
    let (request, content) = body.into_request(&identity)?;
    let (record, warnings) = state.service.put(&identity.0, request, content).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "file": record, "warnings": warnings })),
    )
        .into_response())
}

/// `DELETE /files/{id}` — delete a file and its blob.
#[utoipa::path(
    delete,
    path = "/files/{id}",
    tag = "Files",
    operation_id = "DeleteFile",
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File deleted; body lists advisory warnings"),
        (status = 404, description = "No such file for this owner")
    )
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let outcome = state.service.delete(&id, &identity.0).await?;
    Ok(Json(outcome).into_response())
}

/// `POST /files/bulk` — upload several files in one catalog cycle.
#[utoipa::path(
    post,
    path = "/files/bulk",
    tag = "Files",
    operation_id = "BulkPutFiles",
    responses(
        (status = 200, description = "Per-item outcomes; the batch itself never fails"),
        (status = 400, description = "Malformed body")
    )
)]
pub async fn bulk_put_files(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<BulkPutBody>,
) -> Result<Response, ServiceError> {
    // Decode failures participate as per-item outcomes, like any other
    // item-level failure.
    let mut items = Vec::new();
    let mut rejected: Vec<BulkOutcome> = Vec::new();
    for file in body.files {
        let name = file.name.clone();
        match file.into_request(&identity) {
            Ok(item) => items.push(item),
            Err(err) => rejected.push(BulkOutcome {
                name,
                result: Err(err),
            }),
        }
    }

    let (mut outcomes, warnings) = state.service.bulk_put(&identity.0, items).await?;
    outcomes.append(&mut rejected);

    let rendered: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(record) => serde_json::json!({
                "name": outcome.name,
                "ok": true,
                "file": record,
            }),
            Err(err) => serde_json::json!({
                "name": outcome.name,
                "ok": false,
                "error": { "code": err.code(), "message": err.to_string() },
            }),
        })
        .collect();

    Ok(Json(serde_json::json!({ "results": rendered, "warnings": warnings })).into_response())
}

/// `DELETE /files` — remove every file the caller owns.
#[utoipa::path(
    delete,
    path = "/files",
    tag = "Files",
    operation_id = "ClearFiles",
    responses(
        (status = 200, description = "Count of removed files plus advisory warnings")
    )
)]
pub async fn clear_files(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, ServiceError> {
    let outcome = state.service.clear_by_owner(&identity.0).await?;
    Ok(Json(outcome).into_response())
}

/// `GET /files/search?q=` — substring search over the caller's files.
#[utoipa::path(
    get,
    path = "/files/search",
    tag = "Files",
    operation_id = "SearchFiles",
    params(("q" = String, Query, description = "Search term")),
    responses((status = 200, description = "Matching file records"))
)]
pub async fn search_files(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ServiceError> {
    let hits = state.service.search(&identity.0, &params.q).await?;
    Ok(Json(serde_json::json!({ "files": hits })).into_response())
}

/// `GET /files/export?format=` — export the caller's listing as CSV or JSON.
#[utoipa::path(
    get,
    path = "/files/export",
    tag = "Files",
    operation_id = "ExportFiles",
    params(("format" = String, Query, description = "csv or json (default)")),
    responses(
        (status = 200, description = "Exported listing"),
        (status = 400, description = "Unknown format")
    )
)]
pub async fn export_files(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ServiceError> {
    let entries = state.service.list_by_owner(&identity.0).await?;
    match params.format.as_str() {
        "csv" => {
            let body = export::to_csv(&entries);
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"files.csv\"",
                    ),
                ],
                body,
            )
                .into_response())
        }
        "json" => Ok(Json(export::to_json(&entries)).into_response()),
        other => Err(ServiceError::InvalidArgument {
            message: format!("unknown export format: {other}"),
        }),
    }
}
