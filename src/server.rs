//! Axum router construction and authentication.
//!
//! The [`app`] function wires every endpoint to its handler and returns
//! a ready-to-serve [`axum::Router`].  Authentication is a flat
//! username/password lookup against the catalog's user set, supplied as
//! HTTP Basic credentials; the verified username becomes the
//! [`Identity`] scoping every file operation.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, ServiceError};
use crate::handlers;
use crate::AppState;

/// The authenticated caller's username.
///
/// Inserted by [`auth_middleware`]; every handler scopes its catalog
/// queries by this value.
#[derive(Debug, Clone)]
pub struct Identity(pub String);

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the stashd API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "stashd API",
        version = "0.1.0",
        description = "Single-tenant file catalog and blob storage service"
    ),
    paths(
        health_check,
        // File operations
        handlers::files::list_files,
        handlers::files::get_file,
        handlers::files::put_file,
        handlers::files::delete_file,
        handlers::files::bulk_put_files,
        handlers::files::clear_files,
        handlers::files::search_files,
        handlers::files::export_files,
        // Admin operations
        handlers::admin::audit,
        handlers::admin::repair,
        handlers::admin::create_backup,
        handlers::admin::list_backups,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Files", description = "Per-owner file operations"),
        (name = "Admin", description = "Consistency tooling and backups"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes.
pub fn app(state: Arc<AppState>) -> Router {
    let max_body = state.config.server.max_file_size as usize;

    Router::new()
        // Infrastructure endpoints (unauthenticated).
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_spec))
        // File operations. Static segments before the :id capture.
        .route(
            "/files",
            get(handlers::files::list_files)
                .put(handlers::files::put_file)
                .delete(handlers::files::clear_files),
        )
        .route("/files/search", get(handlers::files::search_files))
        .route("/files/export", get(handlers::files::export_files))
        .route("/files/bulk", post(handlers::files::bulk_put_files))
        .route(
            "/files/:id",
            get(handlers::files::get_file).delete(handlers::files::delete_file),
        )
        // Admin operations.
        .route("/admin/audit", get(handlers::admin::audit))
        .route("/admin/repair", post(handlers::admin::repair))
        .route(
            "/admin/backups",
            get(handlers::admin::list_backups).post(handlers::admin::create_backup),
        )
        .with_state(state.clone())
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn_with_state(state, auth_middleware))
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http())
        // Uploads arrive base64-encoded; allow for the expansion.
        .layer(DefaultBodyLimit::max(max_body * 2))
}

// -- Infrastructure handlers --------------------------------------------------

/// `GET /health` — liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "Health",
    responses((status = 200, description = "Service is up"))
)]
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /openapi.json` — machine-readable API description.
async fn openapi_spec() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- Common headers middleware -----------------------------------------------

/// Adds standard response headers to every response: a request id, the
/// date, and the server name.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // The error renderer may have set a request id already.
    if !headers.contains_key("x-request-id") {
        let request_id = generate_request_id();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("stashd"));

    response
}

// -- Auth middleware ---------------------------------------------------------

/// Paths that bypass authentication.
const AUTH_SKIP_PATHS: &[&str] = &["/health", "/openapi.json"];

/// HTTP Basic authentication against the catalog's user set.
///
/// Runs before handlers. On success the verified username is attached
/// to the request as an [`Identity`] extension.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ServiceError> {
    let path = req.uri().path();
    if AUTH_SKIP_PATHS.contains(&path) {
        return Ok(next.run(req).await);
    }

    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::AccessDenied {
            message: "no credentials provided".to_string(),
        })?;

    let (username, password) = parse_basic_auth(header).ok_or_else(|| {
        ServiceError::AccessDenied {
            message: "malformed Basic authorization header".to_string(),
        }
    })?;

    let catalog = state.catalog.load();
    let user = catalog.find_user(&username);
    // Constant-time comparison against a dummy secret when the user is
    // unknown, so lookups and misses take the same path.
    let expected = user.map(|u| u.password.as_bytes()).unwrap_or(b"\0");
    let matches: bool = expected.ct_eq(password.as_bytes()).into();
    if user.is_none() || !matches {
        warn!(username = %username, "rejected credentials");
        return Err(ServiceError::AccessDenied {
            message: "unknown user or wrong password".to_string(),
        });
    }

    req.extensions_mut().insert(Identity(username));
    Ok(next.run(req).await)
}

/// Decode a `Basic <base64(user:pass)>` authorization header.
fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?.trim();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Auditor;
    use crate::backup::BackupManager;
    use crate::blobs::local::LocalBlobStore;
    use crate::blobs::store::BlobStore;
    use crate::catalog::model::User;
    use crate::catalog::store::CatalogStore;
    use crate::config::Config;
    use crate::service::FileService;
    use axum::body::Body;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn basic(user: &str, pass: &str) -> String {
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"))
        )
    }

    fn test_app() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = Config::default();
        let seed = User {
            username: "admin".to_string(),
            password: "secret".to_string(),
            display_name: "Administrator".to_string(),
        };
        let catalog = Arc::new(
            CatalogStore::new(dir.path().join("catalog.json"), seed).unwrap(),
        );
        let blobs: Arc<dyn BlobStore> =
            Arc::new(LocalBlobStore::new(dir.path().join("blobs")).unwrap());
        let service = FileService::new(
            catalog.clone(),
            blobs.clone(),
            config.uploads.allowed_extensions.clone(),
        );
        let auditor = Auditor::new(catalog.clone(), blobs.clone());
        let backups = BackupManager::new(catalog.clone(), dir.path().join("backups"));
        let state = Arc::new(AppState {
            config,
            catalog,
            blobs,
            service,
            auditor,
            backups,
        });
        // Prime the snapshot so the seed user exists before requests land.
        state.catalog.load();
        (dir, app(state))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let (_dir, app) = test_app();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["server"], "stashd");
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected() {
        let (_dir, app) = test_app();

        let response = app
            .oneshot(Request::builder().uri("/files").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let (_dir, app) = test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/files")
                    .header("authorization", basic("admin", "wrong"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_put_then_get_over_http() {
        let (_dir, app) = test_app();

        let content = base64::engine::general_purpose::STANDARD.encode("hello blob");
        let body = serde_json::json!({
            "name": "hello.js",
            "mime_type": "text/javascript",
            "content": content,
        });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/files")
                    .header("authorization", basic("admin", "secret"))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let stored = body_json(response).await;
        let id = stored["file"]["id"].as_str().unwrap().to_string();
        assert_eq!(stored["file"]["owner_id"], "admin");

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/files/{id}"))
                    .header("authorization", basic("admin", "secret"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/javascript");
        assert_eq!(response.headers()["x-file-name"], "hello.js");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"hello blob");
    }

    #[tokio::test]
    async fn test_unsupported_type_over_http() {
        let (_dir, app) = test_app();

        let body = serde_json::json!({
            "name": "virus.exe",
            "content": base64::engine::general_purpose::STANDARD.encode("boom"),
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/files")
                    .header("authorization", basic("admin", "secret"))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let error = body_json(response).await;
        assert_eq!(error["error"]["code"], "UnsupportedType");
    }

    #[tokio::test]
    async fn test_audit_endpoint_reports_health() {
        let (_dir, app) = test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/audit")
                    .header("authorization", basic("admin", "secret"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["healthy"], true);
    }

    #[tokio::test]
    async fn test_export_csv_over_http() {
        let (_dir, app) = test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/files/export?format=csv")
                    .header("authorization", basic("admin", "secret"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/csv");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(std::str::from_utf8(&bytes).unwrap().starts_with("id,name,"));
    }
}
