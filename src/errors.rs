//! Service error types.
//!
//! Every variant maps to a stable error code and HTTP status.  The enum
//! implements [`axum::response::IntoResponse`] so handlers can simply
//! return `Err(ServiceError::NotFound { .. })` and get a JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::blobs::store::BlobError;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Typed errors surfaced by the file service and its stores.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The referenced file does not exist for this owner.
    #[error("no file with id {id} exists for this owner")]
    NotFound { id: String },

    /// The file's extension is not on the allow-list.
    #[error("file type of {name} is not allowed")]
    UnsupportedType { name: String },

    /// An underlying store read or write failed.
    #[error("underlying store I/O failed: {0}")]
    IoFault(#[source] anyhow::Error),

    /// The catalog snapshot could not be parsed.
    ///
    /// Surfaced by the raw snapshot reader; `load()` recovers from it
    /// by serving an empty catalog instead of propagating.
    #[error("catalog snapshot is not parsable: {detail}")]
    CatalogCorrupt { detail: String },

    /// Credentials missing or wrong.
    #[error("access denied: {message}")]
    AccessDenied { message: String },

    /// A request argument is invalid.
    #[error("{message}")]
    InvalidArgument { message: String },
}

impl ServiceError {
    /// Return the stable error code string used in responses.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound { .. } => "NotFound",
            ServiceError::UnsupportedType { .. } => "UnsupportedType",
            ServiceError::IoFault(_) => "IOFault",
            ServiceError::CatalogCorrupt { .. } => "CatalogCorrupt",
            ServiceError::AccessDenied { .. } => "AccessDenied",
            ServiceError::InvalidArgument { .. } => "InvalidArgument",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::UnsupportedType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServiceError::IoFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::CatalogCorrupt { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::AccessDenied { .. } => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<BlobError> for ServiceError {
    fn from(err: BlobError) -> Self {
        match err {
            // A blob the catalog pointed at is gone: from the caller's
            // point of view the file cannot be served.
            BlobError::NotFound { content_ref } => ServiceError::IoFault(anyhow::anyhow!(
                "blob missing for content ref {content_ref}"
            )),
            BlobError::Io(e) => ServiceError::IoFault(e.into()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();

        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "request_id": request_id.clone(),
            }
        });

        (
            status,
            [("x-request-id", request_id)],
            Json(body),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, id.to_uppercase());
    }

    #[test]
    fn test_status_codes() {
        let err = ServiceError::NotFound { id: "f1".into() };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NotFound");

        let err = ServiceError::UnsupportedType {
            name: "virus.exe".into(),
        };
        assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let err = ServiceError::IoFault(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "IOFault");
    }

    #[test]
    fn test_blob_not_found_maps_to_io_fault() {
        let err: ServiceError = BlobError::NotFound {
            content_ref: "u1/f1".into(),
        }
        .into();
        assert_eq!(err.code(), "IOFault");
    }
}
