//! Abstract blob store trait.
//!
//! Any blob backend must implement [`BlobStore`].  The trait uses
//! manually desugared async methods (pinned futures) so it can be held
//! behind `Arc<dyn BlobStore>` alongside future remote backends.
//!
//! Every call is a fresh round-trip to the underlying medium; there is
//! no caching layer, so callers must not assume repeated calls are
//! cheap or mutually consistent.

use bytes::Bytes;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors surfaced by blob store operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// No blob is stored under the given ref.
    #[error("no blob stored under content ref {content_ref}")]
    NotFound { content_ref: String },

    /// The underlying filesystem read or write failed.
    #[error("blob store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Async blob store contract.
pub trait BlobStore: Send + Sync + 'static {
    /// Write `data` under `content_ref`, overwriting any existing blob
    /// at that ref. Returns the ref the blob was stored under.
    fn put(
        &self,
        content_ref: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<String, BlobError>> + Send + '_>>;

    /// Read the full blob at `content_ref`.
    fn get(
        &self,
        content_ref: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, BlobError>> + Send + '_>>;

    /// Delete the blob at `content_ref` if present.  Returns whether a
    /// blob was actually removed; absence is not an error.
    fn delete(
        &self,
        content_ref: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, BlobError>> + Send + '_>>;

    /// Check whether a blob exists at `content_ref`.
    fn exists(
        &self,
        content_ref: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, BlobError>> + Send + '_>>;

    /// Enumerate every content ref physically present.
    ///
    /// Used only by the consistency auditor to find orphans.
    fn list_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeSet<String>, BlobError>> + Send + '_>>;
}
