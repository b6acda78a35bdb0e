//! stashd library — single-tenant file catalog + blob storage engine.
//!
//! This crate provides the core components for running a small file
//! storage service: a metadata catalog persisted as one JSON snapshot,
//! a pluggable blob store for raw content, a file service that keeps
//! the two consistent, and audit/repair/backup tooling for the times
//! they diverge anyway.

use std::sync::Arc;

pub mod audit;
pub mod backup;
pub mod blobs;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod export;
pub mod handlers;
pub mod server;
pub mod service;

use crate::audit::Auditor;
use crate::backup::BackupManager;
use crate::blobs::store::BlobStore;
use crate::catalog::store::CatalogStore;
use crate::config::Config;
use crate::service::FileService;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Catalog snapshot store (shared with the service and auditor).
    pub catalog: Arc<CatalogStore>,
    /// Blob storage backend.
    pub blobs: Arc<dyn BlobStore>,
    /// File service orchestrating catalog + blobs.
    pub service: FileService,
    /// Consistency auditor over the same two stores.
    pub auditor: Auditor,
    /// Catalog backup manager.
    pub backups: BackupManager,
}
