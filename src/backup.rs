//! Catalog snapshot backups.
//!
//! A backup is the full catalog serialized to a timestamp-named JSON
//! archive (`catalog-YYYYMMDDTHHMMSSmmmZ.json`).  Archives are never
//! overwritten; the timestamp makes each name unique.  Listing parses
//! the embedded timestamp back out and skips files that don't match
//! the pattern instead of failing the whole listing.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::store::{write_atomic, CatalogStore};
use crate::errors::ServiceError;

const ARCHIVE_PREFIX: &str = "catalog-";
const ARCHIVE_SUFFIX: &str = ".json";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// Details of a freshly created backup.
#[derive(Debug, Serialize)]
pub struct BackupInfo {
    /// Archive file name.
    pub name: String,
    /// ISO-8601 timestamp embedded in the name.
    pub timestamp: String,
    /// Number of file records captured.
    pub file_count: usize,
    /// Number of user records captured.
    pub user_count: usize,
}

/// One entry in a backup listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackupSummary {
    /// Archive file name.
    pub name: String,
    /// ISO-8601 timestamp parsed from the name.
    pub timestamp: String,
}

/// Writes and enumerates catalog archives under one directory.
#[derive(Clone)]
pub struct BackupManager {
    catalog: Arc<CatalogStore>,
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(catalog: Arc<CatalogStore>, dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            dir: dir.into(),
        }
    }

    /// Serialize the current catalog to a new timestamp-named archive.
    pub async fn create_backup(&self) -> Result<BackupInfo, ServiceError> {
        let catalog = self.catalog.load();
        let data = serde_json::to_vec_pretty(&catalog)
            .map_err(|e| ServiceError::IoFault(e.into()))?;

        std::fs::create_dir_all(&self.dir).map_err(|e| ServiceError::IoFault(e.into()))?;

        // Timestamp-derived uniqueness: if two backups land in the same
        // millisecond, wait out the collision instead of overwriting.
        let (name, stamp) = loop {
            let now = Utc::now();
            let name = format!(
                "{ARCHIVE_PREFIX}{}{ARCHIVE_SUFFIX}",
                now.format(TIMESTAMP_FORMAT)
            );
            if !self.dir.join(&name).exists() {
                break (name, now);
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        };

        write_atomic(&self.dir.join(&name), &data).map_err(ServiceError::IoFault)?;
        info!(archive = %name, files = catalog.files.len(), "wrote catalog backup");

        Ok(BackupInfo {
            name,
            timestamp: stamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            file_count: catalog.files.len(),
            user_count: catalog.users.len(),
        })
    }

    /// Enumerate archives, newest first. Malformed names are skipped.
    pub fn list_backups(&self) -> Result<Vec<BackupSummary>, ServiceError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries: Vec<(DateTime<Utc>, BackupSummary)> = Vec::new();
        let dir = std::fs::read_dir(&self.dir).map_err(|e| ServiceError::IoFault(e.into()))?;
        for entry in dir {
            let entry = entry.map_err(|e| ServiceError::IoFault(e.into()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            match parse_archive_name(&name) {
                Some(stamp) => entries.push((
                    stamp,
                    BackupSummary {
                        name,
                        timestamp: stamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                    },
                )),
                None => {
                    warn!(file = %name, "skipping non-archive file in backup directory");
                }
            }
        }

        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().map(|(_, summary)| summary).collect())
    }
}

/// Parse the timestamp out of an archive file name, or None if the
/// name doesn't follow the `catalog-<timestamp>.json` pattern.
fn parse_archive_name(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(ARCHIVE_PREFIX)?
        .strip_suffix(ARCHIVE_SUFFIX)?;
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some(naive.and_utc())
}

// ── Tests ───────────────────────────────────────────────────────────
