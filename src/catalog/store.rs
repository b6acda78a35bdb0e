//! Catalog snapshot store.
//!
//! The whole catalog is persisted as one JSON document.  `load()` reads
//! and deserializes it; `save()` serializes and replaces it atomically
//! (write temp, fsync, rename), so a concurrent `load()` never observes
//! a partially written snapshot.
//!
//! There is no optimistic-concurrency token: two interleaved
//! load-mutate-save cycles would silently lose the earlier writer's
//! changes.  Every mutating caller must hold the store's write gate for
//! its full cycle; see [`CatalogStore::begin_write`].

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::catalog::model::{Catalog, User};
use crate::errors::ServiceError;

/// Owns the persisted catalog snapshot and the write gate serializing
/// all load-mutate-save cycles.
pub struct CatalogStore {
    /// Path of the JSON snapshot file.
    path: PathBuf,
    /// Bootstrap user seeded into a fresh catalog.
    seed_user: User,
    /// Single-writer gate. Held across a full load-mutate-save cycle.
    write_gate: Mutex<()>,
}

impl CatalogStore {
    /// Create a store persisting to `path`, seeding `seed_user` when no
    /// snapshot exists yet. The parent directory is created eagerly.
    pub fn new(path: impl Into<PathBuf>, seed_user: User) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            seed_user,
            write_gate: Mutex::new(()),
        })
    }

    /// Acquire the write gate for a load-mutate-save cycle.
    ///
    /// The returned guard must be held until after `save()` returns.
    pub async fn begin_write(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }

    /// Load the persisted snapshot.
    ///
    /// On a missing file, a freshly seeded catalog (bootstrap user, no
    /// files) is persisted and returned.  On unparsable content an empty
    /// catalog is returned *without* touching storage, so whatever is on
    /// disk stays recoverable by hand; the fault is logged as non-fatal.
    pub fn load(&self) -> Catalog {
        if !self.path.exists() {
            let catalog = Catalog {
                users: vec![self.seed_user.clone()],
                files: Vec::new(),
            };
            info!(path = %self.path.display(), "no catalog snapshot found, seeding a fresh one");
            if !self.save(&catalog) {
                warn!("failed to persist freshly seeded catalog");
            }
            return catalog;
        }

        match self.read_snapshot() {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!(error = %err, "catalog snapshot unreadable, serving empty catalog");
                Catalog::default()
            }
        }
    }

    /// Read and parse the snapshot file, with no recovery.
    fn read_snapshot(&self) -> Result<Catalog, ServiceError> {
        let contents = std::fs::read(&self.path)
            .map_err(|e| ServiceError::IoFault(e.into()))?;
        serde_json::from_slice(&contents).map_err(|e| ServiceError::CatalogCorrupt {
            detail: e.to_string(),
        })
    }

    /// Serialize `catalog` and replace the snapshot atomically.
    ///
    /// Returns `false` when the write did not durably commit; the error
    /// itself is logged. Callers treat `false` as a failed mutation.
    pub fn save(&self, catalog: &Catalog) -> bool {
        match self.write_snapshot(catalog) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "catalog save failed");
                false
            }
        }
    }

    fn write_snapshot(&self, catalog: &Catalog) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(catalog)?;
        write_atomic(&self.path, &data)
    }
}

/// Write `data` to `path` via a sibling temp file, fsync, and rename.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("snapshot path has no parent directory"))?;
    std::fs::create_dir_all(parent)?;

    let tmp_path = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────
