//! Local filesystem blob store.
//!
//! Blobs are stored as flat files under a configurable root directory.
//! The content ref is used directly as a relative path (refs may contain
//! '/' separators, e.g. "owner/id").
//!
//! All writes follow crash-only design: write to temp file, fsync, rename.

use bytes::Bytes;
use std::collections::BTreeSet;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use super::store::{BlobError, BlobStore};

/// Stores blobs on the local filesystem.
pub struct LocalBlobStore {
    /// Root directory for all stored blobs.
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a new `LocalBlobStore` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        // Also create the .tmp directory for atomic writes.
        std::fs::create_dir_all(root.join(".tmp"))?;
        Ok(Self { root })
    }

    /// Resolve a content ref to an absolute file path.
    ///
    /// Rejects refs that would escape the root directory.
    fn resolve(&self, content_ref: &str) -> Result<PathBuf, BlobError> {
        for component in Path::new(content_ref).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(BlobError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("invalid content ref: {content_ref}"),
                    )))
                }
            }
        }
        Ok(self.root.join(content_ref))
    }

    /// Generate a temp file path under .tmp/ for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(".tmp").join(format!("tmp-{}", id))
    }

    /// Recursively collect refs under `dir`, relative to the root.
    fn walk(&self, dir: &Path, refs: &mut BTreeSet<String>) -> Result<(), BlobError> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            // Skip the staging directory for in-flight writes.
            if path.parent() == Some(self.root.as_path()) && name == ".tmp" {
                continue;
            }
            if path.is_dir() {
                self.walk(&path, refs)?;
            } else if let Ok(rel) = path.strip_prefix(&self.root) {
                refs.insert(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
}

impl BlobStore for LocalBlobStore {
    fn put(
        &self,
        content_ref: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<String, BlobError>> + Send + '_>> {
        let content_ref = content_ref.to_string();
        Box::pin(async move {
            let final_path = self.resolve(&content_ref)?;

            // Ensure parent directory exists (handles refs with '/' separators).
            if let Some(parent) = final_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            // Crash-only: temp-fsync-rename pattern.
            let tmp_path = self.temp_path();
            if let Some(parent) = tmp_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;

            // Atomic rename to final path.
            std::fs::rename(&tmp_path, &final_path)?;

            Ok(content_ref)
        })
    }

    fn get(
        &self,
        content_ref: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, BlobError>> + Send + '_>> {
        let content_ref = content_ref.to_string();
        Box::pin(async move {
            let path = self.resolve(&content_ref)?;

            if !path.is_file() {
                return Err(BlobError::NotFound { content_ref });
            }

            let data = std::fs::read(&path)?;
            Ok(Bytes::from(data))
        })
    }

    fn delete(
        &self,
        content_ref: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, BlobError>> + Send + '_>> {
        let content_ref = content_ref.to_string();
        Box::pin(async move {
            let path = self.resolve(&content_ref)?;

            // Idempotent: if the blob doesn't exist, that's fine.
            if !path.is_file() {
                return Ok(false);
            }
            std::fs::remove_file(&path)?;
            Ok(true)
        })
    }

    fn exists(
        &self,
        content_ref: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, BlobError>> + Send + '_>> {
        let content_ref = content_ref.to_string();
        Box::pin(async move {
            let path = self.resolve(&content_ref)?;
            Ok(path.is_file())
        })
    }

    fn list_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeSet<String>, BlobError>> + Send + '_>> {
        Box::pin(async move {
            let mut refs = BTreeSet::new();
            self.walk(&self.root, &mut refs)?;
            Ok(refs)
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
