//! File service: the only component allowed to mutate the catalog and
//! the blob store together.
//!
//! Every operation is one catalog load-mutate-save cycle.  Mutating
//! operations hold the catalog store's write gate for the whole cycle;
//! read-only operations load without the gate and rely on atomic saves
//! for a self-consistent snapshot.
//!
//! Best-effort cleanup failures (a blob that would not delete) never
//! abort the enclosing operation.  They come back as [`Advisory`]
//! entries alongside the result so callers and tests can assert on
//! them instead of digging through logs.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::blobs::store::BlobStore;
use crate::catalog::model::{Catalog, FileRecord};
use crate::catalog::store::CatalogStore;
use crate::errors::ServiceError;

/// A non-fatal fault recorded during a best-effort cleanup step.
#[derive(Debug, Clone, Serialize)]
pub struct Advisory {
    /// Content ref the fault relates to.
    pub content_ref: String,
    /// What went wrong.
    pub detail: String,
}

/// One catalog entry plus a liveness probe of its blob.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    /// The metadata record.
    #[serde(flatten)]
    pub record: FileRecord,
    /// Whether the blob store currently holds the record's content.
    pub blob_present: bool,
}

/// Caller-supplied fields for a `put`.
#[derive(Debug, Clone)]
pub struct PutRequest {
    /// Record id; a fresh one is generated when absent.
    pub id: Option<String>,
    /// File name, validated against the extension allow-list.
    pub name: String,
    /// MIME content type.
    pub mime_type: String,
    /// Display name of the uploader.
    pub uploader_name: String,
}

/// Outcome of deleting one file.
#[derive(Debug, Serialize)]
pub struct DeleteOutcome {
    /// Whether a blob was actually removed from the store.
    pub blob_removed: bool,
    /// Non-fatal faults hit along the way.
    pub warnings: Vec<Advisory>,
}

/// Per-item outcome of a bulk put.
#[derive(Debug)]
pub struct BulkOutcome {
    /// The item's file name, for correlation.
    pub name: String,
    /// The stored record, or why this item failed.
    pub result: Result<FileRecord, ServiceError>,
}

/// Outcome of clearing an owner's files.
#[derive(Debug, Serialize)]
pub struct ClearOutcome {
    /// Number of catalog entries removed.
    pub removed: usize,
    /// Non-fatal faults hit along the way.
    pub warnings: Vec<Advisory>,
}

/// Orchestrates the catalog store and blob store.
#[derive(Clone)]
pub struct FileService {
    catalog: Arc<CatalogStore>,
    blobs: Arc<dyn BlobStore>,
    /// Accepted extensions, lowercase with leading dot.
    allowed_extensions: Vec<String>,
}

impl FileService {
    pub fn new(
        catalog: Arc<CatalogStore>,
        blobs: Arc<dyn BlobStore>,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            catalog,
            blobs,
            allowed_extensions,
        }
    }

    /// Check a file name against the extension allow-list.
    fn check_extension(&self, name: &str) -> Result<(), ServiceError> {
        let lower = name.to_ascii_lowercase();
        if self
            .allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
        {
            Ok(())
        } else {
            Err(ServiceError::UnsupportedType {
                name: name.to_string(),
            })
        }
    }

    /// List every record owned by `owner_id`, each annotated with a
    /// blob liveness flag. Zero results is not an error.
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<FileEntry>, ServiceError> {
        let catalog = self.catalog.load();
        let mut entries = Vec::new();
        for record in catalog.files_owned_by(owner_id) {
            let blob_present = self.blobs.exists(&record.content_ref).await?;
            entries.push(FileEntry {
                record: record.clone(),
                blob_present,
            });
        }
        Ok(entries)
    }

    /// Fetch one record and its content.
    pub async fn get(&self, id: &str, owner_id: &str) -> Result<(FileRecord, Bytes), ServiceError> {
        let catalog = self.catalog.load();
        let record = catalog
            .find_file(id, owner_id)
            .ok_or_else(|| ServiceError::NotFound { id: id.to_string() })?
            .clone();

        // The entry exists; a missing or unreadable blob is an I/O
        // fault at this level, not a NotFound.
        let content = self.blobs.get(&record.content_ref).await?;
        Ok((record, content))
    }

    /// Store `content` under a new or existing record.
    ///
    /// Write ordering: new blob first, then delete the superseded blob
    /// (if the ref changed), then persist the catalog. A crash in the
    /// middle can orphan the new blob, which a later repair picks up.
    pub async fn put(
        &self,
        owner_id: &str,
        request: PutRequest,
        content: Bytes,
    ) -> Result<(FileRecord, Vec<Advisory>), ServiceError> {
        let _gate = self.catalog.begin_write().await;
        let mut catalog = self.catalog.load();
        let (record, warnings) = self
            .apply_put(&mut catalog, owner_id, request, content)
            .await?;

        if !self.catalog.save(&catalog) {
            return Err(ServiceError::IoFault(anyhow::anyhow!(
                "catalog save did not commit"
            )));
        }
        info!(id = %record.id, owner = owner_id, size = record.size_bytes, "stored file");
        Ok((record, warnings))
    }

    /// Put-equivalent logic against an already loaded catalog.
    ///
    /// Shared by `put` and `bulk_put`; does not save.
    async fn apply_put(
        &self,
        catalog: &mut Catalog,
        owner_id: &str,
        request: PutRequest,
        content: Bytes,
    ) -> Result<(FileRecord, Vec<Advisory>), ServiceError> {
        self.check_extension(&request.name)?;

        let id = request
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        // One blob per (owner, id): the ref is derived from the key.
        let content_ref = format!("{owner_id}/{id}");
        let now = now_iso8601();

        let previous = catalog.find_file(&id, owner_id).cloned();

        let record = FileRecord {
            id: id.clone(),
            owner_id: owner_id.to_string(),
            name: request.name,
            mime_type: request.mime_type,
            size_bytes: content.len() as u64,
            uploader_name: request.uploader_name,
            content_ref: content_ref.clone(),
            created_at: previous
                .as_ref()
                .map(|p| p.created_at.clone())
                .unwrap_or_else(|| now.clone()),
            modified_at: now,
        };

        // New blob is written before the old one goes away, so there is
        // never a window with zero valid blobs.
        self.blobs.put(&content_ref, content).await?;

        let mut warnings = Vec::new();
        if let Some(previous) = previous {
            if previous.content_ref != content_ref {
                if let Err(err) = self.blobs.delete(&previous.content_ref).await {
                    warn!(content_ref = %previous.content_ref, error = %err, "superseded blob not deleted");
                    warnings.push(Advisory {
                        content_ref: previous.content_ref,
                        detail: format!("superseded blob not deleted: {err}"),
                    });
                }
            }
        }

        catalog.upsert_file(record.clone());
        Ok((record, warnings))
    }

    /// Delete one record and its blob.
    ///
    /// A blob missing on disk is itself an integrity fault to clean up,
    /// so it never blocks removal of the metadata entry.
    pub async fn delete(&self, id: &str, owner_id: &str) -> Result<DeleteOutcome, ServiceError> {
        let _gate = self.catalog.begin_write().await;
        let mut catalog = self.catalog.load();

        let record = catalog
            .remove_file(id, owner_id)
            .ok_or_else(|| ServiceError::NotFound { id: id.to_string() })?;

        let mut warnings = Vec::new();
        let blob_removed = match self.blobs.delete(&record.content_ref).await {
            Ok(removed) => {
                if !removed {
                    warn!(content_ref = %record.content_ref, "no blob on disk for deleted record");
                    warnings.push(Advisory {
                        content_ref: record.content_ref.clone(),
                        detail: "no blob on disk for this record".to_string(),
                    });
                }
                removed
            }
            Err(err) => {
                warn!(content_ref = %record.content_ref, error = %err, "blob deletion failed");
                warnings.push(Advisory {
                    content_ref: record.content_ref.clone(),
                    detail: format!("blob deletion failed: {err}"),
                });
                false
            }
        };

        if !self.catalog.save(&catalog) {
            return Err(ServiceError::IoFault(anyhow::anyhow!(
                "catalog save did not commit"
            )));
        }
        info!(id, owner = owner_id, blob_removed, "deleted file");
        Ok(DeleteOutcome {
            blob_removed,
            warnings,
        })
    }

    /// Apply put-equivalent logic per item against one shared catalog,
    /// then persist once.  Individual failures are accumulated, never
    /// escalated; the call as a whole only fails if the final save does.
    pub async fn bulk_put(
        &self,
        owner_id: &str,
        items: Vec<(PutRequest, Bytes)>,
    ) -> Result<(Vec<BulkOutcome>, Vec<Advisory>), ServiceError> {
        let _gate = self.catalog.begin_write().await;
        let mut catalog = self.catalog.load();

        let mut outcomes = Vec::with_capacity(items.len());
        let mut warnings = Vec::new();
        for (request, content) in items {
            let name = request.name.clone();
            match self
                .apply_put(&mut catalog, owner_id, request, content)
                .await
            {
                Ok((record, mut item_warnings)) => {
                    warnings.append(&mut item_warnings);
                    outcomes.push(BulkOutcome {
                        name,
                        result: Ok(record),
                    });
                }
                Err(err) => outcomes.push(BulkOutcome {
                    name,
                    result: Err(err),
                }),
            }
        }

        if !self.catalog.save(&catalog) {
            return Err(ServiceError::IoFault(anyhow::anyhow!(
                "catalog save did not commit"
            )));
        }
        let stored = outcomes.iter().filter(|o| o.result.is_ok()).count();
        info!(owner = owner_id, stored, failed = outcomes.len() - stored, "bulk put finished");
        Ok((outcomes, warnings))
    }

    /// Delete every blob owned by `owner_id`, then drop all matching
    /// catalog entries in one save. Blob deletion failures are advisory.
    pub async fn clear_by_owner(&self, owner_id: &str) -> Result<ClearOutcome, ServiceError> {
        let _gate = self.catalog.begin_write().await;
        let mut catalog = self.catalog.load();

        let doomed: Vec<FileRecord> = catalog.files_owned_by(owner_id).cloned().collect();
        let mut warnings = Vec::new();
        for record in &doomed {
            if let Err(err) = self.blobs.delete(&record.content_ref).await {
                warn!(content_ref = %record.content_ref, error = %err, "blob deletion failed during clear");
                warnings.push(Advisory {
                    content_ref: record.content_ref.clone(),
                    detail: format!("blob deletion failed: {err}"),
                });
            }
        }

        catalog.files.retain(|f| f.owner_id != owner_id);
        if !self.catalog.save(&catalog) {
            return Err(ServiceError::IoFault(anyhow::anyhow!(
                "catalog save did not commit"
            )));
        }
        info!(owner = owner_id, removed = doomed.len(), "cleared owner's files");
        Ok(ClearOutcome {
            removed: doomed.len(),
            warnings,
        })
    }

    /// Case-insensitive substring match of `query` against name,
    /// uploader, and mime type, scoped to `owner_id`.
    pub async fn search(
        &self,
        owner_id: &str,
        query: &str,
    ) -> Result<Vec<FileRecord>, ServiceError> {
        let needle = query.to_lowercase();
        let catalog = self.catalog.load();
        Ok(catalog
            .files_owned_by(owner_id)
            .filter(|f| {
                f.name.to_lowercase().contains(&needle)
                    || f.uploader_name.to_lowercase().contains(&needle)
                    || f.mime_type.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}

/// Current UTC time as an ISO-8601 string with millisecond precision.
pub(crate) fn now_iso8601() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::local::LocalBlobStore;
    use crate::catalog::model::User;

    fn seed_user() -> User {
        User {
            username: "u1".to_string(),
            password: "pw".to_string(),
            display_name: "User One".to_string(),
        }
    }

    fn test_service() -> (tempfile::TempDir, FileService) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let catalog = Arc::new(
            CatalogStore::new(dir.path().join("catalog.json"), seed_user()).unwrap(),
        );
        let blobs: Arc<dyn BlobStore> =
            Arc::new(LocalBlobStore::new(dir.path().join("blobs")).unwrap());
        let service = FileService::new(
            catalog,
            blobs,
            vec![".js".to_string(), ".png".to_string()],
        );
        (dir, service)
    }

    fn put_request(name: &str) -> PutRequest {
        PutRequest {
            id: None,
            name: name.to_string(),
            mime_type: "application/octet-stream".to_string(),
            uploader_name: "User One".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_generates_id_and_roundtrips() {
        let (_dir, service) = test_service();

        let (record, warnings) = service
            .put("u1", put_request("a.png"), Bytes::from("pixels"))
            .await
            .unwrap();
        assert!(warnings.is_empty());
        assert!(!record.id.is_empty());
        assert_eq!(record.created_at, record.modified_at);
        assert_eq!(record.size_bytes, 6);

        let (fetched, content) = service.get(&record.id, "u1").await.unwrap();
        assert_eq!(fetched.name, "a.png");
        assert_eq!(content, Bytes::from("pixels"));
    }

    #[tokio::test]
    async fn test_put_update_preserves_created_at() {
        let (_dir, service) = test_service();

        let (first, _) = service
            .put("u1", put_request("a.png"), Bytes::from("v1"))
            .await
            .unwrap();

        let request = PutRequest {
            id: Some(first.id.clone()),
            ..put_request("a.png")
        };
        let (second, _) = service
            .put("u1", request, Bytes::from("version two"))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.size_bytes, 11);

        let (_, content) = service.get(&first.id, "u1").await.unwrap();
        assert_eq!(content, Bytes::from("version two"));

        // Still one catalog entry.
        let entries = service.list_by_owner("u1").await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_put_rejects_unlisted_extension() {
        let (_dir, service) = test_service();

        let err = service
            .put("u1", put_request("virus.exe"), Bytes::from("payload"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedType { .. }));

        // No catalog or blob mutation happened.
        assert!(service.list_by_owner("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extension_check_is_case_insensitive() {
        let (_dir, service) = test_service();

        service
            .put("u1", put_request("SHOUTY.PNG"), Bytes::from("x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_unknown_id_is_not_found() {
        let (_dir, service) = test_service();

        let err = service.get("nope", "u1").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_is_owner_scoped() {
        let (_dir, service) = test_service();

        let (record, _) = service
            .put("u1", put_request("a.png"), Bytes::from("x"))
            .await
            .unwrap();

        let err = service.get(&record.id, "u2").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_by_owner_flags_liveness_and_scopes() {
        let (_dir, service) = test_service();

        let (kept, _) = service
            .put("u1", put_request("kept.png"), Bytes::from("x"))
            .await
            .unwrap();
        let (gutted, _) = service
            .put("u1", put_request("gutted.png"), Bytes::from("y"))
            .await
            .unwrap();
        service
            .put("u2", put_request("other.png"), Bytes::from("z"))
            .await
            .unwrap();

        // Remove one blob behind the catalog's back.
        service.blobs.delete(&gutted.content_ref).await.unwrap();

        let entries = service.list_by_owner("u1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.record.owner_id == "u1"));

        let by_id = |id: &str| entries.iter().find(|e| e.record.id == id).unwrap();
        assert!(by_id(&kept.id).blob_present);
        assert!(!by_id(&gutted.id).blob_present);
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_blob() {
        let (_dir, service) = test_service();

        let (record, _) = service
            .put("u1", put_request("a.png"), Bytes::from("x"))
            .await
            .unwrap();

        let outcome = service.delete(&record.id, "u1").await.unwrap();
        assert!(outcome.blob_removed);
        assert!(outcome.warnings.is_empty());

        let err = service.get(&record.id, "u1").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
        assert!(!service.blobs.exists(&record.content_ref).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_found() {
        let (_dir, service) = test_service();

        let (record, _) = service
            .put("u1", put_request("a.png"), Bytes::from("x"))
            .await
            .unwrap();
        service.delete(&record.id, "u1").await.unwrap();

        let err = service.delete(&record.id, "u1").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_with_missing_blob_still_removes_metadata() {
        let (_dir, service) = test_service();

        let (record, _) = service
            .put("u1", put_request("a.png"), Bytes::from("x"))
            .await
            .unwrap();
        service.blobs.delete(&record.content_ref).await.unwrap();

        let outcome = service.delete(&record.id, "u1").await.unwrap();
        assert!(!outcome.blob_removed);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].content_ref, record.content_ref);

        assert!(service.list_by_owner("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_put_mixes_success_and_failure() {
        let (_dir, service) = test_service();

        let items = vec![
            (put_request("one.js"), Bytes::from("a")),
            (put_request("nope.exe"), Bytes::from("b")),
            (put_request("two.png"), Bytes::from("c")),
        ];
        let (outcomes, warnings) = service.bulk_put("u1", items).await.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(
            outcomes[1].result,
            Err(ServiceError::UnsupportedType { .. })
        ));
        assert!(outcomes[2].result.is_ok());

        // Only the two valid items landed in the catalog.
        assert_eq!(service.list_by_owner("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_by_owner_leaves_other_owners_alone() {
        let (_dir, service) = test_service();

        for name in ["a.png", "b.png", "c.js"] {
            service
                .put("u1", put_request(name), Bytes::from("x"))
                .await
                .unwrap();
        }
        for name in ["d.png", "e.js"] {
            service
                .put("u2", put_request(name), Bytes::from("y"))
                .await
                .unwrap();
        }

        let outcome = service.clear_by_owner("u1").await.unwrap();
        assert_eq!(outcome.removed, 3);

        assert!(service.list_by_owner("u1").await.unwrap().is_empty());
        assert_eq!(service.list_by_owner("u2").await.unwrap().len(), 2);

        // u1's blobs are gone too.
        let refs = service.blobs.list_all().await.unwrap();
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.starts_with("u2/")));
    }

    #[tokio::test]
    async fn test_clear_by_owner_with_nothing_to_do() {
        let (_dir, service) = test_service();

        let outcome = service.clear_by_owner("u1").await.unwrap();
        assert_eq!(outcome.removed, 0);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_search_matches_name_uploader_and_mime() {
        let (_dir, service) = test_service();

        service
            .put(
                "u1",
                PutRequest {
                    id: None,
                    name: "Sprite-Sheet.png".to_string(),
                    mime_type: "image/png".to_string(),
                    uploader_name: "Casey".to_string(),
                },
                Bytes::from("x"),
            )
            .await
            .unwrap();
        service
            .put(
                "u1",
                PutRequest {
                    id: None,
                    name: "loader.js".to_string(),
                    mime_type: "text/javascript".to_string(),
                    uploader_name: "Robin".to_string(),
                },
                Bytes::from("y"),
            )
            .await
            .unwrap();

        // Case-insensitive name match.
        let hits = service.search("u1", "sprite").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Sprite-Sheet.png");

        // Uploader match.
        let hits = service.search("u1", "robin").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "loader.js");

        // Mime type match.
        let hits = service.search("u1", "image/").await.unwrap();
        assert_eq!(hits.len(), 1);

        // Scoped to owner.
        assert!(service.search("u2", "sprite").await.unwrap().is_empty());

        // No hits is an empty list, not an error.
        assert!(service.search("u1", "zzz").await.unwrap().is_empty());
    }
}
