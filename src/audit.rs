//! Consistency auditor.
//!
//! Compares catalog entries against the blob store's actual contents.
//! A catalog entry whose blob is gone is a `MissingBlob`; a blob no
//! catalog entry references is an `OrphanBlob`.  `audit()` only reads;
//! `repair()` removes dangling catalog entries (one save) and deletes
//! orphan blobs.
//!
//! Repair is not transactional across the two halves: interrupted
//! midway, a later audit simply re-surfaces whatever half remains.
//! Running repair twice with no intervening mutation is a no-op the
//! second time.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::blobs::store::BlobStore;
use crate::catalog::store::CatalogStore;
use crate::errors::ServiceError;
use crate::service::Advisory;

/// One detected divergence between catalog and blob store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum Issue {
    /// A catalog entry whose content ref resolves to nothing.
    MissingBlob {
        id: String,
        owner_id: String,
        content_ref: String,
    },
    /// A stored blob with no referencing catalog entry.
    OrphanBlob { content_ref: String },
}

/// Result of an audit pass.
#[derive(Debug, Serialize)]
pub struct AuditReport {
    /// True when no issues were found.
    pub healthy: bool,
    /// Every divergence found, catalog-side issues first.
    pub issues: Vec<Issue>,
}

/// One corrective step taken by `repair()`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "action")]
pub enum RepairAction {
    /// A dangling catalog entry was removed.
    RemovedRecord {
        id: String,
        owner_id: String,
        content_ref: String,
    },
    /// An orphan blob was deleted.
    DeletedBlob { content_ref: String },
}

/// Result of a repair pass.
#[derive(Debug, Serialize)]
pub struct RepairReport {
    /// Corrective steps actually taken.
    pub actions: Vec<RepairAction>,
    /// Non-fatal faults hit while repairing.
    pub warnings: Vec<Advisory>,
}

/// Read-mostly reconciler over the catalog and blob stores.
#[derive(Clone)]
pub struct Auditor {
    catalog: Arc<CatalogStore>,
    blobs: Arc<dyn BlobStore>,
}

impl Auditor {
    pub fn new(catalog: Arc<CatalogStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { catalog, blobs }
    }

    /// Compare every catalog entry and every stored blob. Never mutates.
    pub async fn audit(&self) -> Result<AuditReport, ServiceError> {
        let catalog = self.catalog.load();
        let mut issues = Vec::new();

        for record in &catalog.files {
            if !self.blobs.exists(&record.content_ref).await? {
                issues.push(Issue::MissingBlob {
                    id: record.id.clone(),
                    owner_id: record.owner_id.clone(),
                    content_ref: record.content_ref.clone(),
                });
            }
        }

        let referenced: BTreeSet<&str> = catalog
            .files
            .iter()
            .map(|f| f.content_ref.as_str())
            .collect();
        for content_ref in self.blobs.list_all().await? {
            if !referenced.contains(content_ref.as_str()) {
                issues.push(Issue::OrphanBlob { content_ref });
            }
        }

        info!(issues = issues.len(), "audit finished");
        Ok(AuditReport {
            healthy: issues.is_empty(),
            issues,
        })
    }

    /// Remove every dangling catalog entry (one save at the end), then
    /// delete every orphan blob.
    pub async fn repair(&self) -> Result<RepairReport, ServiceError> {
        let _gate = self.catalog.begin_write().await;
        let mut catalog = self.catalog.load();

        let mut actions = Vec::new();
        let mut warnings = Vec::new();

        // First half: drop entries whose blobs are gone.
        let mut keep = Vec::with_capacity(catalog.files.len());
        for record in catalog.files.drain(..) {
            if self.blobs.exists(&record.content_ref).await? {
                keep.push(record);
            } else {
                actions.push(RepairAction::RemovedRecord {
                    id: record.id,
                    owner_id: record.owner_id,
                    content_ref: record.content_ref,
                });
            }
        }
        catalog.files = keep;

        // One save covers every removed entry; skip it when nothing changed.
        if !actions.is_empty() && !self.catalog.save(&catalog) {
            return Err(ServiceError::IoFault(anyhow::anyhow!(
                "catalog save did not commit during repair"
            )));
        }

        // Second half: delete blobs nothing references anymore.
        let referenced: BTreeSet<&str> = catalog
            .files
            .iter()
            .map(|f| f.content_ref.as_str())
            .collect();
        for content_ref in self.blobs.list_all().await? {
            if referenced.contains(content_ref.as_str()) {
                continue;
            }
            match self.blobs.delete(&content_ref).await {
                Ok(true) => actions.push(RepairAction::DeletedBlob { content_ref }),
                Ok(false) => {}
                Err(err) => {
                    warn!(content_ref = %content_ref, error = %err, "orphan blob not deleted");
                    warnings.push(Advisory {
                        content_ref,
                        detail: format!("orphan blob not deleted: {err}"),
                    });
                }
            }
        }

        info!(actions = actions.len(), "repair finished");
        Ok(RepairReport { actions, warnings })
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::local::LocalBlobStore;
    use crate::catalog::model::User;
    use crate::service::{FileService, PutRequest};
    use bytes::Bytes;

    fn seed_user() -> User {
        User {
            username: "u1".to_string(),
            password: "pw".to_string(),
            display_name: "User One".to_string(),
        }
    }

    fn test_fixture() -> (tempfile::TempDir, FileService, Auditor) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let catalog = Arc::new(
            CatalogStore::new(dir.path().join("catalog.json"), seed_user()).unwrap(),
        );
        let blobs: Arc<dyn BlobStore> =
            Arc::new(LocalBlobStore::new(dir.path().join("blobs")).unwrap());
        let service = FileService::new(
            catalog.clone(),
            blobs.clone(),
            vec![".js".to_string(), ".png".to_string()],
        );
        let auditor = Auditor::new(catalog, blobs);
        (dir, service, auditor)
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
    async fn test_healthy_catalog_audits_clean() {
        let (_dir, service, auditor) = test_fixture();

        service
            .put("u1", put_request("a.png"), Bytes::from("x"))
            .await
            .unwrap();

        let report = auditor.audit().await.unwrap();
        assert!(report.healthy);
        assert!(report.issues.is_empty());
    }

    #[tokio::test]
    async fn test_missing_blob_detected_and_repaired() {
        let (_dir, service, auditor) = test_fixture();

        let (record, _) = service
            .put("u1", put_request("a.png"), Bytes::from("x"))
            .await
            .unwrap();

        // Manually delete the blob out from under the catalog.
        auditor.blobs.delete(&record.content_ref).await.unwrap();

        let report = auditor.audit().await.unwrap();
        assert!(!report.healthy);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(
            report.issues[0],
            Issue::MissingBlob {
                id: record.id.clone(),
                owner_id: "u1".to_string(),
                content_ref: record.content_ref.clone(),
            }
        );

        let repair = auditor.repair().await.unwrap();
        assert_eq!(repair.actions.len(), 1);
        assert!(matches!(
            repair.actions[0],
            RepairAction::RemovedRecord { .. }
        ));

        // The dangling entry is gone for good.
        let err = service.get(&record.id, "u1").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
        assert!(auditor.audit().await.unwrap().healthy);
    }

    #[tokio::test]
    async fn test_orphan_blob_detected_and_repaired() {
        let (_dir, service, auditor) = test_fixture();

        service
            .put("u1", put_request("a.png"), Bytes::from("x"))
            .await
            .unwrap();
        // A blob nothing references.
        auditor
            .blobs
            .put("u9/stray", Bytes::from("junk"))
            .await
            .unwrap();

        let report = auditor.audit().await.unwrap();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(
            report.issues[0],
            Issue::OrphanBlob {
                content_ref: "u9/stray".to_string()
            }
        );

        let repair = auditor.repair().await.unwrap();
        assert_eq!(
            repair.actions,
            vec![RepairAction::DeletedBlob {
                content_ref: "u9/stray".to_string()
            }]
        );

        let refs = auditor.blobs.list_all().await.unwrap();
        assert!(!refs.contains("u9/stray"));
    }

    #[tokio::test]
    async fn test_repair_is_idempotent() {
        let (_dir, service, auditor) = test_fixture();

        let (record, _) = service
            .put("u1", put_request("a.png"), Bytes::from("x"))
            .await
            .unwrap();
        auditor.blobs.delete(&record.content_ref).await.unwrap();
        auditor
            .blobs
            .put("u9/stray", Bytes::from("junk"))
            .await
            .unwrap();

        let first = auditor.repair().await.unwrap();
        assert_eq!(first.actions.len(), 2);

        // Second run with no intervening mutation: zero actions.
        let second = auditor.repair().await.unwrap();
        assert!(second.actions.is_empty());
        assert!(second.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_audit_never_mutates() {
        let (_dir, service, auditor) = test_fixture();

        let (record, _) = service
            .put("u1", put_request("a.png"), Bytes::from("x"))
            .await
            .unwrap();
        auditor.blobs.delete(&record.content_ref).await.unwrap();

        auditor.audit().await.unwrap();
        auditor.audit().await.unwrap();

        // The dangling entry is still in the catalog.
        let entries = service.list_by_owner("u1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].blob_present);
    }
}
