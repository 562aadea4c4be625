use crate::error::DocumentError;
use crate::models::{Document, OwnerId};
use crate::services::blob_store::{BlobStore, BlobStoreError};
use crate::services::registry::Registry;
use std::sync::Arc;

/// Removes documents remotely and reconciles the registry.
pub struct DeletionManager {
    store: Arc<dyn BlobStore>,
    registry: Arc<Registry>,
}

impl DeletionManager {
    pub fn new(store: Arc<dyn BlobStore>, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    /// Delete `document`, which the caller saw at `index_hint` of the snapshot.
    ///
    /// A hint outside the current snapshot, or one pointing at a different
    /// document, is rejected with `InvalidIndex` before any remote call. On
    /// success the entry is dropped from the snapshot without re-listing.
    pub async fn delete(
        &self,
        owner: Option<&str>,
        document: &Document,
        index_hint: usize,
    ) -> Result<(), DocumentError> {
        let owner = OwnerId::require(owner)?;
        if !document.belongs_to(&owner) {
            return Err(DocumentError::InvalidInput(format!(
                "document {} does not belong to owner {}",
                document.id, owner
            )));
        }

        let len = self.registry.len();
        match self.registry.get(index_hint) {
            Some(current) if current.id == document.id => {}
            _ => {
                tracing::warn!(
                    owner_id = %owner,
                    document_id = %document.id,
                    index = index_hint,
                    len = len,
                    "Rejecting delete with stale index"
                );
                return Err(DocumentError::InvalidIndex {
                    index: index_hint,
                    len,
                });
            }
        }

        self.delete_remote(&owner, document).await?;
        self.registry
            .remove_confirmed(&owner, index_hint, &document.id);
        Ok(())
    }

    /// Delete by document id, without a positional hint.
    pub async fn delete_by_id(
        &self,
        owner: Option<&str>,
        id: &str,
    ) -> Result<Document, DocumentError> {
        let owner = OwnerId::require(owner)?;
        let (index, document) = self
            .registry
            .find(id)
            .filter(|(_, doc)| doc.belongs_to(&owner))
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;

        self.delete_remote(&owner, &document).await?;
        self.registry.remove_confirmed(&owner, index, &document.id);
        Ok(document)
    }

    async fn delete_remote(&self, owner: &OwnerId, document: &Document) -> Result<(), DocumentError> {
        self.store.delete(&document.locator).await.map_err(|e| {
            tracing::error!(
                owner_id = %owner,
                document_id = %document.id,
                error = %e,
                "Document deletion failed"
            );
            metrics::counter!("document_deletion_failures_total").increment(1);
            match e {
                BlobStoreError::Unavailable(msg) => DocumentError::StoreUnavailable(msg),
                other => DocumentError::NetworkError(other.to_string()),
            }
        })?;

        metrics::counter!("document_deletions_total").increment(1);
        tracing::info!(owner_id = %owner, document_id = %document.id, "Document deleted");
        Ok(())
    }
}
