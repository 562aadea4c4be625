//! In-memory view of the active owner's documents.
//!
//! The snapshot is rebuilt wholesale from the blob store on every refresh.
//! The only other mutation is the optimistic removal performed after a
//! confirmed remote delete.

use crate::error::DocumentError;
use crate::models::{Document, OwnerId};
use crate::services::blob_store::BlobStore;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Snapshot {
    owner: Option<OwnerId>,
    documents: Arc<Vec<Document>>,
}

pub struct Registry {
    store: Arc<dyn BlobStore>,
    state: RwLock<Snapshot>,
}

impl Registry {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            state: RwLock::new(Snapshot::default()),
        }
    }

    // The lock only ever guards a pointer swap or a Vec edit, so a panic
    // while holding it cannot leave the snapshot half-built.
    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-list the owner namespace and replace the snapshot.
    ///
    /// On failure the previous snapshot of the same owner is kept. Switching
    /// to a different owner discards the old snapshot before listing, so the
    /// registry never shows one owner's documents to another.
    pub async fn refresh(&self, owner: Option<&str>) -> Result<Vec<Document>, DocumentError> {
        let owner = OwnerId::require(owner)?;

        {
            let mut state = self.write();
            if state.owner.as_ref() != Some(&owner) {
                tracing::info!(owner_id = %owner, "Active owner changed, discarding snapshot");
                state.owner = Some(owner.clone());
                state.documents = Arc::new(Vec::new());
            }
        }

        let objects = self
            .store
            .list(&owner.storage_prefix())
            .await
            .map_err(|e| {
                tracing::warn!(owner_id = %owner, error = %e, "Registry refresh failed");
                metrics::counter!("registry_refresh_failures_total").increment(1);
                DocumentError::StoreUnavailable(e.to_string())
            })?;

        let mut documents: Vec<Document> = objects
            .into_iter()
            .map(|object| Document::from_stored(&owner, object))
            .collect();
        documents.sort_by(|a, b| a.name.cmp(&b.name));

        let mut state = self.write();
        if state.owner.as_ref() != Some(&owner) {
            // Another refresh switched owners while this one was listing; the
            // listing is still returned but never installed.
            tracing::debug!(owner_id = %owner, "Dropping refresh result for inactive owner");
            return Ok(documents);
        }
        state.documents = Arc::new(documents.clone());
        drop(state);

        tracing::debug!(owner_id = %owner, count = documents.len(), "Registry refreshed");
        Ok(documents)
    }

    /// Current cached list. Never performs I/O.
    pub fn snapshot(&self) -> Vec<Document> {
        self.read().documents.as_ref().clone()
    }

    pub fn active_owner(&self) -> Option<OwnerId> {
        self.read().owner.clone()
    }

    pub fn len(&self) -> usize {
        self.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry at `index` of the current snapshot.
    pub fn get(&self, index: usize) -> Option<Document> {
        self.read().documents.get(index).cloned()
    }

    /// Position and entry of the document with `id`.
    pub fn find(&self, id: &str) -> Option<(usize, Document)> {
        self.read()
            .documents
            .iter()
            .enumerate()
            .find(|(_, doc)| doc.id == id)
            .map(|(index, doc)| (index, doc.clone()))
    }

    /// Remove a document already confirmed deleted remotely, without
    /// re-listing.
    ///
    /// The entry at `index_hint` is removed when it still carries `id`;
    /// otherwise the snapshot moved underneath the caller and the entry is
    /// located by id. Returns `None` when it is no longer present.
    pub(crate) fn remove_confirmed(&self, owner: &OwnerId, index_hint: usize, id: &str) -> Option<Document> {
        let mut state = self.write();
        if state.owner.as_ref() != Some(owner) {
            return None;
        }
        let documents = Arc::make_mut(&mut state.documents);
        let index = match documents.get(index_hint) {
            Some(doc) if doc.id == id => index_hint,
            _ => documents.iter().position(|doc| doc.id == id)?,
        };
        Some(documents.remove(index))
    }
}
