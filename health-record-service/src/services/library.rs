use crate::config::RecordConfig;
use crate::error::DocumentError;
use crate::models::Document;
use crate::services::blob_store::BlobStore;
use crate::services::deletion::DeletionManager;
use crate::services::fetcher::ByteFetcher;
use crate::services::filter;
use crate::services::registry::Registry;
use crate::services::retrieval::RetrievalManager;
use crate::services::upload::UploadManager;
use std::sync::Arc;

/// One registry plus the managers that keep it in sync.
///
/// All managers share the same registry, so uploads and deletions are
/// visible to list and search immediately after they resolve.
pub struct DocumentLibrary {
    pub registry: Arc<Registry>,
    pub uploads: UploadManager,
    pub retrieval: RetrievalManager,
    pub deletion: DeletionManager,
}

impl DocumentLibrary {
    pub fn new(
        store: Arc<dyn BlobStore>,
        fetcher: Arc<dyn ByteFetcher>,
        config: &RecordConfig,
    ) -> Self {
        let registry = Arc::new(Registry::new(store.clone()));
        Self {
            uploads: UploadManager::new(
                store.clone(),
                registry.clone(),
                config.limits.max_upload_bytes,
            ),
            retrieval: RetrievalManager::new(
                store.clone(),
                fetcher,
                &config.download.dir,
                config.download.url_ttl(),
            ),
            deletion: DeletionManager::new(store, registry.clone()),
            registry,
        }
    }

    /// Snapshot filtered by `query`, refreshing first when the registry has
    /// not been loaded for `owner` yet.
    pub async fn search(
        &self,
        owner: Option<&str>,
        query: &str,
        force_refresh: bool,
    ) -> Result<Vec<(usize, Document)>, DocumentError> {
        let loaded = self
            .registry
            .active_owner()
            .is_some_and(|active| Some(active.as_str()) == owner);
        if force_refresh || !loaded {
            self.registry.refresh(owner).await?;
        }

        let snapshot = self.registry.snapshot();
        Ok(filter::filter_indexed(&snapshot, query)
            .into_iter()
            .map(|(index, doc)| (index, doc.clone()))
            .collect())
    }
}
