use crate::error::DocumentError;
use crate::models::{detect_content_type, is_valid_segment, Document, OwnerId};
use crate::services::blob_store::{BlobStore, BlobStoreError};
use crate::services::progress::{progress_channel, ProgressReporter, ProgressStream};
use crate::services::registry::Registry;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Validate)]
struct UploadRequest {
    #[validate(length(min = 1, message = "file name must not be empty"))]
    file_name: String,
    #[validate(range(min = 1, message = "file must not be empty"))]
    size: u64,
}

/// Turns local bytes into a stored blob and refreshes the registry.
pub struct UploadManager {
    store: Arc<dyn BlobStore>,
    registry: Arc<Registry>,
    max_upload_bytes: u64,
}

impl UploadManager {
    pub fn new(store: Arc<dyn BlobStore>, registry: Arc<Registry>, max_upload_bytes: u64) -> Self {
        Self {
            store,
            registry,
            max_upload_bytes,
        }
    }

    /// Start an upload, returning its progress stream alongside the
    /// completion future. Dropping the stream does not affect the upload.
    pub fn start<'a>(
        &'a self,
        owner: Option<&'a str>,
        data: Bytes,
        file_name: &'a str,
    ) -> (
        ProgressStream,
        impl Future<Output = Result<Document, DocumentError>> + 'a,
    ) {
        let (reporter, stream) = progress_channel();
        let completion =
            async move { self.upload_with_progress(owner, data, file_name, &reporter).await };
        (stream, completion)
    }

    /// Upload without observing progress.
    pub async fn upload(
        &self,
        owner: Option<&str>,
        data: Bytes,
        file_name: &str,
    ) -> Result<Document, DocumentError> {
        self.upload_with_progress(owner, data, file_name, &ProgressReporter::detached())
            .await
    }

    /// Write `data` to `health_records/{owner}/{file_name}`, replacing any
    /// object already there, then refresh the registry.
    ///
    /// Resolves only after the refresh, so the returned document is already
    /// part of the snapshot. Nothing is retried.
    pub async fn upload_with_progress(
        &self,
        owner: Option<&str>,
        data: Bytes,
        file_name: &str,
        progress: &ProgressReporter,
    ) -> Result<Document, DocumentError> {
        let owner = OwnerId::require(owner)?;
        self.validate(&data, file_name)?;

        let path = owner.storage_path(file_name);
        let content_type = detect_content_type(&data, file_name);
        let size = data.len() as u64;

        tracing::info!(
            owner_id = %owner,
            file_name = %file_name,
            size = size,
            content_type = %content_type,
            "Document upload started"
        );

        let stored = self
            .store
            .put(&path, data, &content_type, progress)
            .await
            .map_err(|e| {
                tracing::error!(owner_id = %owner, path = %path, error = %e, "Upload failed");
                metrics::counter!("document_upload_failures_total").increment(1);
                match e {
                    BlobStoreError::Unavailable(msg) => DocumentError::StoreUnavailable(msg),
                    other => DocumentError::NetworkError(other.to_string()),
                }
            })?;

        self.registry.refresh(Some(owner.as_str())).await?;
        progress.complete();

        let id = Document::document_id(&owner, stored.name());
        let document = self
            .registry
            .find(&id)
            .map(|(_, doc)| doc)
            .unwrap_or_else(|| Document::from_stored(&owner, stored));

        metrics::counter!("document_uploads_total").increment(1);
        metrics::counter!("document_upload_bytes_total").increment(size);
        tracing::info!(
            owner_id = %owner,
            document_id = %document.id,
            "Document upload completed"
        );

        Ok(document)
    }

    fn validate(&self, data: &Bytes, file_name: &str) -> Result<(), DocumentError> {
        UploadRequest {
            file_name: file_name.to_string(),
            size: data.len() as u64,
        }
        .validate()?;

        if !is_valid_segment(file_name) {
            return Err(DocumentError::InvalidInput(format!(
                "file name {:?} must be a single path segment",
                file_name
            )));
        }
        if data.len() as u64 > self.max_upload_bytes {
            return Err(DocumentError::InvalidInput(format!(
                "file is {} bytes, the limit is {}",
                data.len(),
                self.max_upload_bytes
            )));
        }
        Ok(())
    }
}
