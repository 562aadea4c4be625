use crate::error::DocumentError;
use crate::models::{Document, OwnerId};
use crate::services::artifact::ViewableArtifact;
use crate::services::blob_store::BlobStore;
use crate::services::fetcher::{ByteFetcher, FetchError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use url::Url;
use uuid::Uuid;

/// Raises the busy flag for its lifetime.
struct BusyGuard<'a> {
    flag: &'a watch::Sender<bool>,
}

impl<'a> BusyGuard<'a> {
    fn engage(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self { flag }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.send_replace(false);
    }
}

/// Resolves documents to download URLs and fetches their bytes.
pub struct RetrievalManager {
    store: Arc<dyn BlobStore>,
    fetcher: Arc<dyn ByteFetcher>,
    download_dir: PathBuf,
    url_ttl: Duration,
    busy: watch::Sender<bool>,
}

impl RetrievalManager {
    pub fn new(
        store: Arc<dyn BlobStore>,
        fetcher: Arc<dyn ByteFetcher>,
        download_dir: impl Into<PathBuf>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            download_dir: download_dir.into(),
            url_ttl,
            busy: watch::channel(false).0,
        }
    }

    /// Whether a preview fetch is in flight.
    ///
    /// A single slot, not a counter: with overlapping previews it follows
    /// whichever one finished last.
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    fn check_owner(owner: Option<&str>, document: &Document) -> Result<OwnerId, DocumentError> {
        let owner = OwnerId::require(owner)?;
        if !document.belongs_to(&owner) {
            return Err(DocumentError::InvalidInput(format!(
                "document {} does not belong to owner {}",
                document.id, owner
            )));
        }
        Ok(owner)
    }

    async fn resolve(&self, document: &Document) -> Result<Url, DocumentError> {
        self.store
            .resolve_download_url(&document.locator, self.url_ttl)
            .await
            .map_err(|e| {
                tracing::warn!(document_id = %document.id, error = %e, "Download URL resolution failed");
                DocumentError::LocatorResolutionFailed(e.to_string())
            })
    }

    /// Fetch `document` and validate it as a viewable PDF.
    ///
    /// The busy flag is raised for URL resolution, fetch and validation and
    /// dropped on every exit path.
    pub async fn preview(
        &self,
        owner: Option<&str>,
        document: &Document,
    ) -> Result<ViewableArtifact, DocumentError> {
        Self::check_owner(owner, document)?;
        let _busy = BusyGuard::engage(&self.busy);
        let started = Instant::now();

        let result = self.fetch_artifact(document).await;

        metrics::histogram!("document_preview_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(artifact) => {
                metrics::counter!("document_previews_total", "outcome" => "ok").increment(1);
                tracing::info!(
                    document_id = %document.id,
                    size = artifact.size_bytes,
                    pdf_version = %artifact.pdf_version,
                    "Document preview ready"
                );
            }
            Err(e) => {
                metrics::counter!("document_previews_total", "outcome" => e.kind()).increment(1);
                tracing::warn!(document_id = %document.id, error = %e, "Document preview failed");
            }
        }
        result
    }

    async fn fetch_artifact(&self, document: &Document) -> Result<ViewableArtifact, DocumentError> {
        let url = self.resolve(document).await?;
        let bytes = self.fetcher.fetch(&url).await.map_err(fetch_error)?;
        ViewableArtifact::parse(document, bytes)
    }

    /// Copy `document` into a freshly named file in the download directory.
    ///
    /// Every call gets a new unique name, so an existing local file is never
    /// overwritten. Does not touch the busy flag.
    pub async fn download(
        &self,
        owner: Option<&str>,
        document: &Document,
    ) -> Result<PathBuf, DocumentError> {
        Self::check_owner(owner, document)?;
        let url = self.resolve(document).await?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let dest = self
            .download_dir
            .join(format!("{}.{}", Uuid::new_v4(), document.extension()));

        let written = self.fetcher.fetch_to_file(&url, &dest).await.map_err(|e| {
            tracing::error!(document_id = %document.id, error = %e, "Document download failed");
            metrics::counter!("document_download_failures_total").increment(1);
            fetch_error(e)
        })?;

        metrics::counter!("document_downloads_total").increment(1);
        tracing::info!(
            document_id = %document.id,
            path = %dest.display(),
            size = written,
            "Document downloaded"
        );
        Ok(dest)
    }
}

fn fetch_error(err: FetchError) -> DocumentError {
    match err {
        FetchError::Local(e) => DocumentError::LocalStorage(e),
        other => DocumentError::NetworkError(other.to_string()),
    }
}
