#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use health_record_service::config::RecordConfig;
use health_record_service::models::{Locator, StoredObject};
use health_record_service::services::{
    BlobStore, BlobStoreError, ByteFetcher, DeletionManager, FetchError, ProgressReporter,
    Registry, RetrievalManager, UploadManager,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

pub const OWNER: &str = "patient-42";
pub const OTHER_OWNER: &str = "patient-7";

/// A one-page PDF with a valid cross-reference table. `note` goes into a
/// comment so different fixtures have different bytes.
pub fn pdf_bytes(note: &str) -> Bytes {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
    ];
    let mut pdf = format!("%PDF-1.7\n% {}\n", note).into_bytes();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    Bytes::from(pdf)
}

#[derive(Default)]
pub struct CallCounts {
    pub puts: AtomicUsize,
    pub lists: AtomicUsize,
    pub resolves: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
            + self.lists.load(Ordering::SeqCst)
            + self.resolves.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }
}

/// In-memory blob store that counts calls and can be told to fail.
#[derive(Default)]
pub struct MockBlobStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    pub calls: CallCounts,
    pub fail_put: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_resolve: AtomicBool,
    pub fail_delete: AtomicBool,
    busy_rx: Mutex<Option<watch::Receiver<bool>>>,
    pub busy_seen: Mutex<Vec<bool>>,
}

impl MockBlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Put an object directly, bypassing the call counters.
    pub fn seed(&self, path: &str, data: Bytes) {
        self.objects.lock().unwrap().insert(path.to_string(), data);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn object(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    /// Record the busy flag every time a download URL is resolved.
    pub fn watch_busy(&self, rx: watch::Receiver<bool>) {
        *self.busy_rx.lock().unwrap() = Some(rx);
    }

    fn record_busy(&self) {
        if let Some(rx) = self.busy_rx.lock().unwrap().as_ref() {
            self.busy_seen.lock().unwrap().push(*rx.borrow());
        }
    }

    fn stored(path: &str, size: usize) -> StoredObject {
        StoredObject {
            locator: Locator::from_store(path),
            path: path.to_string(),
            size_bytes: size as u64,
            last_modified: Utc::now(),
        }
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        _content_type: &str,
        progress: &ProgressReporter,
    ) -> Result<StoredObject, BlobStoreError> {
        self.calls.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Transfer("connection reset".to_string()));
        }
        progress.report(0.5);
        let size = data.len();
        self.objects.lock().unwrap().insert(path.to_string(), data);
        progress.complete();
        Ok(Self::stored(path, size))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, BlobStoreError> {
        self.calls.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Unavailable("store offline".to_string()));
        }
        let prefix = format!("{}/", prefix);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| {
                path.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('/'))
            })
            .map(|(path, data)| Self::stored(path, data.len()))
            .collect())
    }

    async fn resolve_download_url(
        &self,
        locator: &Locator,
        _expires_in: Duration,
    ) -> Result<Url, BlobStoreError> {
        self.calls.resolves.fetch_add(1, Ordering::SeqCst);
        self.record_busy();
        if self.fail_resolve.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Unavailable("signing failed".to_string()));
        }
        if !self.contains(locator.as_str()) {
            return Err(BlobStoreError::NotFound(locator.as_str().to_string()));
        }
        Url::parse(&format!("mock://blobs/{}", locator.as_str()))
            .map_err(|e| BlobStoreError::Unavailable(e.to_string()))
    }

    async fn delete(&self, locator: &Locator) -> Result<(), BlobStoreError> {
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BlobStoreError::Transfer("timed out".to_string()));
        }
        self.objects.lock().unwrap().remove(locator.as_str());
        Ok(())
    }
}

/// Serves `mock://blobs/{path}` URLs out of a [`MockBlobStore`].
pub struct MockFetcher {
    store: Arc<MockBlobStore>,
    pub fail: AtomicBool,
    pub fetches: AtomicUsize,
}

impl MockFetcher {
    pub fn new(store: Arc<MockBlobStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            fail: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        })
    }

    fn read(&self, url: &Url) -> Result<Bytes, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.store.record_busy();
        let transfer = |reason: &str| FetchError::Transfer {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        if self.fail.load(Ordering::SeqCst) {
            return Err(transfer("connection dropped"));
        }
        let path = url.path().trim_start_matches('/');
        self.store.object(path).ok_or_else(|| transfer("404"))
    }
}

#[async_trait]
impl ByteFetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes, FetchError> {
        self.read(url)
    }

    async fn fetch_to_file(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        let bytes = self.read(url)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &bytes).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;
        Ok(bytes.len() as u64)
    }
}

/// Registry and managers wired to the mocks.
pub struct Harness {
    pub store: Arc<MockBlobStore>,
    pub fetcher: Arc<MockFetcher>,
    pub registry: Arc<Registry>,
    pub uploads: UploadManager,
    pub retrieval: RetrievalManager,
    pub deletion: DeletionManager,
    pub scratch: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_limit(RecordConfig::local("unused").limits.max_upload_bytes)
    }

    pub fn with_limit(max_upload_bytes: u64) -> Self {
        let store = MockBlobStore::new();
        let fetcher = MockFetcher::new(store.clone());
        let registry = Arc::new(Registry::new(store.clone()));
        let scratch = tempfile::tempdir().expect("Failed to create scratch dir");

        Self {
            uploads: UploadManager::new(store.clone(), registry.clone(), max_upload_bytes),
            retrieval: RetrievalManager::new(
                store.clone(),
                fetcher.clone(),
                scratch.path().join("downloads"),
                Duration::from_secs(60),
            ),
            deletion: DeletionManager::new(store.clone(), registry.clone()),
            store,
            fetcher,
            registry,
            scratch,
        }
    }

    /// Upload `names` as PDFs for `owner`, in order.
    pub async fn upload_all(&self, owner: &str, names: &[&str]) {
        for name in names {
            self.uploads
                .upload(Some(owner), pdf_bytes(name), name)
                .await
                .expect("Failed to upload fixture");
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|doc| doc.name)
            .collect()
    }
}
