use crate::models::{Locator, StoredObject};
use crate::services::progress::ProgressReporter;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{
    aws::{AmazonS3, AmazonS3Builder},
    local::LocalFileSystem,
    memory::InMemory,
    path::Path as ObjectPath,
    signer::Signer,
    Attribute, Attributes, ObjectMeta, ObjectStore, PutMultipartOptions, WriteMultipart,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Bytes handed to the multipart writer between progress reports.
pub const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// Multipart parts allowed in flight before a write waits.
const MAX_IN_FLIGHT_PARTS: usize = 4;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    /// The store could not be reached or refused the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The request started but the transfer failed part way.
    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object path: {0}")]
    InvalidPath(String),

    /// The backend cannot hand out download URLs.
    #[error("download URLs are not supported by the {0} backend")]
    UrlUnsupported(&'static str),
}

impl From<object_store::Error> for BlobStoreError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => BlobStoreError::NotFound(path),
            e @ (object_store::Error::NotSupported { .. }
            | object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. }
            | object_store::Error::UnknownConfigurationKey { .. }) => {
                BlobStoreError::Unavailable(e.to_string())
            }
            e => BlobStoreError::Transfer(e.to_string()),
        }
    }
}

impl From<object_store::path::Error> for BlobStoreError {
    fn from(err: object_store::path::Error) -> Self {
        BlobStoreError::InvalidPath(err.to_string())
    }
}

/// Object path for a raw `/`-separated key.
///
/// `ObjectPath::from` would percent-encode characters such as `é`, `#` or `%`
/// in each segment, so listed names would no longer match uploaded ones.
/// Parsing keeps segments verbatim.
fn object_path(raw: &str) -> Result<ObjectPath, BlobStoreError> {
    Ok(ObjectPath::parse(raw)?)
}

/// Remote object store holding the health-record blobs.
///
/// Paths follow `health_records/{owner}/{file_name}`; locators returned here
/// are the only ones the rest of the crate ever uses.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` at `path`, replacing any existing object.
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        progress: &ProgressReporter,
    ) -> Result<StoredObject, BlobStoreError>;

    /// Every object directly under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, BlobStoreError>;

    /// A URL the bytes can be fetched from, valid for at least `expires_in`.
    async fn resolve_download_url(
        &self,
        locator: &Locator,
        expires_in: Duration,
    ) -> Result<Url, BlobStoreError>;

    async fn delete(&self, locator: &Locator) -> Result<(), BlobStoreError>;
}

/// How a backend turns a locator into a fetchable URL.
enum UrlResolver {
    /// Absolute `file://` URL under the local root.
    File(PathBuf),
    /// Pre-signed GET URL.
    Signed(Arc<AmazonS3>),
    Unsupported(&'static str),
}

/// [`BlobStore`] over the `object_store` crate.
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
    resolver: UrlResolver,
    backend: &'static str,
    /// Whether the backend accepts object attributes such as `Content-Type`.
    /// The local filesystem rejects them.
    attributes: bool,
}

impl ObjectBlobStore {
    /// Store rooted at a local directory, created if missing.
    pub fn local(root: impl Into<PathBuf>) -> Result<Self, BlobStoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            BlobStoreError::Unavailable(format!("cannot create {}: {}", root.display(), e))
        })?;
        let root = std::fs::canonicalize(&root).map_err(|e| {
            BlobStoreError::Unavailable(format!("cannot resolve {}: {}", root.display(), e))
        })?;
        let store = LocalFileSystem::new_with_prefix(&root)?;

        tracing::info!(root = %root.display(), "Using local blob store");
        Ok(Self {
            store: Arc::new(store),
            resolver: UrlResolver::File(root),
            backend: "local",
            attributes: false,
        })
    }

    /// S3 bucket configured from the standard `AWS_*` environment variables.
    pub fn s3(bucket: &str, region: Option<&str>) -> Result<Self, BlobStoreError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        // localstack / minio
        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            if endpoint.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
            builder = builder.with_endpoint(endpoint);
        }
        let s3 = Arc::new(builder.build()?);

        tracing::info!(bucket = %bucket, "Using S3 blob store");
        Ok(Self {
            store: s3.clone(),
            resolver: UrlResolver::Signed(s3),
            backend: "s3",
            attributes: true,
        })
    }

    /// Process-local store. Cannot hand out download URLs.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            resolver: UrlResolver::Unsupported("memory"),
            backend: "memory",
            attributes: true,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    fn stored(meta: ObjectMeta) -> StoredObject {
        StoredObject {
            locator: Locator::from_store(meta.location.as_ref()),
            path: meta.location.to_string(),
            size_bytes: meta.size as u64,
            last_modified: meta.last_modified,
        }
    }

    fn put_options(&self, content_type: &str) -> PutMultipartOptions {
        let mut opts = PutMultipartOptions::default();
        if self.attributes {
            opts.attributes = Attributes::from_iter([(
                Attribute::ContentType,
                content_type.to_string(),
            )]);
        }
        opts
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        progress: &ProgressReporter,
    ) -> Result<StoredObject, BlobStoreError> {
        let location = object_path(path)?;
        let total = data.len() as u64;

        let upload = self
            .store
            .put_multipart_opts(&location, self.put_options(content_type))
            .await
            .map_err(|e| BlobStoreError::Unavailable(e.to_string()))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, UPLOAD_CHUNK_SIZE);

        let mut written = 0u64;
        for chunk in data.chunks(UPLOAD_CHUNK_SIZE) {
            if let Err(e) = writer.wait_for_capacity(MAX_IN_FLIGHT_PARTS).await {
                let _ = writer.abort().await;
                return Err(BlobStoreError::Transfer(e.to_string()));
            }
            writer.write(chunk);
            written += chunk.len() as u64;
            // The final fraction is reserved for the completed upload.
            if written < total {
                progress.report_bytes(written, total);
            }
        }
        writer
            .finish()
            .await
            .map_err(|e| BlobStoreError::Transfer(e.to_string()))?;

        // Size and timestamp as the store recorded them, so the result agrees
        // with the next listing.
        let meta = self.store.head(&location).await?;
        progress.complete();

        Ok(Self::stored(meta))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, BlobStoreError> {
        let prefix = object_path(prefix)?;
        let depth = prefix.parts().count() + 1;

        let metas: Vec<_> = self
            .store
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(|e| BlobStoreError::Unavailable(e.to_string()))?;

        Ok(metas
            .into_iter()
            .filter(|meta| meta.location.parts().count() == depth)
            .map(Self::stored)
            .collect())
    }

    async fn resolve_download_url(
        &self,
        locator: &Locator,
        expires_in: Duration,
    ) -> Result<Url, BlobStoreError> {
        let location = object_path(locator.as_str())?;
        match &self.resolver {
            UrlResolver::File(root) => {
                // Confirm the object exists before handing out a URL to it.
                self.store.head(&location).await?;
                let file = location
                    .parts()
                    .fold(root.clone(), |path, part| path.join(part.as_ref()));
                Url::from_file_path(&file).map_err(|_| {
                    BlobStoreError::Unavailable(format!(
                        "{} is not an absolute path",
                        file.display()
                    ))
                })
            }
            UrlResolver::Signed(s3) => Ok(s3
                .signed_url(http::Method::GET, &location, expires_in)
                .await?),
            UrlResolver::Unsupported(backend) => Err(BlobStoreError::UrlUnsupported(backend)),
        }
    }

    async fn delete(&self, locator: &Locator) -> Result<(), BlobStoreError> {
        self.store.delete(&object_path(locator.as_str())?).await?;
        Ok(())
    }
}
