use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Reading the remote bytes failed.
    #[error("fetch of {url} failed: {reason}")]
    Transfer { url: String, reason: String },

    #[error("unsupported URL scheme {0:?}")]
    UnsupportedScheme(String),

    /// Writing the local copy failed.
    #[error(transparent)]
    Local(#[from] std::io::Error),
}

impl FetchError {
    fn transfer(url: &Url, reason: impl ToString) -> Self {
        FetchError::Transfer {
            url: redact(url),
            reason: reason.to_string(),
        }
    }
}

/// Drop the query so pre-signed credentials never reach the logs.
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

/// Pulls the bytes behind a resolved download URL.
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Bytes, FetchError>;

    /// Stream the bytes into `dest`, which must not exist yet. Returns the
    /// number of bytes written. A partial file is removed on failure.
    async fn fetch_to_file(&self, url: &Url, dest: &Path) -> Result<u64, FetchError>;
}

/// Fetches `http(s)://` URLs with reqwest and `file://` URLs from disk.
#[derive(Clone)]
pub struct UrlFetcher {
    client: reqwest::Client,
}

impl UrlFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transfer {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response, FetchError> {
        self.client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::transfer(url, e))
    }

    async fn stream_http(&self, url: &Url, file: &mut File) -> Result<u64, FetchError> {
        let mut response = self.get(url).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::transfer(url, e))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }

    async fn stream_file(url: &Url, file: &mut File) -> Result<u64, FetchError> {
        let source = local_path(url)?;
        let mut reader = File::open(&source)
            .await
            .map_err(|e| FetchError::transfer(url, e))?;
        Ok(tokio::io::copy(&mut reader, file).await?)
    }
}

fn local_path(url: &Url) -> Result<std::path::PathBuf, FetchError> {
    url.to_file_path()
        .map_err(|_| FetchError::transfer(url, "not a local file URL"))
}

#[async_trait]
impl ByteFetcher for UrlFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes, FetchError> {
        match url.scheme() {
            "http" | "https" => self
                .get(url)
                .await?
                .bytes()
                .await
                .map_err(|e| FetchError::transfer(url, e)),
            "file" => fs::read(local_path(url)?)
                .await
                .map(Bytes::from)
                .map_err(|e| FetchError::transfer(url, e)),
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }

    async fn fetch_to_file(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        if !matches!(url.scheme(), "http" | "https" | "file") {
            return Err(FetchError::UnsupportedScheme(url.scheme().to_string()));
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .await?;

        let result = match url.scheme() {
            "file" => Self::stream_file(url, &mut file).await,
            _ => self.stream_http(url, &mut file).await,
        };
        let result = match result {
            Ok(written) => file.flush().await.map(|_| written).map_err(FetchError::from),
            Err(e) => Err(e),
        };

        if result.is_err() {
            drop(file);
            let _ = fs::remove_file(dest).await;
        }
        result
    }
}
