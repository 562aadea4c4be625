use crate::config::{RecordConfig, StorageBackend};
use crate::error::DocumentError;
use crate::handlers;
use crate::models::OwnerId;
use crate::services::{BlobStore, ByteFetcher, DocumentLibrary, ObjectBlobStore, UrlFetcher};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::future::IntoFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

struct CachedLibrary {
    library: Arc<DocumentLibrary>,
    last_used: AtomicU64,
}

#[derive(Clone)]
pub struct AppState {
    pub config: RecordConfig,
    pub store: Arc<dyn BlobStore>,
    pub fetcher: Arc<dyn ByteFetcher>,
    libraries: Arc<DashMap<OwnerId, CachedLibrary>>,
    /// Logical clock ordering library accesses for eviction.
    clock: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        config: RecordConfig,
        store: Arc<dyn BlobStore>,
        fetcher: Arc<dyn ByteFetcher>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            libraries: Arc::new(DashMap::new()),
            clock: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The owner's document library, created on first use.
    ///
    /// At most `max_cached_owners` libraries are kept. Evicting one only drops
    /// its snapshot, which the next request for that owner rebuilds; callers
    /// already holding the `Arc` are unaffected.
    pub fn library(&self, owner: Option<&str>) -> Result<Arc<DocumentLibrary>, DocumentError> {
        let owner = OwnerId::require(owner)?;
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);

        if let Some(cached) = self.libraries.get(&owner) {
            cached.last_used.store(tick, Ordering::Relaxed);
            return Ok(cached.library.clone());
        }

        let library = self
            .libraries
            .entry(owner.clone())
            .or_insert_with(|| CachedLibrary {
                library: Arc::new(DocumentLibrary::new(
                    self.store.clone(),
                    self.fetcher.clone(),
                    &self.config,
                )),
                last_used: AtomicU64::new(tick),
            })
            .library
            .clone();
        self.evict_least_recent(&owner);
        Ok(library)
    }

    /// Owners with a cached library.
    pub fn cached_owners(&self) -> usize {
        self.libraries.len()
    }

    fn evict_least_recent(&self, keep: &OwnerId) {
        while self.libraries.len() > self.config.limits.max_cached_owners {
            let oldest = self
                .libraries
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().last_used.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else { break };
            self.libraries.remove(&oldest);
            tracing::debug!(owner_id = %oldest, "Evicted idle document library");
        }
    }
}

pub fn build_blob_store(config: &RecordConfig) -> Result<Arc<dyn BlobStore>, AppError> {
    let store = match config.storage.backend {
        StorageBackend::Local => ObjectBlobStore::local(&config.storage.local_path),
        StorageBackend::S3 => {
            let bucket = config.storage.s3_bucket.as_deref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("STORAGE_S3_BUCKET is not set"))
            })?;
            ObjectBlobStore::s3(bucket, config.storage.s3_region.as_deref())
        }
        StorageBackend::Memory => Ok(ObjectBlobStore::in_memory()),
    }
    .map_err(|e| {
        tracing::error!(backend = ?config.storage.backend, error = %e, "Failed to initialize blob store");
        AppError::ConfigError(anyhow::Error::new(e))
    })?;
    Ok(Arc::new(store))
}

pub fn router(state: AppState) -> Router {
    // Multipart framing on top of the largest accepted file.
    let body_limit = usize::try_from(state.config.limits.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(64 * 1024);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route(
            "/documents",
            get(handlers::list_documents).post(handlers::upload_document),
        )
        .route("/documents/preview-status", get(handlers::preview_status))
        .route(
            "/documents/:name",
            axum::routing::delete(handlers::delete_document),
        )
        .route("/documents/:name/preview", get(handlers::preview_document))
        .route("/documents/:name/download", post(handlers::download_document))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(config: RecordConfig) -> Result<Self, AppError> {
        let store = build_blob_store(&config)?;
        let fetcher: Arc<dyn ByteFetcher> = Arc::new(
            UrlFetcher::new(config.download.fetch_timeout())
                .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?,
        );
        let state = AppState::new(config.clone(), store, fetcher);

        let address = format!("0.0.0.0:{}", config.common.port);
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind to {}: {}", address, e);
            e
        })?;
        let port = listener.local_addr()?.port();
        tracing::info!(port = port, backend = ?config.storage.backend, "Health record service listening");

        let app = router(state.clone());
        let server = axum::serve(listener, app).into_future();

        Ok(Self {
            port,
            server: Box::new(server),
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
