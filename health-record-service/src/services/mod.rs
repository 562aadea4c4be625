pub mod artifact;
pub mod blob_store;
pub mod deletion;
pub mod fetcher;
pub mod filter;
pub mod library;
pub mod metrics;
pub mod progress;
pub mod registry;
pub mod retrieval;
pub mod upload;

pub use artifact::ViewableArtifact;
pub use blob_store::{BlobStore, BlobStoreError, ObjectBlobStore};
pub use deletion::DeletionManager;
pub use fetcher::{ByteFetcher, FetchError, UrlFetcher};
pub use filter::{filter, filter_indexed};
pub use library::DocumentLibrary;
pub use metrics::{get_metrics, init_metrics};
pub use progress::{progress_channel, ProgressReporter, ProgressStream};
pub use registry::Registry;
pub use retrieval::RetrievalManager;
pub use upload::UploadManager;
