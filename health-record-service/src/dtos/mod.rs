pub mod documents;

pub use documents::{
    DeleteParams, DeleteResponse, DocumentListParams, DocumentListResponse, DocumentResponse,
    DownloadResponse, PreviewStatusResponse,
};
