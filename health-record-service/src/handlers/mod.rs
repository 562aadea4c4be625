pub mod documents;
pub mod health;

pub use documents::{
    delete_document, download_document, list_documents, preview_document, preview_status,
    upload_document,
};
pub use health::{health_check, metrics_endpoint};
