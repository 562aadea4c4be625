use crate::models::Document;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub last_modified: String,
    /// Position in the owner's snapshot; the index hint for deletion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl DocumentResponse {
    pub fn with_index(doc: Document, index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::from(doc)
        }
    }
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            owner_id: doc.owner_id,
            name: doc.name,
            content_type: doc.content_type,
            size_bytes: doc.size_bytes,
            last_modified: doc.last_modified.to_rfc3339(),
            index: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentListParams {
    /// Case-insensitive name filter.
    pub q: Option<String>,
    /// Re-list from the blob store before answering.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentResponse>,
    pub total: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    /// Snapshot position the caller saw the document at. Without it the
    /// document is deleted by id.
    pub index: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub id: String,
    pub remaining: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewStatusResponse {
    pub busy: bool,
}
