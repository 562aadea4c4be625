use crate::error::DocumentError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Root of every owner namespace in the blob store.
pub const STORAGE_ROOT: &str = "health_records";

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";

/// Identifier of the authenticated user that scopes a set of documents.
///
/// Only constructed through [`OwnerId::require`], so it is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Resolve an optional owner coming from the current-user provider.
    ///
    /// An absent or blank owner is `MissingOwner`; there is no fallback
    /// namespace.
    pub fn require(owner: Option<&str>) -> Result<Self, DocumentError> {
        let owner = owner
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or(DocumentError::MissingOwner)?;
        if !is_valid_segment(owner) {
            return Err(DocumentError::InvalidInput(format!(
                "owner id {:?} cannot be used as a path segment",
                owner
            )));
        }
        Ok(Self(owner.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `health_records/{owner}`: the prefix listed by a registry refresh.
    pub fn storage_prefix(&self) -> String {
        format!("{}/{}", STORAGE_ROOT, self.0)
    }

    /// `health_records/{owner}/{file_name}`: where an upload lands.
    pub fn storage_path(&self, file_name: &str) -> String {
        format!("{}/{}/{}", STORAGE_ROOT, self.0, file_name)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A name usable as a single path segment.
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains('/')
        && !segment.contains('\\')
        && !segment.chars().any(char::is_control)
}

/// Opaque handle for a stored object.
///
/// Meaningful only to the [`BlobStore`](crate::services::BlobStore) that
/// produced it; the document core passes it around but never builds one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// For blob store implementations only.
    pub fn from_store(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One object as reported by the blob store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub locator: Locator,
    /// Full object path, `health_records/{owner}/{name}`.
    pub path: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

impl StoredObject {
    /// Leaf segment of the object path.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// `{owner_id}/{name}`
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
    #[serde(skip)]
    pub locator: Locator,
}

impl Document {
    pub fn document_id(owner: &OwnerId, name: &str) -> String {
        format!("{}/{}", owner.as_str(), name)
    }

    /// Convert a listed object into a document of `owner`.
    pub fn from_stored(owner: &OwnerId, object: StoredObject) -> Self {
        let name = object.name().to_string();
        Self {
            id: Self::document_id(owner, &name),
            owner_id: owner.as_str().to_string(),
            content_type: content_type_for_name(&name).to_string(),
            name,
            size_bytes: object.size_bytes,
            last_modified: object.last_modified,
            locator: object.locator,
        }
    }

    pub fn belongs_to(&self, owner: &OwnerId) -> bool {
        self.owner_id == owner.as_str()
    }

    /// File extension used for locally downloaded copies.
    pub fn extension(&self) -> &str {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("pdf")
    }
}

pub fn content_type_for_name(name: &str) -> &'static str {
    let is_pdf = std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        PDF_CONTENT_TYPE
    } else {
        OCTET_STREAM_CONTENT_TYPE
    }
}

/// Sniff the content type from magic numbers, falling back to the file name.
pub fn detect_content_type(bytes: &[u8], name: &str) -> String {
    infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| content_type_for_name(name).to_string())
}
