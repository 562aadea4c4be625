pub mod document;

pub use document::{
    content_type_for_name, detect_content_type, is_valid_segment, Document, Locator, OwnerId,
    StoredObject, OCTET_STREAM_CONTENT_TYPE, PDF_CONTENT_TYPE, STORAGE_ROOT,
};
