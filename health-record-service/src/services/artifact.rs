use crate::error::DocumentError;
use crate::models::{Document, PDF_CONTENT_TYPE};
use bytes::Bytes;
use serde::Serialize;

const PDF_HEADER: &[u8] = b"%PDF-";
const PDF_EOF_MARKER: &[u8] = b"%%EOF";
/// Readers look for `%%EOF` within the trailing kilobyte.
const EOF_SEARCH_WINDOW: usize = 1024;

/// Fetched document bytes that passed format validation and can be rendered.
#[derive(Debug, Clone, Serialize)]
pub struct ViewableArtifact {
    pub document_id: String,
    pub name: String,
    pub content_type: &'static str,
    /// Version from the `%PDF-x.y` header.
    pub pdf_version: String,
    pub page_count: usize,
    pub size_bytes: usize,
    #[serde(skip)]
    pub bytes: Bytes,
}

impl ViewableArtifact {
    /// Validate `bytes` as a PDF belonging to `document`.
    pub fn parse(document: &Document, bytes: Bytes) -> Result<Self, DocumentError> {
        let pdf_version = validate_pdf(&bytes)?;
        let page_count = count_pages(&bytes)?;
        Ok(Self {
            document_id: document.id.clone(),
            name: document.name.clone(),
            content_type: PDF_CONTENT_TYPE,
            pdf_version,
            page_count,
            size_bytes: bytes.len(),
            bytes,
        })
    }
}

/// Cheap structural pre-check: magic number, a parseable header version and
/// an end-of-file marker. Returns the header version.
pub fn validate_pdf(bytes: &[u8]) -> Result<String, DocumentError> {
    let is_pdf = infer::get(bytes).is_some_and(|kind| kind.mime_type() == PDF_CONTENT_TYPE);
    if !is_pdf || !bytes.starts_with(PDF_HEADER) {
        return Err(DocumentError::CorruptArtifact(
            "missing %PDF header".to_string(),
        ));
    }

    let version: String = bytes[PDF_HEADER.len()..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|b| *b as char)
        .collect();
    let valid_version = matches!(
        version.split_once('.'),
        Some((major, minor)) if !major.is_empty() && !minor.is_empty()
    );
    if !valid_version {
        return Err(DocumentError::CorruptArtifact(format!(
            "unreadable header version {:?}",
            version
        )));
    }

    let tail_start = bytes.len().saturating_sub(EOF_SEARCH_WINDOW);
    let has_eof = bytes[tail_start..]
        .windows(PDF_EOF_MARKER.len())
        .any(|w| w == PDF_EOF_MARKER);
    if !has_eof {
        return Err(DocumentError::CorruptArtifact(
            "missing %%EOF marker, file is truncated".to_string(),
        ));
    }

    Ok(version)
}

/// Parse the full object graph and count its pages.
pub fn count_pages(bytes: &[u8]) -> Result<usize, DocumentError> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| DocumentError::CorruptArtifact(format!("unparseable PDF body: {}", e)))?;
    let pages = document.get_pages().len();
    if pages == 0 {
        return Err(DocumentError::CorruptArtifact(
            "PDF has no pages".to_string(),
        ));
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Locator, OwnerId, StoredObject};
    use chrono::Utc;

    fn one_page_pdf(note: &str) -> Vec<u8> {
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
        pdf
    }

    fn document() -> Document {
        let owner = OwnerId::require(Some("owner-1")).unwrap();
        let path = owner.storage_path("scan.pdf");
        Document::from_stored(
            &owner,
            StoredObject {
                locator: Locator::from_store(path.clone()),
                path,
                size_bytes: 1,
                last_modified: Utc::now(),
            },
        )
    }

    #[test]
    fn test_parse_counts_pages() {
        let artifact = ViewableArtifact::parse(&document(), Bytes::from(one_page_pdf("labs"))).unwrap();
        assert_eq!(artifact.pdf_version, "1.7");
        assert_eq!(artifact.page_count, 1);
        assert_eq!(artifact.document_id, "owner-1/scan.pdf");
    }

    #[test]
    fn test_header_and_trailer_around_garbage_is_corrupt() {
        let junk = Bytes::from_static(b"%PDF-1.4\nthis is not a pdf body at all\n%%EOF");
        assert!(validate_pdf(&junk).is_ok());

        let err = ViewableArtifact::parse(&document(), junk).unwrap_err();
        assert!(matches!(err, DocumentError::CorruptArtifact(_)));
    }

    #[test]
    fn test_pdf_without_pages_is_corrupt() {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        let catalog = pdf.len();
        pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        let pages = pdf.len();
        pdf.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");
        let xref = pdf.len();
        pdf.extend_from_slice(
            format!(
                "xref\n0 3\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                catalog, pages, xref
            )
            .as_bytes(),
        );

        assert!(matches!(
            count_pages(&pdf),
            Err(DocumentError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_valid_pdf() {
        let pdf = b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n%%EOF\n";
        assert_eq!(validate_pdf(pdf).unwrap(), "1.7");
    }

    #[test]
    fn test_not_a_pdf() {
        let err = validate_pdf(b"<html>not a pdf</html>").unwrap_err();
        assert!(matches!(err, DocumentError::CorruptArtifact(_)));
    }

    #[test]
    fn test_empty_bytes() {
        assert!(matches!(
            validate_pdf(b""),
            Err(DocumentError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_bad_version() {
        assert!(matches!(
            validate_pdf(b"%PDF-x\n%%EOF"),
            Err(DocumentError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_truncated_pdf() {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        pdf.extend(std::iter::repeat(b'a').take(4096));
        let err = validate_pdf(&pdf).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_eof_marker_must_be_near_the_end() {
        let mut pdf = b"%PDF-1.4\n%%EOF\n".to_vec();
        pdf.extend(std::iter::repeat(b' ').take(EOF_SEARCH_WINDOW + 1));
        assert!(validate_pdf(&pdf).is_err());
    }
}
