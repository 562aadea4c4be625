//! End-to-end runs against the filesystem-backed store and the real fetcher.

mod common;

use common::{pdf_bytes as pdf, OWNER};
use health_record_service::config::RecordConfig;
use health_record_service::models::{OCTET_STREAM_CONTENT_TYPE, PDF_CONTENT_TYPE};
use health_record_service::services::{filter, DocumentLibrary, ObjectBlobStore, UrlFetcher};
use health_record_service::DocumentError;
use std::sync::Arc;
use std::time::Duration;

fn library(root: &tempfile::TempDir) -> (DocumentLibrary, RecordConfig) {
    let config = RecordConfig::local(&root.path().display().to_string());
    let store = Arc::new(
        ObjectBlobStore::local(&config.storage.local_path).expect("Failed to open local store"),
    );
    let fetcher =
        Arc::new(UrlFetcher::new(Duration::from_secs(5)).expect("Failed to build fetcher"));
    (DocumentLibrary::new(store, fetcher, &config), config)
}

#[tokio::test]
async fn upload_preview_download_delete_round_trip() {
    let root = tempfile::tempdir().unwrap();
    let (library, config) = library(&root);

    let doc = library
        .uploads
        .upload(Some(OWNER), pdf("discharge summary"), "discharge.pdf")
        .await
        .expect("upload failed");
    assert!(root
        .path()
        .join("storage/health_records")
        .join(OWNER)
        .join("discharge.pdf")
        .exists());

    let artifact = library.retrieval.preview(Some(OWNER), &doc).await.unwrap();
    assert_eq!(artifact.pdf_version, "1.7");
    assert_eq!(artifact.page_count, 1);
    assert_eq!(artifact.bytes, pdf("discharge summary"));
    assert!(!library.retrieval.is_busy());

    let copy = library.retrieval.download(Some(OWNER), &doc).await.unwrap();
    assert!(copy.starts_with(&config.download.dir));
    assert_eq!(std::fs::read(&copy).unwrap(), pdf("discharge summary"));

    library.deletion.delete(Some(OWNER), &doc, 0).await.unwrap();
    assert!(library.registry.is_empty());
    let listed = library.registry.refresh(Some(OWNER)).await.unwrap();
    assert!(listed.is_empty());
    // The downloaded copy is independent of the remote object.
    assert!(copy.exists());
}

#[tokio::test]
async fn registry_reflects_objects_written_out_of_band() {
    let root = tempfile::tempdir().unwrap();
    let (library, _) = library(&root);
    library
        .uploads
        .upload(Some(OWNER), pdf("a"), "a.pdf")
        .await
        .unwrap();

    let dir = root.path().join("storage/health_records").join(OWNER);
    std::fs::write(dir.join("b.pdf"), pdf("b")).unwrap();

    let found = library.search(Some(OWNER), "", true).await.unwrap();
    let names: Vec<&str> = found.iter().map(|(_, d)| d.name.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf"]);
}

#[tokio::test]
async fn preview_of_object_removed_out_of_band_fails_resolution() {
    let root = tempfile::tempdir().unwrap();
    let (library, _) = library(&root);
    let doc = library
        .uploads
        .upload(Some(OWNER), pdf("a"), "a.pdf")
        .await
        .unwrap();

    std::fs::remove_file(
        root.path()
            .join("storage/health_records")
            .join(OWNER)
            .join("a.pdf"),
    )
    .unwrap();

    let err = library.retrieval.preview(Some(OWNER), &doc).await.unwrap_err();
    assert!(matches!(err, DocumentError::LocatorResolutionFailed(_)));
    assert!(!library.retrieval.is_busy());
}

#[tokio::test]
async fn in_memory_store_cannot_preview() {
    let root = tempfile::tempdir().unwrap();
    let config = RecordConfig::local(&root.path().display().to_string());
    let fetcher = Arc::new(UrlFetcher::new(Duration::from_secs(5)).unwrap());
    let library = DocumentLibrary::new(Arc::new(ObjectBlobStore::in_memory()), fetcher, &config);

    let doc = library
        .uploads
        .upload(Some(OWNER), pdf("a"), "a.pdf")
        .await
        .unwrap();
    let err = library.retrieval.preview(Some(OWNER), &doc).await.unwrap_err();

    assert!(matches!(err, DocumentError::LocatorResolutionFailed(_)));
}

#[tokio::test]
async fn names_survive_upload_list_search_and_preview_verbatim() {
    let root = tempfile::tempdir().unwrap();
    let (library, _) = library(&root);
    let names = ["résumé.pdf", "lab #2.pdf", "100%.pdf"];

    for name in names {
        let doc = library
            .uploads
            .upload(Some(OWNER), pdf(name), name)
            .await
            .expect("upload failed");
        assert_eq!(doc.name, name);
        assert_eq!(doc.id, format!("{}/{}", OWNER, name));

        let artifact = library.retrieval.preview(Some(OWNER), &doc).await.unwrap();
        assert_eq!(artifact.bytes, pdf(name));
        let copy = library.retrieval.download(Some(OWNER), &doc).await.unwrap();
        assert_eq!(std::fs::read(&copy).unwrap(), pdf(name));
    }

    let listed = library.registry.refresh(Some(OWNER)).await.unwrap();
    let mut listed_names: Vec<&str> = listed.iter().map(|d| d.name.as_str()).collect();
    listed_names.sort();
    assert_eq!(listed_names, vec!["100%.pdf", "lab #2.pdf", "résumé.pdf"]);

    let hits = filter(&listed, "RÉSUMÉ".to_lowercase().as_str());
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "résumé.pdf");

    let (index, doc) = library
        .registry
        .find(&format!("{}/lab #2.pdf", OWNER))
        .expect("listed by its original name");
    library.deletion.delete(Some(OWNER), &doc, index).await.unwrap();
    assert!(!root
        .path()
        .join("storage/health_records")
        .join(OWNER)
        .join("lab #2.pdf")
        .exists());
}

#[tokio::test]
async fn upload_result_matches_the_next_listing() {
    let root = tempfile::tempdir().unwrap();
    let (library, _) = library(&root);

    let uploaded = library
        .uploads
        .upload(Some(OWNER), pdf("scan"), "scan.bin")
        .await
        .unwrap();
    let listed = library.registry.refresh(Some(OWNER)).await.unwrap();

    assert_eq!(listed, vec![uploaded.clone()]);
    // Listings carry no content type, so it always follows the extension.
    assert_eq!(uploaded.content_type, OCTET_STREAM_CONTENT_TYPE);

    let doc = library
        .uploads
        .upload(Some(OWNER), pdf("report"), "report.pdf")
        .await
        .unwrap();
    assert_eq!(doc.content_type, PDF_CONTENT_TYPE);
}
