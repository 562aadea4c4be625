use crate::models::Document;

/// Case-insensitive substring match on the document name.
pub fn matches(document: &Document, query: &str) -> bool {
    query.is_empty() || document.name.to_lowercase().contains(&query.to_lowercase())
}

/// Documents of `snapshot` whose name contains `query`, in snapshot order.
///
/// An empty query returns the whole snapshot.
pub fn filter(snapshot: &[Document], query: &str) -> Vec<Document> {
    filter_indexed(snapshot, query)
        .into_iter()
        .map(|(_, doc)| doc.clone())
        .collect()
}

/// Like [`filter`], keeping each match's position in `snapshot` so a search
/// view can pass a valid index hint to deletion.
pub fn filter_indexed<'a>(snapshot: &'a [Document], query: &str) -> Vec<(usize, &'a Document)> {
    snapshot
        .iter()
        .enumerate()
        .filter(|(_, doc)| matches(doc, query))
        .collect()
}
