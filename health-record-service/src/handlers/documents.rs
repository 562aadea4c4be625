use crate::dtos::{
    DeleteParams, DeleteResponse, DocumentListParams, DocumentListResponse, DocumentResponse,
    DownloadResponse, PreviewStatusResponse,
};
use crate::error::DocumentError;
use crate::middleware::CurrentUser;
use crate::models::{Document, OwnerId};
use crate::services::DocumentLibrary;
use crate::startup::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

/// Find `name` in the owner's snapshot, loading the snapshot first if needed.
async fn lookup(
    library: &DocumentLibrary,
    owner: Option<&str>,
    name: &str,
) -> Result<(usize, Document), AppError> {
    let owner_id = OwnerId::require(owner)?;
    let id = Document::document_id(&owner_id, name);
    if let Some(found) = library.registry.find(&id) {
        return Ok(found);
    }
    library.registry.refresh(owner).await?;
    library
        .registry
        .find(&id)
        .ok_or_else(|| DocumentError::NotFound(id).into())
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<DocumentListParams>,
) -> Result<impl IntoResponse, AppError> {
    let owner = user.owner_id();
    let library = state.library(owner)?;
    let query = params.q.unwrap_or_default();

    let matches = library.search(owner, &query, params.refresh).await?;
    let total = library.registry.len();

    Ok(Json(DocumentListResponse {
        documents: matches
            .into_iter()
            .map(|(index, doc)| DocumentResponse::with_index(doc, index))
            .collect(),
        total,
    }))
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let owner = user.owner_id();
    let library = state.library(owner)?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
        })?
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No file uploaded")))?;

    let file_name = field.file_name().unwrap_or_default().to_string();
    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e)))?;

    let (mut progress, completion) = library.uploads.start(owner, data, &file_name);
    let log_progress = async {
        while let Some(fraction) = progress.changed().await {
            tracing::debug!(file_name = %file_name, progress = fraction, "Upload progress");
        }
    };
    // The progress loop ends when the upload drops its reporter.
    let (document, ()) = tokio::join!(completion, log_progress);
    let document = document?;

    Ok((StatusCode::CREATED, Json(DocumentResponse::from(document))))
}

pub async fn preview_document(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let owner = user.owner_id();
    let library = state.library(owner)?;
    let (_, document) = lookup(&library, owner, &name).await?;

    let artifact = library.retrieval.preview(owner, &document).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", artifact.name.replace('"', "")),
            ),
        ],
        artifact.bytes,
    ))
}

pub async fn preview_status(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let library = state.library(user.owner_id())?;
    Ok(Json(PreviewStatusResponse {
        busy: library.retrieval.is_busy(),
    }))
}

pub async fn download_document(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let owner = user.owner_id();
    let library = state.library(owner)?;
    let (_, document) = lookup(&library, owner, &name).await?;

    let path = library.retrieval.download(owner, &document).await?;

    Ok(Json(DownloadResponse {
        id: document.id,
        path: path.display().to_string(),
    }))
}

pub async fn delete_document(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(name): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<impl IntoResponse, AppError> {
    let owner = user.owner_id();
    let library = state.library(owner)?;
    // Loads the snapshot when this owner has not been listed yet.
    let (_, document) = lookup(&library, owner, &name).await?;

    match params.index {
        // Stale or foreign hints are the deletion manager's call.
        Some(index) => library.deletion.delete(owner, &document, index).await?,
        None => {
            library.deletion.delete_by_id(owner, &document.id).await?;
        }
    }

    Ok(Json(DeleteResponse {
        id: document.id,
        remaining: library.registry.len(),
    }))
}
