//! Document handlers - creation and conditional saves.

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::repository::Repository;
use chrono::Utc;
use storysync_engine::{Document, SaveRequest, SaveResponse};

/// Create a document. An empty id is replaced with a fresh one.
///
/// Ids must fit in one URL path segment: no `/`, `?`, `#` or whitespace.
pub async fn create_document(repository: &Repository, mut document: Document) -> Result<Document> {
    if document.id.trim().is_empty() {
        document.id = uuid::Uuid::new_v4().to_string();
    } else if let Some(c) = document.id.chars().find(|&c| is_reserved(c)) {
        return Err(AppError::BadRequest(format!(
            "document id {:?} contains reserved character {c:?}",
            document.id
        )));
    }
    let created = repository.create(document, Utc::now()).await?;
    tracing::info!(id = %created.id, "Document created");
    Ok(created)
}

fn is_reserved(c: char) -> bool {
    matches!(c, '/' | '?' | '#') || c.is_whitespace()
}

/// Apply a save request to the document at `id`.
///
/// The request's writer defaults to the authenticated subject.
pub async fn save_document(
    repository: &Repository,
    auth: &AuthUser,
    id: &str,
    mut request: SaveRequest,
) -> Result<SaveResponse> {
    if request.document.id != id {
        return Err(AppError::BadRequest(format!(
            "document id {} does not match path {}",
            request.document.id, id
        )));
    }
    if request.writer.is_none() {
        request.writer = Some(auth.subject.clone());
    }

    let base_version = request.base_version;
    let forced = request.force_overwrite;
    let writer = request.writer.clone().unwrap_or_default();
    let response = repository.save(request, Utc::now()).await?;

    match &response {
        SaveResponse::Accepted(accepted) => {
            tracing::info!(
                id,
                %writer,
                base_version,
                version = accepted.version,
                forced,
                "Save accepted"
            );
        }
        SaveResponse::Conflict(report) => {
            tracing::warn!(
                id,
                %writer,
                base_version,
                current_version = report.remote_document.version,
                "Save rejected: stale base version"
            );
        }
    }
    Ok(response)
}
