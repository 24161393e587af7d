//! Document and snapshot routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use storysync_engine::{Document, SaveRequest, SaveResponse, SnapshotInfo, Version, VersionSnapshot};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{create_document, record_snapshot, save_document};
use crate::AppState;

/// Create document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/documents", post(create_handler))
        .route(
            "/documents/{id}",
            get(get_handler).put(save_handler).delete(delete_handler),
        )
        .route(
            "/documents/{id}/snapshots",
            get(list_snapshots_handler).post(record_snapshot_handler),
        )
        .route("/documents/{id}/snapshots/{version}", get(get_snapshot_handler))
}

/// POST /documents - Create a document at version 1.
async fn create_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(document): Json<Document>,
) -> Result<(StatusCode, Json<Document>)> {
    let created = create_document(&state.repository, document).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /documents/{id} - Current document.
async fn get_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Document>> {
    Ok(Json(state.repository.get(&id).await?))
}

/// PUT /documents/{id} - Conditional save.
///
/// 200 with the new mark, or 409 with the current remote document.
async fn save_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<SaveRequest>,
) -> Result<Response> {
    let response = match save_document(&state.repository, &auth, &id, request).await? {
        SaveResponse::Accepted(accepted) => (StatusCode::OK, Json(accepted)).into_response(),
        SaveResponse::Conflict(report) => (StatusCode::CONFLICT, Json(report)).into_response(),
    };
    Ok(response)
}

/// DELETE /documents/{id} - Remove a document and its history.
async fn delete_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.repository.delete(&id).await?;
    tracing::info!(%id, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /documents/{id}/snapshots - Snapshot the current version.
async fn record_snapshot_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SnapshotInfo>> {
    Ok(Json(record_snapshot(&state.repository, &id).await?))
}

/// GET /documents/{id}/snapshots - Retained versions, newest first.
async fn list_snapshots_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<SnapshotInfo>>> {
    Ok(Json(state.repository.list_snapshots(&id).await?))
}

/// GET /documents/{id}/snapshots/{version} - One retained version.
async fn get_snapshot_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((id, version)): Path<(String, Version)>,
) -> Result<Json<VersionSnapshot>> {
    Ok(Json(state.repository.get_snapshot(&id, version).await?))
}
