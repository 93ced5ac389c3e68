//! Presence handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::extract::CurrentUser;
use crate::AppState;
use thesisforge_common::{errors::Result, presence::PresenceEntry};

#[derive(Serialize)]
pub struct PresenceResponse {
    pub document_id: Uuid,
    pub users: Vec<PresenceEntry>,
}

/// Heartbeat: marks the caller as present and returns who else is there
pub async fn heartbeat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<Uuid>,
) -> Result<Json<PresenceResponse>> {
    // Only collaborators may announce themselves
    state.documents.get_document(&user, document_id).await?;

    let now = Utc::now();
    if state.presence.touch(document_id, user.id, now) {
        tracing::debug!(document_id = %document_id, user_id = %user.id, "User joined document");
    }

    Ok(Json(PresenceResponse {
        document_id,
        users: state.presence.active_users(document_id, now),
    }))
}

pub async fn list_present(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<Uuid>,
) -> Result<Json<PresenceResponse>> {
    state.documents.get_document(&user, document_id).await?;

    Ok(Json(PresenceResponse {
        document_id,
        users: state.presence.active_users(document_id, Utc::now()),
    }))
}

/// Explicit departure, so others stop seeing the caller before the idle timeout
pub async fn leave(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.documents.get_document(&user, document_id).await?;

    if state.presence.leave(document_id, user.id) {
        tracing::debug!(document_id = %document_id, user_id = %user.id, "User left document");
    }
    Ok(StatusCode::NO_CONTENT)
}
