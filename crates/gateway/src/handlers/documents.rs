//! Document handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::extract::{ApiJson, CurrentUser};
use crate::handlers::validate;
use crate::AppState;
use thesisforge_common::{
    authz::Capabilities,
    domain::{Document, DocumentStatus, User},
    errors::Result,
    lifecycle::{self, NewDocument},
};

/// Request to create a new thesis document
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDocumentRequest {
    #[validate(length(min = 1, max = 500))]
    pub title: String,

    /// Required when an administrator creates on behalf of a student
    #[validate(email)]
    pub student_email: Option<String>,

    #[validate(email)]
    pub advisor_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusChangeRequest {
    /// Target status name; unknown names are rejected as invalid transitions
    #[validate(length(min = 1, max = 64))]
    pub status: String,

    #[validate(length(max = 4000))]
    pub reason: Option<String>,
}

/// A document as seen by one caller
#[derive(Serialize)]
pub struct DocumentResponse {
    #[serde(flatten)]
    pub document: Document,
    pub capabilities: Capabilities,
    pub allowed_transitions: Vec<DocumentStatus>,
}

impl DocumentResponse {
    fn for_user(document: Document, user: &User) -> Self {
        Self {
            capabilities: Capabilities::resolve(user, &document),
            allowed_transitions: lifecycle::allowed_transitions(user, &document),
            document,
        }
    }
}

pub async fn create_document(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    validate(&request)?;

    let document = state
        .documents
        .create_document(
            &user,
            NewDocument {
                title: request.title,
                student_email: request.student_email,
                advisor_email: request.advisor_email,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse::for_user(document, &user)),
    ))
}

pub async fn get_document(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentResponse>> {
    let document = state.documents.get_document(&user, document_id).await?;
    Ok(Json(DocumentResponse::for_user(document, &user)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.documents.delete_document(&user, document_id).await?;
    state.presence.forget_document(document_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<Uuid>,
    ApiJson(request): ApiJson<StatusChangeRequest>,
) -> Result<Json<DocumentResponse>> {
    validate(&request)?;

    let document = state
        .documents
        .transition_named(&user, document_id, &request.status, request.reason)
        .await?;

    Ok(Json(DocumentResponse::for_user(document, &user)))
}
