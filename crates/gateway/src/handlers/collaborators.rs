//! Collaborator registry handlers

use axum::{
    extract::{Path, Query, State},
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
    domain::{Collaborator, CollaboratorPermission, CollaboratorRole},
    errors::Result,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_removed: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RemoveQuery {
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddCollaboratorRequest {
    #[validate(email)]
    pub email: String,
    pub role: CollaboratorRole,
    pub permission: CollaboratorPermission,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePermissionRequest {
    pub permission: CollaboratorPermission,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: CollaboratorRole,
}

#[derive(Serialize)]
pub struct CollaboratorList {
    pub document_id: Uuid,
    pub collaborators: Vec<Collaborator>,
}

pub async fn list_collaborators(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<CollaboratorList>> {
    let collaborators = state
        .collaborators
        .list_collaborators(document_id, &user, query.include_removed)
        .await?;

    Ok(Json(CollaboratorList {
        document_id,
        collaborators,
    }))
}

pub async fn add_collaborator(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<Uuid>,
    ApiJson(request): ApiJson<AddCollaboratorRequest>,
) -> Result<(StatusCode, Json<Collaborator>)> {
    validate(&request)?;

    let collaborator = state
        .collaborators
        .add_collaborator(
            document_id,
            &user,
            &request.email,
            request.role,
            request.permission,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(collaborator)))
}

pub async fn remove_collaborator(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((document_id, collaborator_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<RemoveQuery>,
) -> Result<Json<Collaborator>> {
    validate(&query)?;

    let collaborator = state
        .collaborators
        .remove_collaborator(document_id, &user, collaborator_id, query.reason)
        .await?;

    Ok(Json(collaborator))
}

pub async fn update_permission(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((document_id, collaborator_id)): Path<(Uuid, Uuid)>,
    ApiJson(request): ApiJson<UpdatePermissionRequest>,
) -> Result<Json<Collaborator>> {
    let collaborator = state
        .collaborators
        .update_permission(document_id, &user, collaborator_id, request.permission)
        .await?;

    Ok(Json(collaborator))
}

pub async fn update_role(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((document_id, collaborator_id)): Path<(Uuid, Uuid)>,
    ApiJson(request): ApiJson<UpdateRoleRequest>,
) -> Result<Json<Collaborator>> {
    let collaborator = state
        .collaborators
        .update_role(document_id, &user, collaborator_id, request.role)
        .await?;

    Ok(Json(collaborator))
}

pub async fn promote(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((document_id, collaborator_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Collaborator>> {
    let collaborator = state
        .collaborators
        .promote_to_primary(document_id, &user, collaborator_id)
        .await?;

    Ok(Json(collaborator))
}
