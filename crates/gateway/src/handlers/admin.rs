//! Operator endpoints

use axum::{extract::State, Json};

use crate::extract::CurrentUser;
use crate::AppState;
use thesisforge_common::{errors::Result, migration::MigrationReport};

/// Backfills primary collaborators for documents still on the legacy fields
pub async fn migrate_collaborators(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MigrationReport>> {
    state.authz.require_admin(&user, "migrations/collaborators")?;

    tracing::info!(actor_id = %user.id, "Collaborator backfill requested");
    let report = state.migrations.migrate_existing_documents().await?;

    Ok(Json(report))
}
