//! Postgres-backed document store
//!
//! Every mutating call runs inside its own transaction so the unique
//! partial indexes on `document_collaborators` are the final arbiter of
//! concurrent adds and promotions.

use crate::db::models::*;
use crate::db::{DbPool, DocumentStore};
use crate::domain::{Collaborator, Document, User};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    fn collaborator_upsert() -> OnConflict {
        OnConflict::column(CollaboratorColumn::Id)
            .update_columns([
                CollaboratorColumn::Role,
                CollaboratorColumn::Permission,
                CollaboratorColumn::Active,
                CollaboratorColumn::RemovedAt,
                CollaboratorColumn::RemovalReason,
                CollaboratorColumn::AddedBy,
                CollaboratorColumn::AddedAt,
                CollaboratorColumn::UpdatedAt,
            ])
            .to_owned()
    }
}

#[async_trait]
impl DocumentStore for Repository {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.read_conn())
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.read_conn())
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        UserEntity::insert(UserActiveModel::from(user))
            .on_conflict(
                OnConflict::column(UserColumn::Id)
                    .update_columns([
                        UserColumn::Email,
                        UserColumn::DisplayName,
                        UserColumn::Roles,
                        UserColumn::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    async fn load_document(&self, id: Uuid) -> Result<Option<Document>> {
        // Always the primary: authorization decisions must see the latest bindings
        let conn = self.write_conn();
        let Some(row) = DocumentEntity::find_by_id(id).one(conn).await? else {
            return Ok(None);
        };

        let collaborators = CollaboratorEntity::find()
            .filter(CollaboratorColumn::DocumentId.eq(id))
            .order_by_asc(CollaboratorColumn::AddedAt)
            .all(conn)
            .await?;

        document_from_rows(row, collaborators).map(Some)
    }

    async fn insert_document(&self, document: &Document) -> Result<()> {
        let txn = self.write_conn().begin().await?;

        DocumentEntity::insert(DocumentActiveModel::from(document))
            .exec(&txn)
            .await?;

        for collaborator in &document.collaborators {
            CollaboratorEntity::insert(CollaboratorActiveModel::from(collaborator))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        debug!(document_id = %document.id, "Inserted document");
        Ok(())
    }

    async fn save_document(&self, document: &Document) -> Result<()> {
        match DocumentEntity::update(DocumentActiveModel::from(document))
            .exec(self.write_conn())
            .await
        {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(AppError::DocumentNotFound {
                id: document.id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        // Collaborator rows go with the document (ON DELETE CASCADE)
        let result = DocumentEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn save_collaborators(&self, collaborators: &[Collaborator]) -> Result<()> {
        if collaborators.is_empty() {
            return Ok(());
        }

        let txn = self.write_conn().begin().await?;

        // Order matters: the partial unique indexes are checked per statement
        for collaborator in collaborators {
            CollaboratorEntity::insert(CollaboratorActiveModel::from(collaborator))
                .on_conflict(Self::collaborator_upsert())
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn list_legacy_documents(&self) -> Result<Vec<Document>> {
        let conn = self.write_conn();
        let rows = DocumentEntity::find()
            .filter(
                DocumentColumn::LegacyStudentId
                    .is_not_null()
                    .or(DocumentColumn::LegacyAdvisorId.is_not_null()),
            )
            .order_by_asc(DocumentColumn::CreatedAt)
            .all(conn)
            .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut by_document: HashMap<Uuid, Vec<CollaboratorRow>> = HashMap::new();
        for row in CollaboratorEntity::find()
            .filter(CollaboratorColumn::DocumentId.is_in(ids))
            .order_by_asc(CollaboratorColumn::AddedAt)
            .all(conn)
            .await?
        {
            by_document.entry(row.document_id).or_default().push(row);
        }

        rows.into_iter()
            .map(|row| {
                let collaborators = by_document.remove(&row.id).unwrap_or_default();
                document_from_rows(row, collaborators)
            })
            .collect()
    }
}
