//! In-process document store
//!
//! Used when `database.backend = "memory"` and by the test suites. It holds
//! the same uniqueness rules the Postgres partial indexes enforce, checked
//! after every write, and discards a whole batch when one record violates
//! them.

use crate::db::DocumentStore;
use crate::domain::{Collaborator, Document, User};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    documents: HashMap<Uuid, Document>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_unique(document: &Document) -> Result<()> {
    let mut seen = Vec::new();
    for c in document.active_collaborators() {
        if seen.contains(&c.user_id) {
            return Err(AppError::Conflict {
                message: format!(
                    "user {} already has an active binding on document {}",
                    c.user_id, document.id
                ),
            });
        }
        seen.push(c.user_id);
    }

    if !document.primaries_consistent() {
        return Err(AppError::Conflict {
            message: format!("document {} would have two active primaries", document.id),
        });
    }

    Ok(())
}

fn upsert_into(document: &mut Document, collaborator: &Collaborator) {
    match document.collaborator_mut(collaborator.id) {
        Some(existing) => *existing = collaborator.clone(),
        None => document.collaborators.push(collaborator.clone()),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.email == user.email && u.id != user.id)
        {
            return Err(AppError::Conflict {
                message: format!("email {} is already registered", user.email),
            });
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn load_document(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.tables.read().await.documents.get(&id).cloned())
    }

    async fn insert_document(&self, document: &Document) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.documents.contains_key(&document.id) {
            return Err(AppError::Conflict {
                message: format!("document {} already exists", document.id),
            });
        }
        check_unique(document)?;
        tables.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn save_document(&self, document: &Document) -> Result<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .documents
            .get_mut(&document.id)
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document.id.to_string(),
            })?;

        // Collaborators are written through save_collaborators only
        let collaborators = std::mem::take(&mut stored.collaborators);
        *stored = Document {
            collaborators,
            ..document.clone()
        };
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        Ok(self.tables.write().await.documents.remove(&id).is_some())
    }

    async fn save_collaborators(&self, collaborators: &[Collaborator]) -> Result<()> {
        let mut tables = self.tables.write().await;

        // Stage on copies so a failure leaves the tables untouched
        let mut staged: HashMap<Uuid, Document> = HashMap::new();
        for collaborator in collaborators {
            if !staged.contains_key(&collaborator.document_id) {
                let current = tables
                    .documents
                    .get(&collaborator.document_id)
                    .cloned()
                    .ok_or_else(|| AppError::DocumentNotFound {
                        id: collaborator.document_id.to_string(),
                    })?;
                staged.insert(collaborator.document_id, current);
            }
            if let Some(document) = staged.get_mut(&collaborator.document_id) {
                upsert_into(document, collaborator);
                check_unique(document)?;
            }
        }

        tables.documents.extend(staged);
        Ok(())
    }

    async fn list_legacy_documents(&self) -> Result<Vec<Document>> {
        let tables = self.tables.read().await;
        let mut documents: Vec<Document> = tables
            .documents
            .values()
            .filter(|d| d.legacy_student_id.is_some() || d.legacy_advisor_id.is_some())
            .cloned()
            .collect();
        documents.sort_by_key(|d| d.created_at);
        Ok(documents)
    }
}
