//! Shared fixtures for the unit tests

use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::audit::{AuditEntry, AuditSink};
use crate::authz::Authorizer;
use crate::db::{DocumentStore, MemoryStore};
use crate::domain::{Collaborator, CollaboratorPermission, CollaboratorRole, Document, User, UserRole};
use crate::events::{CollaborationEvent, EventSink};

#[derive(Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, entry: &AuditEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<CollaborationEvent>>,
}

impl RecordingEvents {
    pub fn events(&self) -> Vec<CollaborationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<CollaborationEvent> {
        self.events.lock().unwrap().last().cloned()
    }
}

impl EventSink for RecordingEvents {
    fn publish(&self, event: CollaborationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub audit: Arc<RecordingAuditSink>,
    pub events: Arc<RecordingEvents>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            audit: Arc::new(RecordingAuditSink::default()),
            events: Arc::new(RecordingEvents::default()),
        }
    }

    pub fn authorizer(&self) -> Authorizer {
        Authorizer::new(self.audit.clone())
    }

    pub async fn user(&self, email: &str, roles: &[UserRole]) -> User {
        let user = User::new(email, email, roles);
        self.store.upsert_user(&user).await.unwrap();
        user
    }

    /// Stores a draft with the given primaries at full access
    pub async fn document(&self, student: &User, advisor: Option<&User>) -> Document {
        let now = Utc::now();
        let mut doc = Document::new("Thesis", now);
        doc.collaborators.push(Collaborator::new(
            doc.id,
            student.id,
            CollaboratorRole::PrimaryStudent,
            CollaboratorPermission::FullAccess,
            None,
            now,
        ));
        if let Some(advisor) = advisor {
            doc.collaborators.push(Collaborator::new(
                doc.id,
                advisor.id,
                CollaboratorRole::PrimaryAdvisor,
                CollaboratorPermission::FullAccess,
                None,
                now,
            ));
        }
        self.store.insert_document(&doc).await.unwrap();
        doc
    }

    pub async fn reload(&self, doc: &Document) -> Document {
        self.store.load_document(doc.id).await.unwrap().unwrap()
    }
}
