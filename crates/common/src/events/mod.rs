//! Notification facts emitted by the registry and the lifecycle
//!
//! The core only publishes; delivery (email, websocket) belongs to whoever
//! subscribes to the channel.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{CollaboratorPermission, CollaboratorRole, DocumentStatus, RoleFamily};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollaborationEvent {
    StatusChanged {
        document_id: Uuid,
        actor_id: Uuid,
        old_status: DocumentStatus,
        new_status: DocumentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        recipients: Vec<Uuid>,
    },
    CollaboratorAdded {
        document_id: Uuid,
        actor_id: Uuid,
        collaborator_id: Uuid,
        user_id: Uuid,
        role: CollaboratorRole,
        permission: CollaboratorPermission,
        reactivated: bool,
    },
    CollaboratorRemoved {
        document_id: Uuid,
        actor_id: Uuid,
        collaborator_id: Uuid,
        user_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    CollaboratorRoleChanged {
        document_id: Uuid,
        actor_id: Uuid,
        collaborator_id: Uuid,
        user_id: Uuid,
        old_role: CollaboratorRole,
        new_role: CollaboratorRole,
    },
    CollaboratorPermissionChanged {
        document_id: Uuid,
        actor_id: Uuid,
        collaborator_id: Uuid,
        user_id: Uuid,
        old_permission: CollaboratorPermission,
        new_permission: CollaboratorPermission,
    },
    PrimaryChanged {
        document_id: Uuid,
        actor_id: Uuid,
        family: RoleFamily,
        new_primary_user_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_primary_user_id: Option<Uuid>,
    },
}

impl CollaborationEvent {
    pub fn document_id(&self) -> Uuid {
        match self {
            CollaborationEvent::StatusChanged { document_id, .. }
            | CollaborationEvent::CollaboratorAdded { document_id, .. }
            | CollaborationEvent::CollaboratorRemoved { document_id, .. }
            | CollaborationEvent::CollaboratorRoleChanged { document_id, .. }
            | CollaborationEvent::CollaboratorPermissionChanged { document_id, .. }
            | CollaborationEvent::PrimaryChanged { document_id, .. } => *document_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CollaborationEvent::StatusChanged { .. } => "status_changed",
            CollaborationEvent::CollaboratorAdded { .. } => "collaborator_added",
            CollaborationEvent::CollaboratorRemoved { .. } => "collaborator_removed",
            CollaborationEvent::CollaboratorRoleChanged { .. } => "collaborator_role_changed",
            CollaborationEvent::CollaboratorPermissionChanged { .. } => {
                "collaborator_permission_changed"
            }
            CollaborationEvent::PrimaryChanged { .. } => "primary_changed",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: CollaborationEvent);
}

/// Fan-out over a tokio broadcast channel
#[derive(Clone)]
pub struct BroadcastEvents {
    tx: broadcast::Sender<CollaborationEvent>,
}

impl BroadcastEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollaborationEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEvents {
    fn publish(&self, event: CollaborationEvent) {
        let kind = event.kind();
        let document_id = event.document_id();
        if self.tx.send(event).is_err() {
            tracing::debug!(kind, %document_id, "No subscribers for collaboration event");
        }
    }
}
