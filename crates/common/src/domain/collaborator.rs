//! Document-to-user bindings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::roles::{CollaboratorPermission, CollaboratorRole};

/// Soft-delete lifecycle of a binding. Removed records are kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CollaboratorState {
    Active,
    Removed {
        at: DateTime<Utc>,
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub role: CollaboratorRole,
    pub permission: CollaboratorPermission,
    pub state: CollaboratorState,
    /// `None` when synthesized by the legacy migration
    pub added_by: Option<Uuid>,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collaborator {
    pub fn new(
        document_id: Uuid,
        user_id: Uuid,
        role: CollaboratorRole,
        permission: CollaboratorPermission,
        added_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            user_id,
            role,
            permission,
            state: CollaboratorState::Active,
            added_by,
            added_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, CollaboratorState::Active)
    }

    pub fn deactivate(&mut self, reason: Option<String>, now: DateTime<Utc>) {
        self.state = CollaboratorState::Removed { at: now, reason };
        self.updated_at = now;
    }

    /// Brings a removed binding back, overwriting its role and permission.
    /// `added_at` is kept so the original join date survives.
    pub fn reactivate(
        &mut self,
        role: CollaboratorRole,
        permission: CollaboratorPermission,
        added_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) {
        self.role = role;
        self.permission = permission;
        self.added_by = added_by;
        self.state = CollaboratorState::Active;
        self.updated_at = now;
    }
}
