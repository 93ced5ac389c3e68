//! Document aggregate: workflow fields plus the full collaborator history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::collaborator::Collaborator;
use super::roles::{CollaboratorRole, RoleFamily};
use super::status::DocumentStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub status: DocumentStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    /// Pre-registry single student field; only read by the migration
    pub legacy_student_id: Option<Uuid>,
    /// Pre-registry single advisor field; only read by the migration
    pub legacy_advisor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Active and removed bindings
    pub collaborators: Vec<Collaborator>,
}

impl Document {
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            status: DocumentStatus::Draft,
            submitted_at: None,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            legacy_student_id: None,
            legacy_advisor_id: None,
            created_at: now,
            updated_at: now,
            collaborators: Vec::new(),
        }
    }

    pub fn active_collaborators(&self) -> impl Iterator<Item = &Collaborator> {
        self.collaborators.iter().filter(|c| c.is_active())
    }

    /// The single active binding for a user, if any
    pub fn active_binding(&self, user_id: Uuid) -> Option<&Collaborator> {
        self.active_collaborators().find(|c| c.user_id == user_id)
    }

    /// Any binding for a user, active bindings preferred over removed ones
    pub fn binding_for_user(&self, user_id: Uuid) -> Option<&Collaborator> {
        self.active_binding(user_id)
            .or_else(|| self.collaborators.iter().find(|c| c.user_id == user_id))
    }

    pub fn collaborator(&self, collaborator_id: Uuid) -> Option<&Collaborator> {
        self.collaborators.iter().find(|c| c.id == collaborator_id)
    }

    pub fn collaborator_mut(&mut self, collaborator_id: Uuid) -> Option<&mut Collaborator> {
        self.collaborators.iter_mut().find(|c| c.id == collaborator_id)
    }

    pub fn primary(&self, family: RoleFamily) -> Option<&Collaborator> {
        let role = family.primary_role();
        self.active_collaborators().find(|c| c.role == role)
    }

    pub fn count_active(&self, role: CollaboratorRole) -> usize {
        self.active_collaborators().filter(|c| c.role == role).count()
    }

    /// Active collaborators other than `exclude` whose role matches `filter`
    pub fn recipients(&self, exclude: Uuid, filter: impl Fn(CollaboratorRole) -> bool) -> Vec<Uuid> {
        self.active_collaborators()
            .filter(|c| c.user_id != exclude && filter(c.role))
            .map(|c| c.user_id)
            .collect()
    }

    /// Checks the one-primary-per-family invariant
    pub fn primaries_consistent(&self) -> bool {
        self.count_active(CollaboratorRole::PrimaryStudent) <= 1
            && self.count_active(CollaboratorRole::PrimaryAdvisor) <= 1
    }

    pub fn clear_rejection(&mut self) {
        self.rejected_at = None;
        self.rejection_reason = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::roles::CollaboratorPermission;

    #[test]
    fn test_binding_lookup_prefers_active() {
        let now = Utc::now();
        let mut doc = Document::new("Thesis", now);
        let user = Uuid::new_v4();

        let mut removed = Collaborator::new(
            doc.id,
            user,
            CollaboratorRole::Reviewer,
            CollaboratorPermission::ReadOnly,
            None,
            now,
        );
        removed.deactivate(None, now);
        doc.collaborators.push(removed.clone());
        assert!(doc.active_binding(user).is_none());
        assert_eq!(doc.binding_for_user(user).map(|c| c.id), Some(removed.id));

        let active = Collaborator::new(
            doc.id,
            user,
            CollaboratorRole::Examiner,
            CollaboratorPermission::ReadComment,
            None,
            now,
        );
        doc.collaborators.push(active.clone());
        assert_eq!(doc.binding_for_user(user).map(|c| c.id), Some(active.id));
    }

    #[test]
    fn test_primary_counting() {
        let now = Utc::now();
        let mut doc = Document::new("Thesis", now);
        for role in [CollaboratorRole::PrimaryStudent, CollaboratorRole::PrimaryStudent] {
            doc.collaborators.push(Collaborator::new(
                doc.id,
                Uuid::new_v4(),
                role,
                CollaboratorPermission::FullAccess,
                None,
                now,
            ));
        }
        assert!(!doc.primaries_consistent());
        doc.collaborators[1].deactivate(None, now);
        assert!(doc.primaries_consistent());
        assert!(doc.primary(RoleFamily::Student).is_some());
        assert!(doc.primary(RoleFamily::Advisor).is_none());
    }
}
