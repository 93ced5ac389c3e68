//! Authorization engine
//!
//! Pure yes/no decisions derived from the caller's active collaborator binding
//! and global roles. [`Authorizer`] adds auditing and metrics on top and turns
//! negative answers into [`AppError::PermissionDenied`].
//!
//! The predicates intentionally differ in how they combine role and
//! permission: editing needs both, managing collaborators needs either.

use serde::Serialize;
use std::sync::Arc;

use crate::audit::{AuditEntry, AuditSink};
use crate::domain::{CollaboratorPermission, CollaboratorRole, Document, User};
use crate::errors::{AppError, Result};
use crate::metrics;

/// Actions guarded by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ViewDocument,
    EditDocument,
    ManageCollaborators,
    SubmitDocument,
    ApproveDocument,
    DeleteDocument,
    /// Finalizing or sending a document back to draft
    ChangeStatus,
    /// Operator-only maintenance such as the legacy backfill
    Administer,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ViewDocument => "view_document",
            Action::EditDocument => "edit_document",
            Action::ManageCollaborators => "manage_collaborators",
            Action::SubmitDocument => "submit_document",
            Action::ApproveDocument => "approve_document",
            Action::DeleteDocument => "delete_document",
            Action::ChangeStatus => "change_status",
            Action::Administer => "administer",
        }
    }
}

fn binding(user: &User, document: &Document) -> Option<(CollaboratorRole, CollaboratorPermission)> {
    document
        .active_binding(user.id)
        .map(|c| (c.role, c.permission))
}

pub fn has_access(user: &User, document: &Document) -> bool {
    user.is_admin() || document.active_binding(user.id).is_some()
}

pub fn can_edit(user: &User, document: &Document) -> bool {
    user.is_admin()
        || binding(user, document)
            .map(|(role, permission)| permission.can_write() && role.can_edit())
            .unwrap_or(false)
}

pub fn can_manage_collaborators(user: &User, document: &Document) -> bool {
    user.is_admin()
        || binding(user, document)
            .map(|(role, permission)| {
                permission.can_manage_collaborators() || role.can_manage_collaborators()
            })
            .unwrap_or(false)
}

pub fn can_submit_document(user: &User, document: &Document) -> bool {
    binding(user, document)
        .map(|(role, permission)| {
            role.can_submit_document()
                && (permission.can_write() || permission == CollaboratorPermission::FullAccess)
        })
        .unwrap_or(false)
}

/// Permission tier plays no part in approval
pub fn can_approve_document(user: &User, document: &Document) -> bool {
    binding(user, document)
        .map(|(role, _)| role.can_approve_document())
        .unwrap_or(false)
}

/// Only the primary student may delete; secondaries with full access may not
pub fn can_delete_document(user: &User, document: &Document) -> bool {
    user.is_admin()
        || binding(user, document)
            .map(|(role, _)| role == CollaboratorRole::PrimaryStudent)
            .unwrap_or(false)
}

pub fn can_change_status(user: &User, document: &Document) -> bool {
    can_edit(user, document) || can_manage_collaborators(user, document)
}

pub fn is_allowed(user: &User, document: &Document, action: Action) -> bool {
    match action {
        Action::ViewDocument => has_access(user, document),
        Action::EditDocument => can_edit(user, document),
        Action::ManageCollaborators => can_manage_collaborators(user, document),
        Action::SubmitDocument => can_submit_document(user, document),
        Action::ApproveDocument => can_approve_document(user, document),
        Action::DeleteDocument => can_delete_document(user, document),
        Action::ChangeStatus => can_change_status(user, document),
        Action::Administer => user.is_admin(),
    }
}

/// Snapshot of every decision for one caller, handy for UIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_manage_collaborators: bool,
    pub can_submit: bool,
    pub can_approve: bool,
    pub can_delete: bool,
}

impl Capabilities {
    pub fn resolve(user: &User, document: &Document) -> Self {
        Self {
            can_view: has_access(user, document),
            can_edit: can_edit(user, document),
            can_manage_collaborators: can_manage_collaborators(user, document),
            can_submit: can_submit_document(user, document),
            can_approve: can_approve_document(user, document),
            can_delete: can_delete_document(user, document),
        }
    }
}

/// Decision point that reports every outcome to the audit consumer
#[derive(Clone)]
pub struct Authorizer {
    audit: Arc<dyn AuditSink>,
}

impl Authorizer {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    pub fn check(&self, user: &User, document: &Document, action: Action) -> bool {
        let allowed = is_allowed(user, document, action);
        self.record(user, action, document.id.to_string(), allowed);
        allowed
    }

    pub fn require(&self, user: &User, document: &Document, action: Action) -> Result<()> {
        if self.check(user, document, action) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied {
                action: action.as_str().to_string(),
                resource_id: document.id.to_string(),
            })
        }
    }

    /// Guard for operations that are not tied to a single document
    pub fn require_admin(&self, user: &User, resource: &str) -> Result<()> {
        let allowed = user.is_admin();
        self.record(user, Action::Administer, resource.to_string(), allowed);
        if allowed {
            Ok(())
        } else {
            Err(AppError::PermissionDenied {
                action: Action::Administer.as_str().to_string(),
                resource_id: resource.to_string(),
            })
        }
    }

    fn record(&self, user: &User, action: Action, resource_id: String, allowed: bool) {
        metrics::record_authz(action.as_str(), allowed);
        self.audit
            .record(&AuditEntry::new(user.id, action, resource_id, allowed));
    }
}
