//! Document lifecycle
//!
//! The status machine is a fixed table of `(from, to)` pairs, each with one
//! guard. [`plan_transition`] applies a pair to a copy of the document without
//! touching storage; [`LifecycleService`] wraps it with loading, auditing,
//! persistence and notification, and also owns document creation and deletion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::authz::{self, Action, Authorizer};
use crate::db::DocumentStore;
use crate::domain::{
    Collaborator, CollaboratorPermission, CollaboratorRole, Document, DocumentStatus, User,
    UserRole,
};
use crate::errors::{AppError, Result};
use crate::events::{CollaborationEvent, EventSink};
use crate::metrics;

use DocumentStatus::*;

/// Who may take a given transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Submit,
    /// Approver sending the document back; needs a reason
    RequestRevision,
    Approve,
    EditOrManage,
    AdminOnly,
}

impl Guard {
    fn action(self) -> Action {
        match self {
            Guard::Submit => Action::SubmitDocument,
            Guard::RequestRevision | Guard::Approve => Action::ApproveDocument,
            Guard::EditOrManage => Action::ChangeStatus,
            Guard::AdminOnly => Action::Administer,
        }
    }

    pub fn permits(self, user: &User, document: &Document) -> bool {
        authz::is_allowed(user, document, self.action())
    }
}

/// The transition table. `None` means the pair is not a transition.
pub fn guard_for(from: DocumentStatus, to: DocumentStatus) -> Option<Guard> {
    match (from, to) {
        (Draft | Revision, Submitted) => Some(Guard::Submit),
        (Submitted, Revision) => Some(Guard::RequestRevision),
        (Submitted | Revision, Approved) => Some(Guard::Approve),
        (Approved, Finalized) => Some(Guard::EditOrManage),
        (Submitted | Revision | Approved, Draft) => Some(Guard::EditOrManage),
        (Finalized, Draft) => Some(Guard::AdminOnly),
        _ => None,
    }
}

/// Users told about a move into `status`, never including the actor
pub fn status_recipients(document: &Document, status: DocumentStatus, actor: Uuid) -> Vec<Uuid> {
    match status {
        Submitted => document.recipients(actor, |role| role.is_advisor()),
        Revision | Approved => document.recipients(actor, |role| role.is_student()),
        Draft | Finalized => document.recipients(actor, |_| true),
    }
}

/// Applies a transition that has already passed its guard
pub fn apply_transition(
    document: &mut Document,
    to: DocumentStatus,
    reason: Option<String>,
    now: DateTime<Utc>,
) {
    match to {
        Submitted => {
            document.submitted_at = Some(now);
            document.clear_rejection();
        }
        Revision => {
            document.rejected_at = Some(now);
            document.rejection_reason = reason;
        }
        Approved => {
            document.approved_at = Some(now);
            document.clear_rejection();
        }
        Finalized => {}
        Draft => {
            document.submitted_at = None;
            document.approved_at = None;
            document.clear_rejection();
        }
    }
    document.status = to;
    document.updated_at = now;
}

/// Looks the move up in the table. The guard is evaluated by the caller.
pub fn validate_transition(from: DocumentStatus, to: DocumentStatus) -> Result<Guard> {
    guard_for(from, to).ok_or_else(|| AppError::InvalidTransition {
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    })
}

/// Resolves a requested target by name; unknown names are not transitions
pub fn parse_target(from: DocumentStatus, target: &str) -> Result<DocumentStatus> {
    target.parse().map_err(|_| AppError::InvalidTransition {
        from: from.as_str().to_string(),
        to: target.to_string(),
    })
}

fn require_reason(reason: Option<String>) -> Result<String> {
    match reason {
        Some(r) if !r.trim().is_empty() => Ok(r.trim().to_string()),
        _ => Err(AppError::business_rule(
            "a reason is required when requesting a revision",
        )),
    }
}

/// Pure planner: validates the move for `user` and returns the updated copy
pub fn plan_transition(
    user: &User,
    document: &Document,
    to: DocumentStatus,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<Document> {
    let guard = validate_transition(document.status, to)?;
    if !guard.permits(user, document) {
        return Err(AppError::PermissionDenied {
            action: guard.action().as_str().to_string(),
            resource_id: document.id.to_string(),
        });
    }
    let reason = match guard {
        Guard::RequestRevision => Some(require_reason(reason)?),
        _ => None,
    };

    let mut next = document.clone();
    apply_transition(&mut next, to, reason, now);
    Ok(next)
}

/// Targets `user` could move the document to right now
pub fn allowed_transitions(user: &User, document: &Document) -> Vec<DocumentStatus> {
    DocumentStatus::ALL
        .into_iter()
        .filter(|&to| {
            guard_for(document.status, to)
                .map(|guard| guard.permits(user, document))
                .unwrap_or(false)
        })
        .collect()
}

/// Input for [`LifecycleService::create_document`]
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub student_email: Option<String>,
    pub advisor_email: Option<String>,
}

#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn DocumentStore>,
    authz: Authorizer,
    events: Arc<dyn EventSink>,
}

impl LifecycleService {
    pub fn new(store: Arc<dyn DocumentStore>, authz: Authorizer, events: Arc<dyn EventSink>) -> Self {
        Self { store, authz, events }
    }

    async fn load(&self, document_id: Uuid) -> Result<Document> {
        self.store
            .load_document(document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })
    }

    async fn user_with_role(&self, email: &str, role: UserRole) -> Result<User> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::UserNotFound {
                id: email.to_string(),
            })?;
        if !user.has_role(role) {
            return Err(AppError::business_rule(format!(
                "{} does not hold the {} account role",
                email,
                role.as_str()
            )));
        }
        Ok(user)
    }

    /// Creates a draft with its primary student and optional primary advisor
    pub async fn create_document(&self, actor: &User, input: NewDocument) -> Result<Document> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation {
                message: "title must not be blank".to_string(),
                field: Some("title".to_string()),
            });
        }

        let student = if actor.is_admin() {
            let email = input.student_email.as_deref().ok_or_else(|| AppError::Validation {
                message: "administrators must name the primary student".to_string(),
                field: Some("student_email".to_string()),
            })?;
            self.user_with_role(email, UserRole::Student).await?
        } else if actor.has_role(UserRole::Student) {
            match input.student_email.as_deref() {
                Some(email) if !email.eq_ignore_ascii_case(&actor.email) => {
                    return Err(AppError::business_rule(
                        "students can only create documents for themselves",
                    ))
                }
                _ => actor.clone(),
            }
        } else {
            return Err(AppError::PermissionDenied {
                action: "create_document".to_string(),
                resource_id: "documents".to_string(),
            });
        };

        let advisor = match input.advisor_email.as_deref() {
            Some(email) => Some(self.user_with_role(email, UserRole::Advisor).await?),
            None => None,
        };
        if advisor.as_ref().is_some_and(|a| a.id == student.id) {
            return Err(AppError::business_rule(
                "the primary student and primary advisor must be different users",
            ));
        }

        let now = Utc::now();
        let mut document = Document::new(title, now);
        document.collaborators.push(Collaborator::new(
            document.id,
            student.id,
            CollaboratorRole::PrimaryStudent,
            CollaboratorPermission::FullAccess,
            Some(actor.id),
            now,
        ));
        if let Some(advisor) = &advisor {
            document.collaborators.push(Collaborator::new(
                document.id,
                advisor.id,
                CollaboratorRole::PrimaryAdvisor,
                CollaboratorPermission::FullAccess,
                Some(actor.id),
                now,
            ));
        }

        self.store.insert_document(&document).await?;

        info!(
            document_id = %document.id,
            student_id = %student.id,
            advisor_id = ?advisor.as_ref().map(|a| a.id),
            "Document created"
        );
        Ok(document)
    }

    pub async fn get_document(&self, actor: &User, document_id: Uuid) -> Result<Document> {
        let document = self.load(document_id).await?;
        self.authz.require(actor, &document, Action::ViewDocument)?;
        Ok(document)
    }

    pub async fn delete_document(&self, actor: &User, document_id: Uuid) -> Result<()> {
        let document = self.load(document_id).await?;
        self.authz
            .require(actor, &document, Action::DeleteDocument)?;
        if !document.status.is_draft() && !actor.is_admin() {
            return Err(AppError::business_rule(format!(
                "only drafts can be deleted; document is {}",
                document.status
            )));
        }

        if !self.store.delete_document(document_id).await? {
            return Err(AppError::DocumentNotFound {
                id: document_id.to_string(),
            });
        }
        info!(document_id = %document_id, actor_id = %actor.id, "Document deleted");
        Ok(())
    }

    pub async fn transition(
        &self,
        actor: &User,
        document_id: Uuid,
        to: DocumentStatus,
        reason: Option<String>,
    ) -> Result<Document> {
        let document = self.load(document_id).await?;
        let from = document.status;

        let guard = validate_transition(from, to)?;
        match guard {
            Guard::AdminOnly => self
                .authz
                .require_admin(actor, &document.id.to_string())?,
            _ => self.authz.require(actor, &document, guard.action())?,
        }

        let next = plan_transition(actor, &document, to, reason, Utc::now())?;
        self.store.save_document(&next).await?;

        info!(
            document_id = %document_id,
            actor_id = %actor.id,
            from = from.as_str(),
            to = to.as_str(),
            "Document status changed"
        );
        metrics::record_transition(from.as_str(), to.as_str());
        self.events.publish(CollaborationEvent::StatusChanged {
            document_id,
            actor_id: actor.id,
            old_status: from,
            new_status: to,
            reason: next.rejection_reason.clone().filter(|_| to == Revision),
            recipients: status_recipients(&next, to, actor.id),
        });

        Ok(next)
    }

    /// [`Self::transition`] for a target given by name, as clients send it
    pub async fn transition_named(
        &self,
        actor: &User,
        document_id: Uuid,
        target: &str,
        reason: Option<String>,
    ) -> Result<Document> {
        let to = match target.parse() {
            Ok(to) => to,
            Err(_) => {
                // Callers without access learn nothing about the document
                let document = self.get_document(actor, document_id).await?;
                parse_target(document.status, target)?
            }
        };
        self.transition(actor, document_id, to, reason).await
    }

    pub async fn allowed_transitions(
        &self,
        actor: &User,
        document_id: Uuid,
    ) -> Result<Vec<DocumentStatus>> {
        let document = self.get_document(actor, document_id).await?;
        Ok(allowed_transitions(actor, &document))
    }
}
