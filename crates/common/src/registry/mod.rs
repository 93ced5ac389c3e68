//! Collaborator registry
//!
//! Owns every change to a document's collaborator set. Each operation loads
//! the aggregate, checks the caller through the [`Authorizer`], plans the
//! change against the in-memory copy and writes the touched records in one
//! store call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::authz::{Action, Authorizer};
use crate::config::CollaborationConfig;
use crate::db::DocumentStore;
use crate::domain::{
    Collaborator, CollaboratorPermission, CollaboratorRole, Document, RoleFamily, User,
};
use crate::errors::{AppError, Result};
use crate::events::{CollaborationEvent, EventSink};
use crate::metrics;

/// Secondary seats per document, per family
fn capacity(limits: &CollaborationConfig, role: CollaboratorRole) -> Option<usize> {
    match role {
        CollaboratorRole::SecondaryStudent => Some(limits.max_secondary_students),
        CollaboratorRole::SecondaryAdvisor => Some(limits.max_secondary_advisors),
        _ => None,
    }
}

/// Fails when a capped role would exceed its limit after `delta` more seats
fn check_capacity(
    document: &Document,
    limits: &CollaborationConfig,
    role: CollaboratorRole,
    delta: usize,
) -> Result<()> {
    if let Some(max) = capacity(limits, role) {
        if document.count_active(role) + delta > max {
            return Err(AppError::business_rule(format!(
                "document already has the maximum of {} {} collaborators",
                max,
                role.as_str()
            )));
        }
    }
    Ok(())
}

fn check_global_role(user: &User, role: CollaboratorRole) -> Result<()> {
    if let Some(family) = role.family() {
        let required = family.required_user_role();
        if !user.has_role(required) {
            return Err(AppError::business_rule(format!(
                "role mismatch: {} requires the {} account role",
                role.as_str(),
                required.as_str()
            )));
        }
    }
    Ok(())
}

fn reject_primary(role: CollaboratorRole) -> Result<()> {
    if role.is_primary() {
        return Err(AppError::business_rule(
            "primary roles are assigned at creation or by promotion",
        ));
    }
    Ok(())
}

fn active_collaborator(document: &Document, collaborator_id: Uuid) -> Result<&Collaborator> {
    let collaborator = document
        .collaborator(collaborator_id)
        .ok_or_else(|| AppError::CollaboratorNotFound {
            id: collaborator_id.to_string(),
        })?;
    if !collaborator.is_active() {
        return Err(AppError::business_rule("collaborator has been removed"));
    }
    Ok(collaborator)
}

/// Outcome of planning an add: the record to write and whether it existed
#[derive(Debug, Clone)]
pub struct PlannedAdd {
    pub collaborator: Collaborator,
    pub reactivated: bool,
}

/// Plans adding `target` to `document`. Mutates nothing.
pub fn plan_add(
    document: &Document,
    requester: &User,
    target: &User,
    role: CollaboratorRole,
    permission: CollaboratorPermission,
    limits: &CollaborationConfig,
    now: DateTime<Utc>,
) -> Result<PlannedAdd> {
    reject_primary(role)?;
    check_global_role(target, role)?;

    match document.binding_for_user(target.id) {
        Some(existing) if existing.is_active() => Err(AppError::business_rule(format!(
            "{} is already a collaborator",
            target.email
        ))),
        Some(existing) => {
            check_capacity(document, limits, role, 1)?;
            let mut collaborator = existing.clone();
            collaborator.reactivate(role, permission, Some(requester.id), now);
            Ok(PlannedAdd {
                collaborator,
                reactivated: true,
            })
        }
        None => {
            check_capacity(document, limits, role, 1)?;
            Ok(PlannedAdd {
                collaborator: Collaborator::new(
                    document.id,
                    target.id,
                    role,
                    permission,
                    Some(requester.id),
                    now,
                ),
                reactivated: false,
            })
        }
    }
}

/// Records touched by a promotion, in the order they must be written
#[derive(Debug, Clone)]
pub struct Promotion {
    pub family: RoleFamily,
    pub demoted: Option<Collaborator>,
    pub promoted: Collaborator,
}

impl Promotion {
    /// The demoted record goes first so the primary index never sees two rows
    pub fn records(&self) -> Vec<Collaborator> {
        self.demoted
            .iter()
            .cloned()
            .chain(std::iter::once(self.promoted.clone()))
            .collect()
    }
}

/// Plans swapping the primary of the target's family. Mutates nothing.
pub fn plan_promotion(
    document: &Document,
    collaborator_id: Uuid,
    limits: &CollaborationConfig,
    now: DateTime<Utc>,
) -> Result<Promotion> {
    let target = active_collaborator(document, collaborator_id)?;
    if target.role.is_primary() {
        return Err(AppError::business_rule("collaborator is already primary"));
    }
    let family = target.role.family().ok_or_else(|| {
        AppError::business_rule(format!(
            "{} cannot be promoted to a primary role",
            target.role.as_str()
        ))
    })?;

    let secondary = family.secondary_role();
    let current_primary = document.primary(family);

    // Target may vacate a secondary seat; the old primary takes one
    let seats_after = document.count_active(secondary)
        - usize::from(target.role == secondary)
        + usize::from(current_primary.is_some());
    if let Some(max) = capacity(limits, secondary) {
        if seats_after > max {
            return Err(AppError::business_rule(format!(
                "demoting the current primary would exceed the maximum of {} {} collaborators",
                max,
                secondary.as_str()
            )));
        }
    }

    let demoted = current_primary.map(|c| {
        let mut c = c.clone();
        c.role = secondary;
        c.permission = CollaboratorPermission::ReadWrite;
        c.updated_at = now;
        c
    });

    let mut promoted = target.clone();
    promoted.role = family.primary_role();
    promoted.permission = CollaboratorPermission::FullAccess;
    promoted.updated_at = now;

    Ok(Promotion {
        family,
        demoted,
        promoted,
    })
}

/// Registry operations over a [`DocumentStore`]
#[derive(Clone)]
pub struct CollaboratorService {
    store: Arc<dyn DocumentStore>,
    authz: Authorizer,
    events: Arc<dyn EventSink>,
    limits: CollaborationConfig,
}

impl CollaboratorService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        authz: Authorizer,
        events: Arc<dyn EventSink>,
        limits: CollaborationConfig,
    ) -> Self {
        Self {
            store,
            authz,
            events,
            limits,
        }
    }

    async fn load(&self, document_id: Uuid) -> Result<Document> {
        self.store
            .load_document(document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })
    }

    async fn load_managed(&self, document_id: Uuid, requester: &User) -> Result<Document> {
        let document = self.load(document_id).await?;
        self.authz
            .require(requester, &document, Action::ManageCollaborators)?;
        Ok(document)
    }

    pub async fn add_collaborator(
        &self,
        document_id: Uuid,
        requester: &User,
        target_email: &str,
        role: CollaboratorRole,
        permission: CollaboratorPermission,
    ) -> Result<Collaborator> {
        let document = self.load_managed(document_id, requester).await?;

        let target = self
            .store
            .find_user_by_email(target_email)
            .await?
            .ok_or_else(|| AppError::UserNotFound {
                id: target_email.to_string(),
            })?;

        let planned = plan_add(
            &document,
            requester,
            &target,
            role,
            permission,
            &self.limits,
            Utc::now(),
        )?;
        self.store
            .save_collaborators(std::slice::from_ref(&planned.collaborator))
            .await?;

        let c = planned.collaborator;
        info!(
            document_id = %document_id,
            collaborator_id = %c.id,
            user_id = %c.user_id,
            role = c.role.as_str(),
            permission = c.permission.as_str(),
            reactivated = planned.reactivated,
            "Collaborator added"
        );
        metrics::record_collaborator_change("added");
        self.events.publish(CollaborationEvent::CollaboratorAdded {
            document_id,
            actor_id: requester.id,
            collaborator_id: c.id,
            user_id: c.user_id,
            role: c.role,
            permission: c.permission,
            reactivated: planned.reactivated,
        });

        Ok(c)
    }

    pub async fn remove_collaborator(
        &self,
        document_id: Uuid,
        requester: &User,
        collaborator_id: Uuid,
        reason: Option<String>,
    ) -> Result<Collaborator> {
        let document = self.load_managed(document_id, requester).await?;

        let mut collaborator = document
            .collaborator(collaborator_id)
            .cloned()
            .ok_or_else(|| AppError::CollaboratorNotFound {
                id: collaborator_id.to_string(),
            })?;
        if !collaborator.is_active() {
            return Err(AppError::business_rule("collaborator is already removed"));
        }
        if collaborator.role.is_primary() {
            return Err(AppError::business_rule(
                "a primary collaborator cannot be removed; promote a replacement first",
            ));
        }

        let reason = reason.filter(|r| !r.trim().is_empty());
        collaborator.deactivate(reason.clone(), Utc::now());
        self.store
            .save_collaborators(std::slice::from_ref(&collaborator))
            .await?;

        info!(
            document_id = %document_id,
            collaborator_id = %collaborator.id,
            user_id = %collaborator.user_id,
            "Collaborator removed"
        );
        metrics::record_collaborator_change("removed");
        self.events.publish(CollaborationEvent::CollaboratorRemoved {
            document_id,
            actor_id: requester.id,
            collaborator_id,
            user_id: collaborator.user_id,
            reason,
        });

        Ok(collaborator)
    }

    pub async fn update_permission(
        &self,
        document_id: Uuid,
        requester: &User,
        collaborator_id: Uuid,
        permission: CollaboratorPermission,
    ) -> Result<Collaborator> {
        let document = self.load_managed(document_id, requester).await?;

        let current = active_collaborator(&document, collaborator_id)?;
        if current.role.is_primary() {
            return Err(AppError::business_rule(
                "primary collaborators always hold full access",
            ));
        }
        if current.permission == permission {
            debug!(collaborator_id = %collaborator_id, "Permission unchanged");
            return Ok(current.clone());
        }

        let old_permission = current.permission;
        let mut collaborator = current.clone();
        collaborator.permission = permission;
        collaborator.updated_at = Utc::now();
        self.store
            .save_collaborators(std::slice::from_ref(&collaborator))
            .await?;

        info!(
            document_id = %document_id,
            collaborator_id = %collaborator_id,
            from = old_permission.as_str(),
            to = permission.as_str(),
            "Collaborator permission changed"
        );
        metrics::record_collaborator_change("permission_changed");
        self.events
            .publish(CollaborationEvent::CollaboratorPermissionChanged {
                document_id,
                actor_id: requester.id,
                collaborator_id,
                user_id: collaborator.user_id,
                old_permission,
                new_permission: permission,
            });

        Ok(collaborator)
    }

    pub async fn update_role(
        &self,
        document_id: Uuid,
        requester: &User,
        collaborator_id: Uuid,
        role: CollaboratorRole,
    ) -> Result<Collaborator> {
        let document = self.load_managed(document_id, requester).await?;

        let current = active_collaborator(&document, collaborator_id)?;
        if current.role.is_primary() {
            return Err(AppError::business_rule(
                "a primary collaborator's role changes only through promotion",
            ));
        }
        reject_primary(role)?;
        if current.role == role {
            return Ok(current.clone());
        }

        let user = self
            .store
            .find_user(current.user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound {
                id: current.user_id.to_string(),
            })?;
        check_global_role(&user, role)?;
        check_capacity(&document, &self.limits, role, 1)?;

        let old_role = current.role;
        let mut collaborator = current.clone();
        collaborator.role = role;
        collaborator.updated_at = Utc::now();
        self.store
            .save_collaborators(std::slice::from_ref(&collaborator))
            .await?;

        info!(
            document_id = %document_id,
            collaborator_id = %collaborator_id,
            from = old_role.as_str(),
            to = role.as_str(),
            "Collaborator role changed"
        );
        metrics::record_collaborator_change("role_changed");
        self.events.publish(CollaborationEvent::CollaboratorRoleChanged {
            document_id,
            actor_id: requester.id,
            collaborator_id,
            user_id: collaborator.user_id,
            old_role,
            new_role: role,
        });

        Ok(collaborator)
    }

    pub async fn promote_to_primary(
        &self,
        document_id: Uuid,
        requester: &User,
        collaborator_id: Uuid,
    ) -> Result<Collaborator> {
        let document = self.load_managed(document_id, requester).await?;

        let promotion = plan_promotion(&document, collaborator_id, &self.limits, Utc::now())?;
        self.store.save_collaborators(&promotion.records()).await?;

        let previous = promotion.demoted.as_ref().map(|c| c.user_id);
        info!(
            document_id = %document_id,
            family = %promotion.family,
            new_primary = %promotion.promoted.user_id,
            previous_primary = ?previous,
            "Primary collaborator changed"
        );
        metrics::record_collaborator_change("promoted");
        self.events.publish(CollaborationEvent::PrimaryChanged {
            document_id,
            actor_id: requester.id,
            family: promotion.family,
            new_primary_user_id: promotion.promoted.user_id,
            previous_primary_user_id: previous,
        });

        Ok(promotion.promoted)
    }

    pub async fn list_collaborators(
        &self,
        document_id: Uuid,
        requester: &User,
        include_removed: bool,
    ) -> Result<Vec<Collaborator>> {
        let document = self.load(document_id).await?;
        self.authz
            .require(requester, &document, Action::ViewDocument)?;

        Ok(document
            .collaborators
            .into_iter()
            .filter(|c| include_removed || c.is_active())
            .collect())
    }
}
