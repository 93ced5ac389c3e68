//! SeaORM entity models
//!
//! Database entities for ThesisForge, plus conversions to and from the
//! domain types in [`crate::domain`].

mod collaborator;
mod document;
mod user;

pub use collaborator::{
    Entity as CollaboratorEntity,
    Model as CollaboratorRow,
    ActiveModel as CollaboratorActiveModel,
    Column as CollaboratorColumn,
};

pub use document::{
    Entity as DocumentEntity,
    Model as DocumentRow,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
};

pub use user::{
    Entity as UserEntity,
    Model as UserRow,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::Set;
use std::collections::BTreeSet;

use crate::domain::{Collaborator, CollaboratorState, Document, User, UserRole};
use crate::errors::{AppError, Result};

fn utc(value: DateTime<FixedOffset>) -> DateTime<Utc> {
    value.with_timezone(&Utc)
}

fn corrupt(table: &str, id: impl std::fmt::Display, err: AppError) -> AppError {
    AppError::Internal {
        message: format!("corrupt {} row {}: {}", table, id, err),
    }
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self> {
        let names: Vec<String> = serde_json::from_value(row.roles)?;
        let roles = names
            .iter()
            .map(|name| name.parse::<UserRole>())
            .collect::<Result<BTreeSet<_>>>()
            .map_err(|e| corrupt("users", row.id, e))?;

        Ok(User {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            roles,
        })
    }
}

impl TryFrom<CollaboratorRow> for Collaborator {
    type Error = AppError;

    fn try_from(row: CollaboratorRow) -> Result<Self> {
        let role = row
            .role
            .parse()
            .map_err(|e| corrupt("document_collaborators", row.id, e))?;
        let permission = row
            .permission
            .parse()
            .map_err(|e| corrupt("document_collaborators", row.id, e))?;

        let state = if row.active {
            CollaboratorState::Active
        } else {
            CollaboratorState::Removed {
                at: row.removed_at.map(utc).unwrap_or_else(|| utc(row.updated_at)),
                reason: row.removal_reason,
            }
        };

        Ok(Collaborator {
            id: row.id,
            document_id: row.document_id,
            user_id: row.user_id,
            role,
            permission,
            state,
            added_by: row.added_by,
            added_at: utc(row.added_at),
            updated_at: utc(row.updated_at),
        })
    }
}

/// Builds the aggregate from its row and all of its collaborator rows
pub fn document_from_rows(row: DocumentRow, collaborators: Vec<CollaboratorRow>) -> Result<Document> {
    let status = row
        .status
        .parse()
        .map_err(|e| corrupt("documents", row.id, e))?;
    let collaborators = collaborators
        .into_iter()
        .map(Collaborator::try_from)
        .collect::<Result<Vec<_>>>()?;

    Ok(Document {
        id: row.id,
        title: row.title,
        status,
        submitted_at: row.submitted_at.map(utc),
        approved_at: row.approved_at.map(utc),
        rejected_at: row.rejected_at.map(utc),
        rejection_reason: row.rejection_reason,
        legacy_student_id: row.legacy_student_id,
        legacy_advisor_id: row.legacy_advisor_id,
        created_at: utc(row.created_at),
        updated_at: utc(row.updated_at),
        collaborators,
    })
}

impl From<&User> for UserActiveModel {
    fn from(user: &User) -> Self {
        let now = Utc::now();
        let roles: Vec<&str> = user.roles.iter().map(|r| r.as_str()).collect();
        UserActiveModel {
            id: Set(user.id),
            email: Set(user.email.clone()),
            display_name: Set(user.display_name.clone()),
            roles: Set(serde_json::json!(roles)),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
    }
}

impl From<&Document> for DocumentActiveModel {
    fn from(doc: &Document) -> Self {
        DocumentActiveModel {
            id: Set(doc.id),
            title: Set(doc.title.clone()),
            status: Set(doc.status.as_str().to_string()),
            submitted_at: Set(doc.submitted_at.map(Into::into)),
            approved_at: Set(doc.approved_at.map(Into::into)),
            rejected_at: Set(doc.rejected_at.map(Into::into)),
            rejection_reason: Set(doc.rejection_reason.clone()),
            legacy_student_id: Set(doc.legacy_student_id),
            legacy_advisor_id: Set(doc.legacy_advisor_id),
            created_at: Set(doc.created_at.into()),
            updated_at: Set(doc.updated_at.into()),
        }
    }
}

impl From<&Collaborator> for CollaboratorActiveModel {
    fn from(c: &Collaborator) -> Self {
        let (active, removed_at, removal_reason): (bool, Option<DateTime<FixedOffset>>, Option<String>) = match &c.state {
            CollaboratorState::Active => (true, None, None),
            CollaboratorState::Removed { at, reason } => (false, Some((*at).into()), reason.clone()),
        };
        CollaboratorActiveModel {
            id: Set(c.id),
            document_id: Set(c.document_id),
            user_id: Set(c.user_id),
            role: Set(c.role.as_str().to_string()),
            permission: Set(c.permission.as_str().to_string()),
            active: Set(active),
            removed_at: Set(removed_at),
            removal_reason: Set(removal_reason),
            added_by: Set(c.added_by),
            added_at: Set(c.added_at.into()),
            updated_at: Set(c.updated_at.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CollaboratorPermission, CollaboratorRole, DocumentStatus};
    use sea_orm::ActiveValue;
    use uuid::Uuid;

    fn row_time() -> DateTime<FixedOffset> {
        Utc::now().into()
    }

    #[test]
    fn test_removed_row_maps_to_removed_state() {
        let at = row_time();
        let row = CollaboratorRow {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "REVIEWER".into(),
            permission: "READ_ONLY".into(),
            active: false,
            removed_at: Some(at),
            removal_reason: Some("conflict of interest".into()),
            added_by: None,
            added_at: at,
            updated_at: at,
        };
        let c = Collaborator::try_from(row).unwrap();
        assert_eq!(c.role, CollaboratorRole::Reviewer);
        assert_eq!(
            c.state,
            CollaboratorState::Removed {
                at: utc(at),
                reason: Some("conflict of interest".into())
            }
        );
    }

    #[test]
    fn test_unknown_role_is_reported_as_corrupt() {
        let at = row_time();
        let row = CollaboratorRow {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "OWNER".into(),
            permission: "READ_ONLY".into(),
            active: true,
            removed_at: None,
            removal_reason: None,
            added_by: None,
            added_at: at,
            updated_at: at,
        };
        let err = Collaborator::try_from(row).unwrap_err();
        assert!(err.to_string().contains("corrupt document_collaborators row"));
    }

    #[test]
    fn test_document_rows_round_into_aggregate() {
        let at = row_time();
        let doc_id = Uuid::new_v4();
        let row = DocumentRow {
            id: doc_id,
            title: "On Types".into(),
            status: "REVISION".into(),
            submitted_at: Some(at),
            approved_at: None,
            rejected_at: Some(at),
            rejection_reason: Some("needs more citations".into()),
            legacy_student_id: None,
            legacy_advisor_id: None,
            created_at: at,
            updated_at: at,
        };
        let doc = document_from_rows(row, vec![]).unwrap();
        assert_eq!(doc.status, DocumentStatus::Revision);
        assert_eq!(doc.rejection_reason.as_deref(), Some("needs more citations"));
    }

    #[test]
    fn test_active_model_flattens_state() {
        let mut c = Collaborator::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            CollaboratorRole::CoAdvisor,
            CollaboratorPermission::ReadWrite,
            None,
            Utc::now(),
        );
        c.deactivate(Some("sabbatical".into()), Utc::now());
        let model = CollaboratorActiveModel::from(&c);
        assert!(matches!(model.active, ActiveValue::Set(false)));
        assert_eq!(model.role.clone().unwrap(), "CO_ADVISOR");
        assert_eq!(model.removal_reason.clone().unwrap().as_deref(), Some("sabbatical"));
    }

    #[test]
    fn test_user_roles_from_json() {
        let at = row_time();
        let row = UserRow {
            id: Uuid::new_v4(),
            email: "a@uni.edu".into(),
            display_name: "A".into(),
            roles: serde_json::json!(["ADVISOR", "ADMIN"]),
            created_at: at,
            updated_at: at,
        };
        let user = User::try_from(row).unwrap();
        assert!(user.is_admin());
        assert!(user.has_role(UserRole::Advisor));
        assert!(!user.has_role(UserRole::Student));
    }
}
