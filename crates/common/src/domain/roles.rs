//! Global account roles, per-document collaborator roles and permission tiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// Coarse-grained account classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Student,
    Advisor,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "STUDENT",
            UserRole::Advisor => "ADVISOR",
            UserRole::Admin => "ADMIN",
        }
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STUDENT" => Ok(UserRole::Student),
            "ADVISOR" => Ok(UserRole::Advisor),
            "ADMIN" => Ok(UserRole::Admin),
            other => Err(AppError::Validation {
                message: format!("unknown user role '{}'", other),
                field: Some("roles".to_string()),
            }),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two collaborator families that carry a primary seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleFamily {
    Student,
    Advisor,
}

impl RoleFamily {
    pub fn primary_role(self) -> CollaboratorRole {
        match self {
            RoleFamily::Student => CollaboratorRole::PrimaryStudent,
            RoleFamily::Advisor => CollaboratorRole::PrimaryAdvisor,
        }
    }

    pub fn secondary_role(self) -> CollaboratorRole {
        match self {
            RoleFamily::Student => CollaboratorRole::SecondaryStudent,
            RoleFamily::Advisor => CollaboratorRole::SecondaryAdvisor,
        }
    }

    /// Global account role a user needs before joining this family
    pub fn required_user_role(self) -> UserRole {
        match self {
            RoleFamily::Student => UserRole::Student,
            RoleFamily::Advisor => UserRole::Advisor,
        }
    }
}

impl fmt::Display for RoleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleFamily::Student => f.write_str("student"),
            RoleFamily::Advisor => f.write_str("advisor"),
        }
    }
}

/// A collaborator's functional position on one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollaboratorRole {
    PrimaryStudent,
    SecondaryStudent,
    CoStudent,
    PrimaryAdvisor,
    SecondaryAdvisor,
    CoAdvisor,
    ExternalAdvisor,
    Examiner,
    Reviewer,
    Observer,
}

impl CollaboratorRole {
    pub const ALL: [CollaboratorRole; 10] = [
        CollaboratorRole::PrimaryStudent,
        CollaboratorRole::SecondaryStudent,
        CollaboratorRole::CoStudent,
        CollaboratorRole::PrimaryAdvisor,
        CollaboratorRole::SecondaryAdvisor,
        CollaboratorRole::CoAdvisor,
        CollaboratorRole::ExternalAdvisor,
        CollaboratorRole::Examiner,
        CollaboratorRole::Reviewer,
        CollaboratorRole::Observer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollaboratorRole::PrimaryStudent => "PRIMARY_STUDENT",
            CollaboratorRole::SecondaryStudent => "SECONDARY_STUDENT",
            CollaboratorRole::CoStudent => "CO_STUDENT",
            CollaboratorRole::PrimaryAdvisor => "PRIMARY_ADVISOR",
            CollaboratorRole::SecondaryAdvisor => "SECONDARY_ADVISOR",
            CollaboratorRole::CoAdvisor => "CO_ADVISOR",
            CollaboratorRole::ExternalAdvisor => "EXTERNAL_ADVISOR",
            CollaboratorRole::Examiner => "EXAMINER",
            CollaboratorRole::Reviewer => "REVIEWER",
            CollaboratorRole::Observer => "OBSERVER",
        }
    }

    pub fn family(&self) -> Option<RoleFamily> {
        if self.is_student() {
            Some(RoleFamily::Student)
        } else if self.is_advisor() {
            Some(RoleFamily::Advisor)
        } else {
            None
        }
    }

    pub fn is_student(&self) -> bool {
        matches!(
            self,
            CollaboratorRole::PrimaryStudent
                | CollaboratorRole::SecondaryStudent
                | CollaboratorRole::CoStudent
        )
    }

    pub fn is_advisor(&self) -> bool {
        matches!(
            self,
            CollaboratorRole::PrimaryAdvisor
                | CollaboratorRole::SecondaryAdvisor
                | CollaboratorRole::CoAdvisor
                | CollaboratorRole::ExternalAdvisor
        )
    }

    pub fn is_primary(&self) -> bool {
        matches!(
            self,
            CollaboratorRole::PrimaryStudent | CollaboratorRole::PrimaryAdvisor
        )
    }

    /// External advisors, examiners, reviewers and observers never edit content
    pub fn can_edit(&self) -> bool {
        self.is_student()
            || matches!(
                self,
                CollaboratorRole::PrimaryAdvisor
                    | CollaboratorRole::SecondaryAdvisor
                    | CollaboratorRole::CoAdvisor
            )
    }

    pub fn can_manage_collaborators(&self) -> bool {
        self.is_primary()
    }

    pub fn can_submit_document(&self) -> bool {
        self.is_student()
    }

    pub fn can_approve_document(&self) -> bool {
        self.is_advisor()
    }
}

impl FromStr for CollaboratorRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_uppercase();
        CollaboratorRole::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| AppError::Validation {
                message: format!("unknown collaborator role '{}'", s),
                field: Some("role".to_string()),
            })
    }
}

impl fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability tier, ordered from least to most capable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollaboratorPermission {
    ReadOnly,
    ReadComment,
    ReadWrite,
    FullAccess,
}

impl CollaboratorPermission {
    pub const ALL: [CollaboratorPermission; 4] = [
        CollaboratorPermission::ReadOnly,
        CollaboratorPermission::ReadComment,
        CollaboratorPermission::ReadWrite,
        CollaboratorPermission::FullAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollaboratorPermission::ReadOnly => "READ_ONLY",
            CollaboratorPermission::ReadComment => "READ_COMMENT",
            CollaboratorPermission::ReadWrite => "READ_WRITE",
            CollaboratorPermission::FullAccess => "FULL_ACCESS",
        }
    }

    pub fn can_read(&self) -> bool {
        true
    }

    pub fn can_comment(&self) -> bool {
        *self >= CollaboratorPermission::ReadComment
    }

    pub fn can_write(&self) -> bool {
        *self >= CollaboratorPermission::ReadWrite
    }

    pub fn can_manage_collaborators(&self) -> bool {
        *self == CollaboratorPermission::FullAccess
    }

    pub fn can_change_status(&self) -> bool {
        *self == CollaboratorPermission::FullAccess
    }
}

impl FromStr for CollaboratorPermission {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_uppercase();
        CollaboratorPermission::ALL
            .into_iter()
            .find(|permission| permission.as_str() == normalized)
            .ok_or_else(|| AppError::Validation {
                message: format!("unknown collaborator permission '{}'", s),
                field: Some("permission".to_string()),
            })
    }
}

impl fmt::Display for CollaboratorPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_families_are_disjoint() {
        for role in CollaboratorRole::ALL {
            assert!(!(role.is_student() && role.is_advisor()), "{role}");
            if role.is_primary() {
                assert!(role.family().is_some());
                assert_eq!(role.family().map(RoleFamily::primary_role), Some(role));
            }
        }
        assert_eq!(CollaboratorRole::Examiner.family(), None);
        assert_eq!(CollaboratorRole::Observer.family(), None);
    }

    #[test]
    fn test_reviewer_cannot_edit() {
        assert!(!CollaboratorRole::Reviewer.can_edit());
        assert!(!CollaboratorRole::Examiner.can_edit());
        assert!(!CollaboratorRole::ExternalAdvisor.can_edit());
        assert!(CollaboratorRole::CoStudent.can_edit());
    }

    #[test]
    fn test_only_advisors_approve_and_only_students_submit() {
        for role in CollaboratorRole::ALL {
            assert_eq!(role.can_approve_document(), role.is_advisor());
            assert_eq!(role.can_submit_document(), role.is_student());
        }
    }

    #[test]
    fn test_permission_ordering() {
        use CollaboratorPermission::*;
        assert!(ReadOnly < ReadComment);
        assert!(ReadComment < ReadWrite);
        assert!(ReadWrite < FullAccess);

        assert!(ReadOnly.can_read());
        assert!(!ReadOnly.can_comment());
        assert!(ReadComment.can_comment() && !ReadComment.can_write());
        assert!(ReadWrite.can_write() && !ReadWrite.can_manage_collaborators());
        assert!(FullAccess.can_manage_collaborators() && FullAccess.can_change_status());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "co_advisor".parse::<CollaboratorRole>().unwrap(),
            CollaboratorRole::CoAdvisor
        );
        assert_eq!(
            "READ_WRITE".parse::<CollaboratorPermission>().unwrap(),
            CollaboratorPermission::ReadWrite
        );
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!("owner".parse::<CollaboratorRole>().is_err());
    }

    #[test]
    fn test_serde_uses_screaming_case() {
        let json = serde_json::to_string(&CollaboratorRole::PrimaryAdvisor).unwrap();
        assert_eq!(json, "\"PRIMARY_ADVISOR\"");
        let perm: CollaboratorPermission = serde_json::from_str("\"FULL_ACCESS\"").unwrap();
        assert_eq!(perm, CollaboratorPermission::FullAccess);
    }
}
