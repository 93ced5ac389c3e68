//! Backfill of collaborator records from the legacy single-owner fields
//!
//! Documents created before the registry carry `legacy_student_id` and
//! `legacy_advisor_id`. Running the backfill gives each such document the
//! matching primary collaborator. Running it again changes nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DocumentStore;
use crate::domain::{Collaborator, CollaboratorPermission, Document, RoleFamily};
use crate::errors::Result;
use crate::metrics;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub documents_scanned: usize,
    pub students_backfilled: usize,
    pub advisors_backfilled: usize,
    /// Legacy fields whose primary already exists
    pub already_migrated: usize,
    /// Legacy fields pointing at users that no longer exist
    pub skipped_unknown_users: usize,
    /// Legacy user lacks the family's account role, or is active on the
    /// document under a role outside that family
    pub skipped_conflicts: usize,
    pub failed_documents: usize,
}

impl MigrationReport {
    pub fn backfilled(&self) -> usize {
        self.students_backfilled + self.advisors_backfilled
    }
}

enum Backfill {
    Done(Collaborator),
    AlreadyMigrated,
    Conflict,
}

/// Gives `document` a primary for `family` bound to `user_id`, in place
fn backfill_primary(
    document: &mut Document,
    family: RoleFamily,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Backfill {
    if document.primary(family).is_some() {
        return Backfill::AlreadyMigrated;
    }
    let role = family.primary_role();

    let existing = document.binding_for_user(user_id).map(|c| c.id);
    if let Some(c) = existing.and_then(|id| document.collaborator_mut(id)) {
        if c.is_active() {
            // Only a binding already in the family may take its primary seat
            if c.role.family() != Some(family) {
                return Backfill::Conflict;
            }
            c.role = role;
            c.permission = CollaboratorPermission::FullAccess;
            c.updated_at = now;
        } else {
            c.reactivate(role, CollaboratorPermission::FullAccess, None, now);
        }
        return Backfill::Done(c.clone());
    }

    let c = Collaborator::new(
        document.id,
        user_id,
        role,
        CollaboratorPermission::FullAccess,
        None,
        now,
    );
    document.collaborators.push(c.clone());
    Backfill::Done(c)
}

pub struct MigrationService {
    store: Arc<dyn DocumentStore>,
}

impl MigrationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn migrate_existing_documents(&self) -> Result<MigrationReport> {
        let documents = self.store.list_legacy_documents().await?;
        let mut report = MigrationReport {
            documents_scanned: documents.len(),
            ..Default::default()
        };

        for mut document in documents {
            let now = Utc::now();
            let mut records = Vec::new();
            let mut students = 0;
            let mut advisors = 0;

            let legacy = [
                (RoleFamily::Student, document.legacy_student_id),
                (RoleFamily::Advisor, document.legacy_advisor_id),
            ];
            for (family, user_id) in legacy {
                let Some(user_id) = user_id else { continue };

                if document.primary(family).is_some() {
                    report.already_migrated += 1;
                    continue;
                }
                let Some(user) = self.store.find_user(user_id).await? else {
                    warn!(
                        document_id = %document.id,
                        user_id = %user_id,
                        family = %family,
                        "Legacy user not found, skipping"
                    );
                    report.skipped_unknown_users += 1;
                    continue;
                };
                if !user.has_role(family.required_user_role()) {
                    warn!(
                        document_id = %document.id,
                        user_id = %user_id,
                        family = %family,
                        "Legacy user lacks the account role for this family, skipping"
                    );
                    report.skipped_conflicts += 1;
                    continue;
                }

                match backfill_primary(&mut document, family, user_id, now) {
                    Backfill::Done(record) => {
                        records.push(record);
                        match family {
                            RoleFamily::Student => students += 1,
                            RoleFamily::Advisor => advisors += 1,
                        }
                    }
                    Backfill::AlreadyMigrated => report.already_migrated += 1,
                    Backfill::Conflict => {
                        warn!(
                            document_id = %document.id,
                            user_id = %user_id,
                            family = %family,
                            "Legacy user is bound under another family, skipping"
                        );
                        report.skipped_conflicts += 1;
                    }
                }
            }

            if records.is_empty() {
                continue;
            }
            match self.store.save_collaborators(&records).await {
                Ok(()) => {
                    report.students_backfilled += students;
                    report.advisors_backfilled += advisors;
                }
                Err(e) => {
                    warn!(document_id = %document.id, error = %e, "Backfill failed for document");
                    report.failed_documents += 1;
                }
            }
        }

        metrics::record_migration(report.students_backfilled, report.advisors_backfilled);
        info!(
            scanned = report.documents_scanned,
            students = report.students_backfilled,
            advisors = report.advisors_backfilled,
            already_migrated = report.already_migrated,
            skipped = report.skipped_unknown_users + report.skipped_conflicts,
            failed = report.failed_documents,
            "Collaborator backfill complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CollaboratorRole, UserRole};
    use crate::testing::Fixture;

    async fn legacy_document(
        fx: &Fixture,
        student: Option<Uuid>,
        advisor: Option<Uuid>,
    ) -> Document {
        let mut doc = Document::new("Legacy thesis", Utc::now());
        doc.legacy_student_id = student;
        doc.legacy_advisor_id = advisor;
        fx.store.insert_document(&doc).await.unwrap();
        doc
    }

    #[tokio::test]
    async fn test_backfill_is_idempotent() {
        let fx = Fixture::new();
        let student = fx.user("ada@uni.edu", &[UserRole::Student]).await;
        let advisor = fx.user("prof@uni.edu", &[UserRole::Advisor]).await;
        let doc = legacy_document(&fx, Some(student.id), Some(advisor.id)).await;
        legacy_document(&fx, Some(student.id), Some(Uuid::new_v4())).await;

        let service = MigrationService::new(fx.store.clone());
        let first = service.migrate_existing_documents().await.unwrap();
        assert_eq!(first.documents_scanned, 2);
        assert_eq!(first.students_backfilled, 2);
        assert_eq!(first.advisors_backfilled, 1);
        assert_eq!(first.skipped_unknown_users, 1);

        let migrated = fx.reload(&doc).await;
        let primary = migrated.primary(RoleFamily::Student).unwrap();
        assert_eq!(primary.user_id, student.id);
        assert_eq!(primary.permission, CollaboratorPermission::FullAccess);
        assert_eq!(primary.added_by, None);

        let second = service.migrate_existing_documents().await.unwrap();
        assert_eq!(second.backfilled(), 0);
        assert_eq!(second.already_migrated, 3);

        let again = fx.reload(&doc).await;
        assert_eq!(again.collaborators, migrated.collaborators);
    }

    #[tokio::test]
    async fn test_existing_binding_is_reused() {
        let fx = Fixture::new();
        let student = fx.user("ada@uni.edu", &[UserRole::Student]).await;
        let mut doc = Document::new("Legacy thesis", Utc::now());
        doc.legacy_student_id = Some(student.id);
        let mut removed = Collaborator::new(
            doc.id,
            student.id,
            CollaboratorRole::SecondaryStudent,
            CollaboratorPermission::ReadComment,
            None,
            Utc::now(),
        );
        removed.deactivate(None, Utc::now());
        doc.collaborators.push(removed.clone());
        fx.store.insert_document(&doc).await.unwrap();

        let report = MigrationService::new(fx.store.clone())
            .migrate_existing_documents()
            .await
            .unwrap();
        assert_eq!(report.students_backfilled, 1);

        let migrated = fx.reload(&doc).await;
        assert_eq!(migrated.collaborators.len(), 1);
        let primary = migrated.primary(RoleFamily::Student).unwrap();
        assert_eq!(primary.id, removed.id);
        assert_eq!(primary.role, CollaboratorRole::PrimaryStudent);
    }

    #[tokio::test]
    async fn test_same_user_in_both_fields_is_a_conflict() {
        let fx = Fixture::new();
        let user = fx
            .user("both@uni.edu", &[UserRole::Student, UserRole::Advisor])
            .await;
        let doc = legacy_document(&fx, Some(user.id), Some(user.id)).await;

        let report = MigrationService::new(fx.store.clone())
            .migrate_existing_documents()
            .await
            .unwrap();
        assert_eq!(report.students_backfilled, 1);
        assert_eq!(report.skipped_conflicts, 1);
        assert!(fx.reload(&doc).await.primaries_consistent());
    }

    #[tokio::test]
    async fn test_binding_from_other_family_is_not_promoted() {
        let fx = Fixture::new();
        let user = fx
            .user("dual@uni.edu", &[UserRole::Student, UserRole::Advisor])
            .await;
        let mut doc = Document::new("Legacy thesis", Utc::now());
        doc.legacy_student_id = Some(user.id);
        let co_advisor = Collaborator::new(
            doc.id,
            user.id,
            CollaboratorRole::CoAdvisor,
            CollaboratorPermission::ReadWrite,
            None,
            Utc::now(),
        );
        doc.collaborators.push(co_advisor.clone());
        fx.store.insert_document(&doc).await.unwrap();

        let report = MigrationService::new(fx.store.clone())
            .migrate_existing_documents()
            .await
            .unwrap();
        assert_eq!(report.students_backfilled, 0);
        assert_eq!(report.skipped_conflicts, 1);

        let after = fx.reload(&doc).await;
        assert!(after.primary(RoleFamily::Student).is_none());
        assert_eq!(after.collaborators, vec![co_advisor]);
        assert!(after.primaries_consistent());
    }

    #[tokio::test]
    async fn test_legacy_user_without_account_role_is_skipped() {
        let fx = Fixture::new();
        let advisor = fx.user("prof@uni.edu", &[UserRole::Advisor]).await;
        let observer = fx.user("obs@uni.edu", &[]).await;
        let doc = legacy_document(&fx, Some(observer.id), Some(advisor.id)).await;

        let report = MigrationService::new(fx.store.clone())
            .migrate_existing_documents()
            .await
            .unwrap();
        assert_eq!(report.students_backfilled, 0);
        assert_eq!(report.advisors_backfilled, 1);
        assert_eq!(report.skipped_conflicts, 1);

        let after = fx.reload(&doc).await;
        assert!(after.primary(RoleFamily::Student).is_none());
        assert_eq!(
            after.primary(RoleFamily::Advisor).map(|c| c.user_id),
            Some(advisor.id)
        );
    }
}
