//! Who is looking at which document right now
//!
//! Heartbeats are kept per document in a sharded map. Entries that stop
//! heartbeating are dropped by [`PresenceTracker::purge_idle`], which the
//! gateway runs on a timer.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    pub user_id: Uuid,
    pub last_seen: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PresenceTracker {
    documents: Arc<DashMap<Uuid, HashMap<Uuid, DateTime<Utc>>>>,
    idle_timeout: Duration,
}

impl PresenceTracker {
    pub fn new(idle_timeout: std::time::Duration) -> Self {
        Self {
            documents: Arc::new(DashMap::new()),
            idle_timeout: Duration::from_std(idle_timeout).unwrap_or_else(|_| Duration::minutes(2)),
        }
    }

    /// Records a heartbeat. Returns true when the user was not present before.
    pub fn touch(&self, document_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> bool {
        self.documents
            .entry(document_id)
            .or_default()
            .insert(user_id, now)
            .is_none()
    }

    pub fn leave(&self, document_id: Uuid, user_id: Uuid) -> bool {
        let Some(mut entry) = self.documents.get_mut(&document_id) else {
            return false;
        };
        let removed = entry.remove(&user_id).is_some();
        let empty = entry.is_empty();
        drop(entry);

        if empty {
            self.documents.remove_if(&document_id, |_, users| users.is_empty());
        }
        removed
    }

    /// Users seen within the idle window, most recent first
    pub fn active_users(&self, document_id: Uuid, now: DateTime<Utc>) -> Vec<PresenceEntry> {
        let cutoff = now - self.idle_timeout;
        let mut users: Vec<PresenceEntry> = self
            .documents
            .get(&document_id)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|(_, seen)| **seen >= cutoff)
                    .map(|(user_id, seen)| PresenceEntry {
                        user_id: *user_id,
                        last_seen: *seen,
                    })
                    .collect()
            })
            .unwrap_or_default();
        users.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        users
    }

    /// Drops idle users and empty documents, returning how many users were dropped
    pub fn purge_idle(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.idle_timeout;
        let mut purged = 0;
        self.documents.retain(|_, users| {
            let before = users.len();
            users.retain(|_, seen| *seen >= cutoff);
            purged += before - users.len();
            !users.is_empty()
        });
        purged
    }

    /// Total users present across all documents
    pub fn total_active(&self) -> usize {
        self.documents.iter().map(|entry| entry.len()).sum()
    }

    /// Forgets everyone on a deleted document
    pub fn forget_document(&self, document_id: Uuid) {
        self.documents.remove(&document_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(std::time::Duration::from_secs(60))
    }

    #[test]
    fn test_touch_and_leave() {
        let presence = tracker();
        let doc = Uuid::new_v4();
        let user = Uuid::new_v4();
        let now = Utc::now();

        assert!(presence.touch(doc, user, now));
        assert!(!presence.touch(doc, user, now));
        assert_eq!(presence.active_users(doc, now).len(), 1);

        assert!(presence.leave(doc, user));
        assert!(!presence.leave(doc, user));
        assert!(presence.active_users(doc, now).is_empty());
        assert_eq!(presence.total_active(), 0);
    }

    #[test]
    fn test_idle_users_are_hidden_then_purged() {
        let presence = tracker();
        let doc = Uuid::new_v4();
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let now = Utc::now();

        presence.touch(doc, stale, now - Duration::seconds(120));
        presence.touch(doc, fresh, now - Duration::seconds(5));

        let active = presence.active_users(doc, now);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, fresh);

        assert_eq!(presence.purge_idle(now), 1);
        assert_eq!(presence.total_active(), 1);

        assert_eq!(presence.purge_idle(now + Duration::seconds(600)), 1);
        assert_eq!(presence.total_active(), 0);
    }

    #[test]
    fn test_active_users_sorted_by_recency() {
        let presence = tracker();
        let doc = Uuid::new_v4();
        let now = Utc::now();
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        presence.touch(doc, older, now - Duration::seconds(30));
        presence.touch(doc, newer, now);

        let ids: Vec<Uuid> = presence.active_users(doc, now).into_iter().map(|e| e.user_id).collect();
        assert_eq!(ids, vec![newer, older]);
    }
}
