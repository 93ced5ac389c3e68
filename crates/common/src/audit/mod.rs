//! Audit consumer boundary
//!
//! Every authorization decision, positive or negative, is handed to an
//! [`AuditSink`]. The core never persists audit records itself.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::authz::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Granted,
    Denied,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Granted => "granted",
            AuditOutcome::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub actor_id: Uuid,
    pub action: Action,
    pub resource_id: String,
    pub outcome: AuditOutcome,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(actor_id: Uuid, action: Action, resource_id: impl Into<String>, allowed: bool) -> Self {
        Self {
            actor_id,
            action,
            resource_id: resource_id.into(),
            outcome: if allowed {
                AuditOutcome::Granted
            } else {
                AuditOutcome::Denied
            },
            at: Utc::now(),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Writes decisions as structured events on the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) {
        match entry.outcome {
            AuditOutcome::Granted => tracing::debug!(
                target: "audit",
                actor_id = %entry.actor_id,
                action = entry.action.as_str(),
                resource_id = %entry.resource_id,
                outcome = entry.outcome.as_str(),
                "Authorization decision"
            ),
            AuditOutcome::Denied => tracing::warn!(
                target: "audit",
                actor_id = %entry.actor_id,
                action = entry.action.as_str(),
                resource_id = %entry.resource_id,
                outcome = entry.outcome.as_str(),
                "Unauthorized access attempt"
            ),
        }
    }
}
