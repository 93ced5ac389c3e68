//! ThesisForge Common Library
//!
//! Shared code for the ThesisForge services including:
//! - Collaboration domain model (users, documents, collaborators)
//! - Authorization engine and audit boundary
//! - Collaborator registry, document lifecycle and legacy migration
//! - Database models and the document store
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod audit;
pub mod auth;
pub mod authz;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod metrics;
pub mod migration;
pub mod presence;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DocumentStore, MemoryStore, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
