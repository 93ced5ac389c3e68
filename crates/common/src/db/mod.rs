//! Database layer for ThesisForge
//!
//! Provides:
//! - SeaORM entity models
//! - The [`DocumentStore`] persistence boundary
//! - A Postgres-backed [`Repository`] and an in-process [`MemoryStore`]
//! - Connection pool management and the embedded schema migration

mod memory;
pub mod models;
mod repository;

pub use memory::MemoryStore;
pub use repository::Repository;

use crate::config::DatabaseConfig;
use crate::domain::{Collaborator, Document, User};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Embedded schema, applied idempotently at startup
const SCHEMA_SQL: &str = include_str!("../../migrations/0001_collaboration.sql");

/// Everything the core needs from storage.
///
/// Implementations must treat each call as one atomic unit and must reject a
/// second active binding for the same (document, user) pair with
/// [`AppError::Conflict`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn upsert_user(&self, user: &User) -> Result<()>;

    /// Loads the document together with its active and removed collaborators
    async fn load_document(&self, id: Uuid) -> Result<Option<Document>>;

    /// Inserts the document row and its initial collaborators together
    async fn insert_document(&self, document: &Document) -> Result<()>;

    /// Persists the workflow fields of an existing document
    async fn save_document(&self, document: &Document) -> Result<()>;

    async fn delete_document(&self, id: Uuid) -> Result<bool>;

    /// Inserts or updates every record, in order, all or nothing
    async fn save_collaborators(&self, collaborators: &[Collaborator]) -> Result<()>;

    /// Documents that still carry a legacy student or advisor field
    async fn list_legacy_documents(&self) -> Result<Vec<Document>>;
}

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to primary database...");

        let mut primary_opts = ConnectOptions::new(&config.url);
        primary_opts
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let primary = Database::connect(primary_opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect to primary: {}", e),
            })?;

        // Connect to replica if configured
        let replica = if let Some(ref read_url) = config.read_url {
            info!("Connecting to read replica...");

            let mut replica_opts = ConnectOptions::new(read_url);
            replica_opts
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
                .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
                .sqlx_logging(false);

            let replica_conn = Database::connect(replica_opts)
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Failed to connect to replica: {}", e),
                })?;

            Some(replica_conn)
        } else {
            None
        };

        info!("Database connections established");

        Ok(Self { primary, replica })
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Get the connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Apply the embedded schema on the primary
    pub async fn migrate(&self) -> Result<()> {
        info!("Applying collaboration schema...");
        self.primary
            .execute_unprepared(SCHEMA_SQL)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Schema migration failed: {}", e),
            })?;
        Ok(())
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.primary
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Primary ping failed: {}", e),
            })?;

        if let Some(ref replica) = self.replica {
            replica
                .execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Replica ping failed: {}", e),
                })?;
        }

        Ok(())
    }
}
