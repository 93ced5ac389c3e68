//! Core data model shared by the registry, authorization and lifecycle layers

pub mod collaborator;
pub mod document;
pub mod roles;
pub mod status;
pub mod user;

pub use collaborator::{Collaborator, CollaboratorState};
pub use document::Document;
pub use roles::{CollaboratorPermission, CollaboratorRole, RoleFamily, UserRole};
pub use status::DocumentStatus;
pub use user::User;
