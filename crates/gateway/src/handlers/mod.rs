//! API handlers module

pub mod admin;
pub mod collaborators;
pub mod documents;
pub mod health;
pub mod presence;

use thesisforge_common::errors::{AppError, Result};
use validator::Validate;

/// Runs `validator` rules and maps failures to a 400
pub(crate) fn validate<T: Validate>(request: &T) -> Result<()> {
    request.validate().map_err(|e| {
        let field = e.field_errors().keys().next().map(|k| k.to_string());
        AppError::Validation {
            message: e.to_string(),
            field,
        }
    })
}
