//! Error Types
//!
//! Shared error type for value parsing and validation in accredia.
//!
//! # Example
//!
//! ```
//! use accredia_core::{AccrediaError, Result};
//!
//! fn require(value: &str) -> Result<&str> {
//!     if value.is_empty() {
//!         return Err(AccrediaError::ValidationError {
//!             field: "document_number".to_string(),
//!             message: "must not be empty".to_string(),
//!         });
//!     }
//!     Ok(value)
//! }
//! ```

use serde::Serialize;
use thiserror::Error;

/// Standardized error type for accredia values.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccrediaError {
    /// Requested resource was not found.
    #[error("{resource} not found{}", id.as_ref().map(|i| format!(": {i}")).unwrap_or_default())]
    NotFound {
        /// The type of resource that was not found (e.g., "Event")
        resource: String,
        /// Optional identifier of the resource
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Input validation failure.
    #[error("Validation error on field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },
}

impl AccrediaError {
    /// Shorthand for a [`AccrediaError::ValidationError`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Type alias for Results using `AccrediaError`.
pub type Result<T> = std::result::Result<T, AccrediaError>;
