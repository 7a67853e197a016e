//! accredia Core Library
//!
//! Shared types for accredia.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (TenantId, EventId, PersonId, ...)
//! - [`document`] - Document identity, normalization and format rules
//! - [`attributes`] - Extensible attribute bag with reserved metadata keys
//! - [`quota`] - Quota limits and usage arithmetic
//! - [`error`] - Standardized error type (AccrediaError)
//!
//! # Example
//!
//! ```
//! use accredia_core::{DocumentKey, DocumentType};
//!
//! let key = DocumentKey::new(DocumentType::NationalId, "12.345.678-5");
//! assert_eq!(key.number, "123456785");
//! assert!(key.validate_format().is_ok());
//! ```

pub mod attributes;
pub mod document;
pub mod error;
pub mod ids;
pub mod quota;

pub use attributes::{AttributeBag, RESERVED_PREFIX};
pub use document::{normalize_document_number, DocumentKey, DocumentType, Nationality};
pub use error::{AccrediaError, Result};
pub use ids::{AccreditationId, EventId, ParseIdError, PersonId, ProfileId, TenantId, UserId};
pub use quota::{normalize_label, QuotaCheck, QuotaLedger, QuotaLimit, QuotaScope};
