//! Strongly Typed Identifiers
//!
//! Newtype wrappers around UUIDs so that a person id can never be passed
//! where an event id is expected.
//!
//! # Example
//!
//! ```
//! use accredia_core::{EventId, PersonId};
//!
//! let event = EventId::new();
//! let person = PersonId::new();
//!
//! fn requires_event(id: EventId) -> String {
//!     id.to_string()
//! }
//!
//! let result = requires_event(event);
//! // requires_event(person); // This would not compile!
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse
    pub id_type: &'static str,
    /// The underlying UUID parse error message
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Identifier of an organization running events on the platform.
    TenantId
);

define_id!(
    /// Identifier of an event that collects accreditation requests.
    EventId
);

define_id!(
    /// Identifier of a deduplicated Person identity record.
    ///
    /// Persons are shared across tenants; the key that makes them unique is
    /// the document identity, not this id.
    PersonId
);

define_id!(
    /// Identifier of one accreditation record (one person, one event).
    AccreditationId
);

define_id!(
    /// Identifier of an authenticated account.
    UserId
);

define_id!(
    /// Identifier of a submitter profile, used for batch attribution.
    ProfileId
);
