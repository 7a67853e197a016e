//! Database entity models for accredia-db.
//!
//! These models represent the database tables and provide
//! type-safe interactions with PostgreSQL.

pub mod accreditation;
pub mod accreditation_event;
pub mod audit_log;
pub mod person;
pub mod quota_rule;
pub mod submitter_profile;
pub mod zone_rule;

pub use accreditation::{Accreditation, BatchInsertStatus, CreateAccreditation, QuotaUsageRow};
pub use accreditation_event::{AccreditationEvent, CreateAccreditationEvent};
pub use audit_log::{AuditLog, CreateAuditLog};
pub use person::{
    is_account_link_conflict, CreatePerson, Person, PersonPatch, UpsertedPerson,
    ACCOUNT_LINK_CONSTRAINT,
};
pub use quota_rule::QuotaRule;
pub use submitter_profile::SubmitterProfile;
pub use zone_rule::ZoneRule;
