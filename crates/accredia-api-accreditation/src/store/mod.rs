//! Storage seam of the commit engine.
//!
//! The engine never talks to a database client directly. Everything it reads
//! or writes goes through [`AccreditationStore`], injected at construction
//! time as `Arc<dyn AccreditationStore>`.

mod memory;
mod postgres;

pub use memory::{AccreditationStatus, AuditEntry, InMemoryAccreditationStore, StoredAccreditation};
pub use postgres::PgAccreditationStore;

use accredia_core::{
    AccreditationId, AttributeBag, DocumentKey, EventId, Nationality, PersonId, ProfileId,
    QuotaScope, UserId,
};
use accredia_db::DbError;
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

/// Storage failures. Always infrastructure, never row-level business outcomes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The account is already linked to another Person.
    #[error("Account {0} is already linked to a person")]
    AccountAlreadyLinked(UserId),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(DbError::from(err))
    }
}

/// A stored Person identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRecord {
    pub id: PersonId,
    pub key: DocumentKey,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub media_type: Option<String>,
    pub nationality: Option<Nationality>,
    pub user_id: Option<UserId>,
}

/// A Person to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPerson {
    pub key: DocumentKey,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub media_type: Option<String>,
    pub nationality: Option<Nationality>,
    pub user_id: Option<UserId>,
}

/// Result of [`AccreditationStore::insert_persons`].
#[derive(Debug, Clone)]
pub struct InsertedPerson {
    pub person: PersonRecord,
    /// False when the document already existed (for example created by a
    /// concurrent request between lookup and insert).
    pub created: bool,
}

/// Non-destructive merge. `None` keeps the stored value; `user_id` only
/// fills an empty account link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub media_type: Option<String>,
    pub nationality: Option<Nationality>,
    pub user_id: Option<UserId>,
}

impl PersonUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Committed usage of one (media type, organization) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaUsage {
    pub media_type: String,
    pub organization: String,
    pub used: u32,
}

/// One row handed to the atomic commit.
#[derive(Debug, Clone)]
pub struct CommitRow {
    pub person_id: PersonId,
    pub organization: String,
    pub media_type: String,
    pub role: String,
    pub contact_email: Option<String>,
    pub zone: Option<String>,
    pub extra: AttributeBag,
}

/// A whole batch handed to the atomic commit.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub event_id: EventId,
    pub rows: Vec<CommitRow>,
    pub submitted_by: Option<ProfileId>,
}

/// Why the storage layer refused a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFailure {
    DuplicateInEvent,
    QuotaExceeded { scope: QuotaScope, limit: u32 },
    /// Valid on its own, rolled back with the rest of the batch.
    Aborted,
}

/// Per-row commit outcome, positionally aligned with [`CommitRequest::rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitRowResult {
    Success { record_id: AccreditationId },
    Failure { reason: CommitFailure },
}

impl CommitRowResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, CommitRowResult::Success { .. })
    }

    #[must_use]
    pub fn record_id(&self) -> Option<AccreditationId> {
        match self {
            CommitRowResult::Success { record_id } => Some(*record_id),
            CommitRowResult::Failure { .. } => None,
        }
    }
}

/// Persistence operations used by the commit engine.
#[async_trait]
pub trait AccreditationStore: Send + Sync {
    /// Batched lookup by normalized document.
    async fn find_persons_by_documents(
        &self,
        keys: &[DocumentKey],
    ) -> Result<Vec<PersonRecord>, StoreError>;

    /// Batched insert. Documents that already exist are returned with
    /// `created = false` instead of failing. Output order is unspecified.
    ///
    /// Fails with [`StoreError::AccountAlreadyLinked`], writing nothing, when
    /// a requested account link is held by another Person.
    async fn insert_persons(&self, people: &[NewPerson]) -> Result<Vec<InsertedPerson>, StoreError>;

    async fn update_person(&self, id: PersonId, update: &PersonUpdate) -> Result<(), StoreError>;

    /// The Person an authenticated account is linked to, if any.
    async fn person_linked_to_account(
        &self,
        user_id: UserId,
    ) -> Result<Option<PersonId>, StoreError>;

    /// Which of `person_ids` already hold an accreditation for the event.
    async fn accredited_persons(
        &self,
        event_id: EventId,
        person_ids: &[PersonId],
    ) -> Result<HashSet<PersonId>, StoreError>;

    /// Which of the lowercased `emails` are already used in the event.
    async fn registered_emails(
        &self,
        event_id: EventId,
        emails: &[String],
    ) -> Result<HashSet<String>, StoreError>;

    /// Committed usage per (media type, organization), rejected records excluded.
    async fn quota_usage(&self, event_id: EventId) -> Result<Vec<QuotaUsage>, StoreError>;

    /// Commit a whole batch atomically.
    ///
    /// Quotas and per-event uniqueness are re-checked under a lock covering
    /// the touched quota rules. Row-level refusals are reported in the
    /// result vector; `Err` is reserved for infrastructure failures.
    async fn commit(&self, request: &CommitRequest) -> Result<Vec<CommitRowResult>, StoreError>;

    /// Delete accreditations by id, restricted to `event_id`.
    async fn delete_accreditations(
        &self,
        event_id: EventId,
        ids: &[AccreditationId],
    ) -> Result<u64, StoreError>;

    /// Which of `ids` are referenced by an accreditation in any event.
    async fn referenced_persons(&self, ids: &[PersonId]) -> Result<HashSet<PersonId>, StoreError>;

    /// Delete Persons, skipping any that are referenced by an accreditation.
    async fn delete_persons(&self, ids: &[PersonId]) -> Result<u64, StoreError>;
}
