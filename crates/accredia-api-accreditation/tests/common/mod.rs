//! Test helpers for accredia-api-accreditation.
//!
//! Provides an in-memory backend with a seeded event, candidate builders,
//! and a fault-injecting store wrapper for infrastructure failure paths.

#![allow(dead_code)]

use accredia_api_accreditation::collaborators::{EventConfig, ZoneMatchField, ZoneRule};
use accredia_api_accreditation::models::BatchCandidate;
use accredia_api_accreditation::services::{AccreditationEngine, Collaborators, EngineConfig};
use accredia_api_accreditation::store::{
    AccreditationStore, CommitFailure, CommitRequest, CommitRowResult, InMemoryAccreditationStore,
    InsertedPerson, NewPerson, PersonRecord, PersonUpdate, QuotaUsage, StoreError,
};
use accredia_core::{
    AccreditationId, DocumentKey, EventId, PersonId, QuotaLimit, TenantId, UserId,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// An event with a Photographer quota (2 per organization, 3 overall) and
/// two zone rules.
pub fn test_event() -> EventConfig {
    let mut event = EventConfig::new(EventId::new(), TenantId::new(), "Cup Final");
    event.quota_rules.push(QuotaLimit {
        media_type: "Photographer".to_string(),
        max_per_organization: 2,
        max_global: 3,
    });
    event.zone_rules = vec![
        ZoneRule {
            match_field: ZoneMatchField::MediaType,
            match_value: "Photographer".to_string(),
            zone: "Pitch".to_string(),
            position: 0,
        },
        ZoneRule {
            match_field: ZoneMatchField::Role,
            match_value: "Editor".to_string(),
            zone: "Press Box".to_string(),
            position: 0,
        },
    ];
    event.form_fields = vec!["shirt_size".to_string()];
    event
}

/// In-memory backend plus an engine wired to it.
pub struct TestContext {
    pub store: Arc<InMemoryAccreditationStore>,
    pub engine: AccreditationEngine,
    pub event: EventConfig,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_event(test_event()).await
    }

    pub async fn with_event(event: EventConfig) -> Self {
        init_test_logging();
        let store = Arc::new(InMemoryAccreditationStore::new());
        store.add_event(event.clone()).await;
        let engine = AccreditationEngine::with_backend(store.clone(), EngineConfig::default());
        Self {
            store,
            engine,
            event,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event.id
    }

    /// An engine whose storage seam goes through `faulty`, with collaborators
    /// still served by the in-memory backend.
    pub fn engine_over(&self, faulty: Arc<FaultyStore>, config: EngineConfig) -> AccreditationEngine {
        let collaborators = Collaborators {
            events: self.store.clone(),
            submitters: self.store.clone(),
            profile_data: self.store.clone(),
            audit: self.store.clone(),
        };
        AccreditationEngine::new(faulty, collaborators, config)
    }
}

/// A valid candidate with a national id.
pub fn candidate(document_number: &str, first: &str, last: &str) -> BatchCandidate {
    BatchCandidate {
        document_type: Some("national_id".to_string()),
        document_number: Some(document_number.to_string()),
        first_name: Some(first.to_string()),
        last_name: Some(last.to_string()),
        organization: Some("AcmeNews".to_string()),
        media_type: Some("Writer".to_string()),
        role: Some("Reporter".to_string()),
        ..Default::default()
    }
}

pub fn photographer(document_number: &str, organization: &str) -> BatchCandidate {
    BatchCandidate {
        organization: Some(organization.to_string()),
        media_type: Some("Photographer".to_string()),
        ..candidate(document_number, "Pat", "Lens")
    }
}

pub fn with_email(mut candidate: BatchCandidate, email: &str) -> BatchCandidate {
    candidate.email = Some(email.to_string());
    candidate
}

pub fn national_key(number: &str) -> DocumentKey {
    DocumentKey::new(accredia_core::DocumentType::NationalId, number)
}

/// Which store operation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// `insert_persons` fails from its n-th call (0-based) on.
    InsertPersonsFrom(usize),
    /// `accredited_persons` fails.
    AccreditedLookup,
    /// `commit` fails without writing anything.
    Commit,
    /// `commit` writes the first row and reports the rest as duplicates.
    PartialCommit,
    /// `commit` writes every row but returns one result too many.
    MisalignedCommit,
    /// `person_linked_to_account` reports no link, as a request racing a
    /// concurrent link would see it.
    StaleAccountLookup,
}

/// Delegates to an in-memory store, injecting one configured fault.
pub struct FaultyStore {
    pub inner: Arc<InMemoryAccreditationStore>,
    fault: Fault,
    insert_calls: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryAccreditationStore>, fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fault,
            insert_calls: AtomicUsize::new(0),
        })
    }

    fn outage(operation: &str) -> StoreError {
        StoreError::Unavailable(format!("injected failure in {operation}"))
    }
}

#[async_trait]
impl AccreditationStore for FaultyStore {
    async fn find_persons_by_documents(
        &self,
        keys: &[DocumentKey],
    ) -> Result<Vec<PersonRecord>, StoreError> {
        self.inner.find_persons_by_documents(keys).await
    }

    async fn insert_persons(&self, people: &[NewPerson]) -> Result<Vec<InsertedPerson>, StoreError> {
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Fault::InsertPersonsFrom(n) = self.fault {
            if call >= n {
                return Err(Self::outage("insert_persons"));
            }
        }
        self.inner.insert_persons(people).await
    }

    async fn update_person(&self, id: PersonId, update: &PersonUpdate) -> Result<(), StoreError> {
        self.inner.update_person(id, update).await
    }

    async fn person_linked_to_account(
        &self,
        user_id: UserId,
    ) -> Result<Option<PersonId>, StoreError> {
        if self.fault == Fault::StaleAccountLookup {
            return Ok(None);
        }
        self.inner.person_linked_to_account(user_id).await
    }

    async fn accredited_persons(
        &self,
        event_id: EventId,
        person_ids: &[PersonId],
    ) -> Result<HashSet<PersonId>, StoreError> {
        if self.fault == Fault::AccreditedLookup {
            return Err(Self::outage("accredited_persons"));
        }
        self.inner.accredited_persons(event_id, person_ids).await
    }

    async fn registered_emails(
        &self,
        event_id: EventId,
        emails: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        self.inner.registered_emails(event_id, emails).await
    }

    async fn quota_usage(&self, event_id: EventId) -> Result<Vec<QuotaUsage>, StoreError> {
        self.inner.quota_usage(event_id).await
    }

    async fn commit(&self, request: &CommitRequest) -> Result<Vec<CommitRowResult>, StoreError> {
        match self.fault {
            Fault::Commit => Err(Self::outage("commit")),
            Fault::PartialCommit => {
                let first = CommitRequest {
                    rows: request.rows.iter().take(1).cloned().collect(),
                    ..request.clone()
                };
                let mut results = self.inner.commit(&first).await?;
                results.extend(request.rows.iter().skip(1).map(|_| CommitRowResult::Failure {
                    reason: CommitFailure::DuplicateInEvent,
                }));
                Ok(results)
            }
            Fault::MisalignedCommit => {
                let mut results = self.inner.commit(request).await?;
                results.push(CommitRowResult::Failure {
                    reason: CommitFailure::Aborted,
                });
                Ok(results)
            }
            _ => self.inner.commit(request).await,
        }
    }

    async fn delete_accreditations(
        &self,
        event_id: EventId,
        ids: &[AccreditationId],
    ) -> Result<u64, StoreError> {
        self.inner.delete_accreditations(event_id, ids).await
    }

    async fn referenced_persons(&self, ids: &[PersonId]) -> Result<HashSet<PersonId>, StoreError> {
        self.inner.referenced_persons(ids).await
    }

    async fn delete_persons(&self, ids: &[PersonId]) -> Result<u64, StoreError> {
        self.inner.delete_persons(ids).await
    }
}
