//! In-memory backend for tests and local tooling.
//!
//! Implements the store and every collaborator trait with the same
//! semantics as the PostgreSQL backend. The whole state sits behind one
//! `RwLock`, so `commit` is serialized exactly like the locking transaction.

use accredia_core::{
    normalize_label, AccreditationId, AttributeBag, DocumentKey, EventId, PersonId, ProfileId,
    QuotaLedger, TenantId, UserId,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

use super::{
    AccreditationStore, CommitFailure, CommitRequest, CommitRowResult, InsertedPerson, NewPerson,
    PersonRecord, PersonUpdate, QuotaUsage, StoreError,
};
use crate::collaborators::{
    AuditSink, EventConfig, EventDirectory, ProfileDataSink, SubmitterDirectory, SubmitterProfile,
};

/// Review status of an accreditation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccreditationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    UnderReview,
}

/// A committed accreditation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAccreditation {
    pub id: AccreditationId,
    pub event_id: EventId,
    pub person_id: PersonId,
    pub organization: String,
    pub media_type: String,
    pub role: String,
    pub contact_email: Option<String>,
    pub zone: Option<String>,
    pub extra: AttributeBag,
    pub status: AccreditationStatus,
    pub submitted_by: Option<ProfileId>,
}

/// A recorded audit action.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub actor_id: Option<UserId>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
}

#[derive(Default)]
struct MemoryState {
    events: HashMap<EventId, EventConfig>,
    persons: HashMap<PersonId, PersonRecord>,
    by_document: HashMap<DocumentKey, PersonId>,
    tenant_data: HashMap<(PersonId, TenantId), BTreeMap<String, String>>,
    accreditations: BTreeMap<AccreditationId, StoredAccreditation>,
    profiles: HashMap<UserId, SubmitterProfile>,
    super_admins: HashSet<UserId>,
    audit: Vec<AuditEntry>,
}

impl MemoryState {
    fn account_owner(&self, user_id: UserId) -> Option<PersonId> {
        self.persons
            .values()
            .find(|p| p.user_id == Some(user_id))
            .map(|p| p.id)
    }

    fn is_referenced(&self, person_id: PersonId) -> bool {
        self.accreditations
            .values()
            .any(|a| a.person_id == person_id)
    }

    fn is_accredited(&self, event_id: EventId, person_id: PersonId) -> bool {
        self.accreditations
            .values()
            .any(|a| a.event_id == event_id && a.person_id == person_id)
    }

    fn quota_ledger(&self, event_id: EventId) -> QuotaLedger {
        let limits = self
            .events
            .get(&event_id)
            .map(|e| e.quota_rules.clone())
            .unwrap_or_default();
        let mut ledger = QuotaLedger::new(limits);
        for a in self.accreditations.values() {
            if a.event_id == event_id && a.status != AccreditationStatus::Rejected {
                ledger.record(&a.media_type, &a.organization, 1);
            }
        }
        ledger
    }
}

/// In-memory implementation of the store and all collaborators.
#[derive(Default)]
pub struct InMemoryAccreditationStore {
    state: RwLock<MemoryState>,
}

impl InMemoryAccreditationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an event.
    pub async fn add_event(&self, event: EventConfig) {
        self.state.write().await.events.insert(event.id, event);
    }

    /// Register a submitter profile.
    pub async fn add_submitter(&self, profile: SubmitterProfile, is_super_admin: bool) {
        let mut state = self.state.write().await;
        if is_super_admin {
            state.super_admins.insert(profile.user_id);
        }
        state.profiles.insert(profile.user_id, profile);
    }

    /// Mark a user as super-admin without a profile.
    pub async fn add_super_admin(&self, user_id: UserId) {
        self.state.write().await.super_admins.insert(user_id);
    }

    pub async fn persons(&self) -> Vec<PersonRecord> {
        self.state.read().await.persons.values().cloned().collect()
    }

    pub async fn person_by_document(&self, key: &DocumentKey) -> Option<PersonRecord> {
        let state = self.state.read().await;
        state
            .by_document
            .get(key)
            .and_then(|id| state.persons.get(id))
            .cloned()
    }

    pub async fn accreditations(&self, event_id: EventId) -> Vec<StoredAccreditation> {
        self.state
            .read()
            .await
            .accreditations
            .values()
            .filter(|a| a.event_id == event_id)
            .cloned()
            .collect()
    }

    /// Change the review status of an accreditation. Returns false when unknown.
    pub async fn set_status(&self, id: AccreditationId, status: AccreditationStatus) -> bool {
        match self.state.write().await.accreditations.get_mut(&id) {
            Some(a) => {
                a.status = status;
                true
            }
            None => false,
        }
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.read().await.audit.clone()
    }

    /// Reusable profile data of a Person for one tenant.
    pub async fn tenant_data(&self, person_id: PersonId, tenant_id: TenantId) -> AttributeBag {
        self.state
            .read()
            .await
            .tenant_data
            .get(&(person_id, tenant_id))
            .cloned()
            .map(AttributeBag::from)
            .unwrap_or_default()
    }
}

#[async_trait]
impl AccreditationStore for InMemoryAccreditationStore {
    async fn find_persons_by_documents(
        &self,
        keys: &[DocumentKey],
    ) -> Result<Vec<PersonRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| state.by_document.get(k))
            .filter_map(|id| state.persons.get(id))
            .cloned()
            .collect())
    }

    async fn insert_persons(&self, people: &[NewPerson]) -> Result<Vec<InsertedPerson>, StoreError> {
        let mut state = self.state.write().await;

        for new in people {
            if let Some(user_id) = new.user_id {
                if state.account_owner(user_id).is_some() {
                    return Err(StoreError::AccountAlreadyLinked(user_id));
                }
            }
        }

        let mut inserted = Vec::with_capacity(people.len());
        for new in people {
            if let Some(existing) = state
                .by_document
                .get(&new.key)
                .and_then(|id| state.persons.get(id))
            {
                inserted.push(InsertedPerson {
                    person: existing.clone(),
                    created: false,
                });
                continue;
            }

            let person = PersonRecord {
                id: PersonId::new(),
                key: new.key.clone(),
                first_name: new.first_name.clone(),
                last_name: new.last_name.clone(),
                email: new.email.clone(),
                phone: new.phone.clone(),
                role_title: new.role_title.clone(),
                organization: new.organization.clone(),
                media_type: new.media_type.clone(),
                nationality: new.nationality,
                user_id: new.user_id,
            };
            state.by_document.insert(person.key.clone(), person.id);
            state.persons.insert(person.id, person.clone());
            inserted.push(InsertedPerson {
                person,
                created: true,
            });
        }
        Ok(inserted)
    }

    async fn update_person(&self, id: PersonId, update: &PersonUpdate) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        if let Some(user_id) = update.user_id {
            if state.account_owner(user_id).is_some_and(|owner| owner != id) {
                return Err(StoreError::AccountAlreadyLinked(user_id));
            }
        }

        let Some(person) = state.persons.get_mut(&id) else {
            return Ok(());
        };
        let fields = [
            (&mut person.first_name, &update.first_name),
            (&mut person.last_name, &update.last_name),
            (&mut person.email, &update.email),
            (&mut person.phone, &update.phone),
            (&mut person.role_title, &update.role_title),
            (&mut person.organization, &update.organization),
            (&mut person.media_type, &update.media_type),
        ];
        for (stored, incoming) in fields {
            if let Some(value) = incoming {
                *stored = Some(value.clone());
            }
        }
        if update.nationality.is_some() {
            person.nationality = update.nationality;
        }
        if person.user_id.is_none() {
            person.user_id = update.user_id;
        }
        Ok(())
    }

    async fn person_linked_to_account(
        &self,
        user_id: UserId,
    ) -> Result<Option<PersonId>, StoreError> {
        Ok(self.state.read().await.account_owner(user_id))
    }

    async fn accredited_persons(
        &self,
        event_id: EventId,
        person_ids: &[PersonId],
    ) -> Result<HashSet<PersonId>, StoreError> {
        let state = self.state.read().await;
        Ok(person_ids
            .iter()
            .copied()
            .filter(|id| state.is_accredited(event_id, *id))
            .collect())
    }

    async fn registered_emails(
        &self,
        event_id: EventId,
        emails: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        let wanted: HashSet<String> = emails.iter().map(|e| e.to_lowercase()).collect();
        let state = self.state.read().await;
        Ok(state
            .accreditations
            .values()
            .filter(|a| a.event_id == event_id)
            .filter_map(|a| a.contact_email.as_deref().map(str::to_lowercase))
            .filter(|e| wanted.contains(e))
            .collect())
    }

    async fn quota_usage(&self, event_id: EventId) -> Result<Vec<QuotaUsage>, StoreError> {
        let state = self.state.read().await;
        let mut usage: BTreeMap<(String, String), u32> = BTreeMap::new();
        for a in state.accreditations.values() {
            if a.event_id == event_id && a.status != AccreditationStatus::Rejected {
                *usage
                    .entry((normalize_label(&a.media_type), normalize_label(&a.organization)))
                    .or_default() += 1;
            }
        }
        Ok(usage
            .into_iter()
            .map(|((media_type, organization), used)| QuotaUsage {
                media_type,
                organization,
                used,
            })
            .collect())
    }

    async fn commit(&self, request: &CommitRequest) -> Result<Vec<CommitRowResult>, StoreError> {
        let mut state = self.state.write().await;
        let mut ledger = state.quota_ledger(request.event_id);
        let mut batch_persons: HashSet<PersonId> = HashSet::new();

        let mut staged = Vec::with_capacity(request.rows.len());
        let mut results = Vec::with_capacity(request.rows.len());
        for row in &request.rows {
            if state.is_accredited(request.event_id, row.person_id)
                || !batch_persons.insert(row.person_id)
            {
                results.push(CommitRowResult::Failure {
                    reason: CommitFailure::DuplicateInEvent,
                });
                continue;
            }

            let check = ledger.admit(&row.media_type, &row.organization);
            if let (Some(scope), Some(limit)) = (check.exceeded, check.exceeded_limit()) {
                results.push(CommitRowResult::Failure {
                    reason: CommitFailure::QuotaExceeded { scope, limit },
                });
                continue;
            }

            let record = StoredAccreditation {
                id: AccreditationId::new(),
                event_id: request.event_id,
                person_id: row.person_id,
                organization: row.organization.clone(),
                media_type: row.media_type.clone(),
                role: row.role.clone(),
                contact_email: row.contact_email.clone(),
                zone: row.zone.clone(),
                extra: row.extra.clone(),
                status: AccreditationStatus::Pending,
                submitted_by: request.submitted_by,
            };
            results.push(CommitRowResult::Success {
                record_id: record.id,
            });
            staged.push(record);
        }

        if results.iter().all(CommitRowResult::is_success) {
            for record in staged {
                state.accreditations.insert(record.id, record);
            }
        } else {
            for result in &mut results {
                if result.is_success() {
                    *result = CommitRowResult::Failure {
                        reason: CommitFailure::Aborted,
                    };
                }
            }
        }
        Ok(results)
    }

    async fn delete_accreditations(
        &self,
        event_id: EventId,
        ids: &[AccreditationId],
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut deleted = 0;
        for id in ids {
            if state
                .accreditations
                .get(id)
                .is_some_and(|a| a.event_id == event_id)
            {
                state.accreditations.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn referenced_persons(&self, ids: &[PersonId]) -> Result<HashSet<PersonId>, StoreError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| state.is_referenced(*id))
            .collect())
    }

    async fn delete_persons(&self, ids: &[PersonId]) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut deleted = 0;
        for id in ids {
            if state.is_referenced(*id) {
                continue;
            }
            if let Some(person) = state.persons.remove(id) {
                state.by_document.remove(&person.key);
                state.tenant_data.retain(|(p, _), _| p != id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl EventDirectory for InMemoryAccreditationStore {
    async fn get_event(&self, event_id: EventId) -> Result<Option<EventConfig>, StoreError> {
        Ok(self.state.read().await.events.get(&event_id).cloned())
    }
}

#[async_trait]
impl SubmitterDirectory for InMemoryAccreditationStore {
    async fn is_super_admin(&self, user_id: UserId) -> Result<bool, StoreError> {
        Ok(self.state.read().await.super_admins.contains(&user_id))
    }

    async fn profile_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<SubmitterProfile>, StoreError> {
        Ok(self.state.read().await.profiles.get(&user_id).cloned())
    }
}

#[async_trait]
impl ProfileDataSink for InMemoryAccreditationStore {
    async fn save_tenant_profile_data(
        &self,
        person_id: PersonId,
        tenant_id: TenantId,
        data: &AttributeBag,
        form_keys: &[String],
    ) -> Result<(), StoreError> {
        let filtered = data.form_data_for_keys(form_keys);
        if filtered.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        if !state.persons.contains_key(&person_id) {
            return Ok(());
        }
        let entry = state.tenant_data.entry((person_id, tenant_id)).or_default();
        for (key, value) in filtered.iter() {
            entry.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for InMemoryAccreditationStore {
    async fn log_action(
        &self,
        actor_id: Option<UserId>,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.state.write().await.audit.push(AuditEntry {
            actor_id,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            payload,
        });
        Ok(())
    }
}
