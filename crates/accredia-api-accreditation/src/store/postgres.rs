//! PostgreSQL backend built on the `accredia-db` models.

use accredia_core::{
    AccreditationId, AttributeBag, DocumentKey, DocumentType, EventId, Nationality, PersonId,
    ProfileId, TenantId, UserId,
};
use accredia_db::models::{
    is_account_link_conflict, Accreditation, AccreditationEvent, AuditLog, BatchInsertStatus,
    CreateAccreditation, CreateAuditLog, CreatePerson, Person, PersonPatch, QuotaRule,
    SubmitterProfile as SubmitterProfileRow, ZoneRule as ZoneRuleRow,
};
use accredia_db::DbError;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use super::{
    AccreditationStore, CommitFailure, CommitRequest, CommitRowResult, InsertedPerson, NewPerson,
    PersonRecord, PersonUpdate, QuotaUsage, StoreError,
};
use crate::collaborators::{
    AuditSink, EventConfig, EventDirectory, ProfileDataSink, SubmitterDirectory, SubmitterProfile,
    ZoneRule,
};

/// Store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgAccreditationStore {
    pool: PgPool,
}

impl PgAccreditationStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn invalid(message: String) -> StoreError {
    StoreError::Database(DbError::InvalidValue(message))
}

/// Map a violation of the account-link index onto its own error.
fn account_conflict(err: sqlx::Error, user_id: Option<UserId>) -> StoreError {
    match user_id {
        Some(user_id) if is_account_link_conflict(&err) => {
            StoreError::AccountAlreadyLinked(user_id)
        }
        _ => err.into(),
    }
}

fn person_record(row: Person) -> Result<PersonRecord, StoreError> {
    let document_type: DocumentType = row
        .document_type
        .parse()
        .map_err(|e| invalid(format!("person {}: {e}", row.id)))?;
    let nationality = row
        .nationality
        .as_deref()
        .map(str::parse::<Nationality>)
        .transpose()
        .map_err(|e| invalid(format!("person {}: {e}", row.id)))?;

    Ok(PersonRecord {
        id: PersonId::from_uuid(row.id),
        key: DocumentKey::new(document_type, &row.document_number),
        first_name: row.first_name,
        last_name: row.last_name,
        email: row.email,
        phone: row.phone,
        role_title: row.role_title,
        organization: row.organization,
        media_type: row.media_type,
        nationality,
        user_id: row.user_id.map(UserId::from_uuid),
    })
}

fn create_person(new: &NewPerson) -> CreatePerson {
    CreatePerson {
        document_type: new.key.document_type.as_str().to_string(),
        document_number: new.key.number.clone(),
        first_name: new.first_name.clone(),
        last_name: new.last_name.clone(),
        email: new.email.clone(),
        phone: new.phone.clone(),
        role_title: new.role_title.clone(),
        organization: new.organization.clone(),
        media_type: new.media_type.clone(),
        nationality: new.nationality.map(|n| n.as_str().to_string()),
        user_id: new.user_id.map(Uuid::from),
    }
}

fn person_patch(update: &PersonUpdate) -> PersonPatch {
    PersonPatch {
        first_name: update.first_name.clone(),
        last_name: update.last_name.clone(),
        email: update.email.clone(),
        phone: update.phone.clone(),
        role_title: update.role_title.clone(),
        organization: update.organization.clone(),
        media_type: update.media_type.clone(),
        nationality: update.nationality.map(|n| n.as_str().to_string()),
        user_id: update.user_id.map(Uuid::from),
    }
}

fn zone_rule(row: ZoneRuleRow) -> Result<ZoneRule, StoreError> {
    Ok(ZoneRule {
        match_field: row
            .match_field
            .parse()
            .map_err(|e| invalid(format!("zone rule {}: {e}", row.id)))?,
        match_value: row.match_value,
        zone: row.zone,
        position: row.position,
    })
}

fn commit_result(status: BatchInsertStatus) -> CommitRowResult {
    match status {
        BatchInsertStatus::Inserted(id) => CommitRowResult::Success {
            record_id: AccreditationId::from_uuid(id),
        },
        BatchInsertStatus::DuplicateInEvent => CommitRowResult::Failure {
            reason: CommitFailure::DuplicateInEvent,
        },
        BatchInsertStatus::QuotaExceeded { scope, limit } => CommitRowResult::Failure {
            reason: CommitFailure::QuotaExceeded { scope, limit },
        },
        BatchInsertStatus::Aborted => CommitRowResult::Failure {
            reason: CommitFailure::Aborted,
        },
    }
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

#[async_trait]
impl AccreditationStore for PgAccreditationStore {
    async fn find_persons_by_documents(
        &self,
        keys: &[DocumentKey],
    ) -> Result<Vec<PersonRecord>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let types: Vec<String> = keys
            .iter()
            .map(|k| k.document_type.as_str().to_string())
            .collect();
        let numbers: Vec<String> = keys.iter().map(|k| k.number.clone()).collect();

        Person::find_by_documents(&self.pool, &types, &numbers)
            .await?
            .into_iter()
            .map(person_record)
            .collect()
    }

    async fn insert_persons(&self, people: &[NewPerson]) -> Result<Vec<InsertedPerson>, StoreError> {
        let rows: Vec<CreatePerson> = people.iter().map(create_person).collect();
        let linked = people.iter().find_map(|p| p.user_id);
        Person::insert_or_fetch_many(&self.pool, &rows)
            .await
            .map_err(|e| account_conflict(e, linked))?
            .into_iter()
            .map(|upserted| -> Result<InsertedPerson, StoreError> {
                Ok(InsertedPerson {
                    created: upserted.inserted,
                    person: person_record(upserted.person)?,
                })
            })
            .collect()
    }

    async fn update_person(&self, id: PersonId, update: &PersonUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }
        Person::apply_patch(&self.pool, id.into(), &person_patch(update))
            .await
            .map_err(|e| account_conflict(e, update.user_id))?;
        Ok(())
    }

    async fn person_linked_to_account(
        &self,
        user_id: UserId,
    ) -> Result<Option<PersonId>, StoreError> {
        Ok(Person::find_by_user_id(&self.pool, user_id.into())
            .await?
            .map(|p| PersonId::from_uuid(p.id)))
    }

    async fn accredited_persons(
        &self,
        event_id: EventId,
        person_ids: &[PersonId],
    ) -> Result<HashSet<PersonId>, StoreError> {
        if person_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let ids =
            Accreditation::accredited_person_ids(&self.pool, event_id.into(), &uuids(person_ids))
                .await?;
        Ok(ids.into_iter().map(PersonId::from_uuid).collect())
    }

    async fn registered_emails(
        &self,
        event_id: EventId,
        emails: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        if emails.is_empty() {
            return Ok(HashSet::new());
        }
        let lowered: Vec<String> = emails.iter().map(|e| e.to_lowercase()).collect();
        let found = Accreditation::registered_emails(&self.pool, event_id.into(), &lowered).await?;
        Ok(found.into_iter().collect())
    }

    async fn quota_usage(&self, event_id: EventId) -> Result<Vec<QuotaUsage>, StoreError> {
        Accreditation::quota_usage(&self.pool, event_id.into())
            .await?
            .into_iter()
            .map(|row| -> Result<QuotaUsage, StoreError> {
                let used = u32::try_from(row.used)
                    .map_err(|_| invalid(format!("quota usage count {}", row.used)))?;
                Ok(QuotaUsage {
                    media_type: row.media_type,
                    organization: row.organization,
                    used,
                })
            })
            .collect()
    }

    async fn commit(&self, request: &CommitRequest) -> Result<Vec<CommitRowResult>, StoreError> {
        let rows: Vec<CreateAccreditation> = request
            .rows
            .iter()
            .map(|row| -> Result<CreateAccreditation, StoreError> {
                Ok(CreateAccreditation {
                    person_id: row.person_id.into(),
                    organization: row.organization.clone(),
                    media_type: row.media_type.clone(),
                    role: row.role.clone(),
                    contact_email: row.contact_email.clone(),
                    zone: row.zone.clone(),
                    extra: serde_json::to_value(&row.extra)
                        .map_err(|e| invalid(format!("extra attributes: {e}")))?,
                })
            })
            .collect::<Result<_, _>>()?;

        let statuses = Accreditation::commit_batch(
            &self.pool,
            request.event_id.into(),
            &rows,
            request.submitted_by.map(Uuid::from),
        )
        .await?;
        Ok(statuses.into_iter().map(commit_result).collect())
    }

    async fn delete_accreditations(
        &self,
        event_id: EventId,
        ids: &[AccreditationId],
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(Accreditation::delete_in_event(&self.pool, event_id.into(), &uuids(ids)).await?)
    }

    async fn referenced_persons(&self, ids: &[PersonId]) -> Result<HashSet<PersonId>, StoreError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let referenced = Person::referenced_ids(&self.pool, &uuids(ids)).await?;
        Ok(referenced.into_iter().map(PersonId::from_uuid).collect())
    }

    async fn delete_persons(&self, ids: &[PersonId]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(Person::delete_unreferenced(&self.pool, &uuids(ids)).await?)
    }
}

#[async_trait]
impl EventDirectory for PgAccreditationStore {
    async fn get_event(&self, event_id: EventId) -> Result<Option<EventConfig>, StoreError> {
        let Some(event) = AccreditationEvent::find_by_id(&self.pool, event_id.into()).await? else {
            return Ok(None);
        };
        let (quota_rules, zone_rules) = futures::try_join!(
            QuotaRule::list_by_event(&self.pool, event.id),
            ZoneRuleRow::list_by_event(&self.pool, event.id),
        )?;

        Ok(Some(EventConfig {
            id: EventId::from_uuid(event.id),
            tenant_id: TenantId::from_uuid(event.tenant_id),
            name: event.name,
            quota_rules: quota_rules.iter().map(QuotaRule::to_limit).collect(),
            zone_rules: zone_rules
                .into_iter()
                .map(zone_rule)
                .collect::<Result<_, _>>()?,
            form_fields: event.form_fields,
            deadline: event.deadline,
            accreditation_open: event.accreditation_open,
        }))
    }
}

#[async_trait]
impl SubmitterDirectory for PgAccreditationStore {
    async fn is_super_admin(&self, user_id: UserId) -> Result<bool, StoreError> {
        Ok(SubmitterProfileRow::find_by_user_id(&self.pool, user_id.into())
            .await?
            .is_some_and(|p| p.is_super_admin))
    }

    async fn profile_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<SubmitterProfile>, StoreError> {
        Ok(SubmitterProfileRow::find_by_user_id(&self.pool, user_id.into())
            .await?
            .map(|p| SubmitterProfile {
                id: ProfileId::from_uuid(p.id),
                user_id: UserId::from_uuid(p.user_id),
                tenant_id: p.tenant_id.map(TenantId::from_uuid),
                display_name: p.display_name,
            }))
    }
}

#[async_trait]
impl ProfileDataSink for PgAccreditationStore {
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
        let value = serde_json::to_value(&filtered)
            .map_err(|e| invalid(format!("profile data: {e}")))?;
        Person::merge_tenant_data(&self.pool, person_id.into(), tenant_id.into(), &value).await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for PgAccreditationStore {
    async fn log_action(
        &self,
        actor_id: Option<UserId>,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        AuditLog::create(
            &self.pool,
            &CreateAuditLog {
                actor_id: actor_id.map(Uuid::from),
                action: action.to_string(),
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
                payload,
            },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn person_row(document_type: &str, nationality: Option<&str>) -> Person {
        Person {
            id: Uuid::new_v4(),
            document_type: document_type.to_string(),
            document_number: "12345678".to_string(),
            first_name: Some("Ada".to_string()),
            last_name: None,
            email: None,
            phone: None,
            role_title: None,
            organization: None,
            media_type: None,
            nationality: nationality.map(str::to_string),
            tenant_data: serde_json::json!({}),
            user_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_person_record_maps_stored_values() {
        let record = person_record(person_row("foreign_id", Some("foreign"))).unwrap();
        assert_eq!(record.key.document_type, DocumentType::ForeignId);
        assert_eq!(record.nationality, Some(Nationality::Foreign));
    }

    #[test]
    fn test_person_record_rejects_unknown_document_type() {
        let err = person_record(person_row("library_card", None)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Database(DbError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_commit_result_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(
            commit_result(BatchInsertStatus::Inserted(id)).record_id(),
            Some(AccreditationId::from_uuid(id))
        );
        assert_eq!(
            commit_result(BatchInsertStatus::Aborted),
            CommitRowResult::Failure {
                reason: CommitFailure::Aborted
            }
        );
    }

    #[test]
    fn test_person_patch_carries_nationality_text() {
        let update = PersonUpdate {
            nationality: Some(Nationality::Domestic),
            ..PersonUpdate::default()
        };
        assert_eq!(
            person_patch(&update).nationality.as_deref(),
            Some("domestic")
        );
    }
}
