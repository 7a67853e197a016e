//! The accreditation commit engine.
//!
//! A batch moves through `Received -> IdentitiesResolving -> Validating ->
//! Committing` and ends in exactly one of `Committed` or `RolledBack`. Every
//! failure path funnels into [`AccreditationEngine::roll_back`], the single
//! exit for failed batches, which runs the compensator and builds the
//! row-aligned response.

use accredia_core::{
    AccreditationId, AttributeBag, DocumentKey, EventId, PersonId, ProfileId, UserId,
};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::collaborators::{
    AuditSink, EventConfig, EventDirectory, ProfileDataSink, SubmitterDirectory,
};
use crate::models::{
    AuthenticatedUser, BatchCandidate, BatchResponse, FailureKind, RowFailure, RowResult,
};
use crate::services::atomic_commit::{AtomicCommit, CommitError};
use crate::services::batch_validator::{self, EventFacts, ValidationRow};
use crate::services::compensator::Compensator;
use crate::services::identity_resolver::{IdentityAttributes, IdentityRequest, IdentityResolver};
use crate::services::quota_evaluator::QuotaEvaluator;
use crate::services::zone_resolver::ZoneResolver;
use crate::store::{
    AccreditationStore, CommitFailure, CommitRequest, CommitRow, CommitRowResult, StoreError,
};
use crate::validation::{check_row, non_blank, CheckedRow};

/// Default upper bound on rows per batch.
pub const DEFAULT_MAX_BATCH_ROWS: usize = 2000;

/// Default number of documents per identity lookup/insert round trip.
pub const DEFAULT_IDENTITY_CHUNK_SIZE: usize = 50;

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_batch_rows: usize,
    pub identity_chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_rows: DEFAULT_MAX_BATCH_ROWS,
            identity_chunk_size: DEFAULT_IDENTITY_CHUNK_SIZE,
        }
    }
}

/// Reasons the engine refuses to start a batch. Nothing has been written
/// when one of these is returned.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    #[error("Accreditation is closed: {reason}")]
    AccreditationClosed { reason: String },

    #[error("Batch contains no rows")]
    EmptyBatch,

    #[error("Batch contains {count} rows, at most {max} are accepted")]
    TooManyRows { count: usize, max: usize },

    /// Event or submitter lookup failed.
    #[error("Collaborator unavailable: {0}")]
    Unavailable(#[from] StoreError),
}

/// Lifecycle of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Received,
    IdentitiesResolving,
    Validating,
    Committing,
    Committed,
    RolledBack,
}

impl BatchState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Committed | BatchState::RolledBack)
    }

    /// States only move forward; any non-terminal state may roll back.
    #[must_use]
    pub fn can_advance_to(self, next: BatchState) -> bool {
        use BatchState::{
            Committed, Committing, IdentitiesResolving, Received, RolledBack, Validating,
        };
        matches!(
            (self, next),
            (Received, IdentitiesResolving)
                | (IdentitiesResolving, Validating)
                | (Validating, Committing)
                | (Committing, Committed)
                | (Received | IdentitiesResolving | Validating | Committing, RolledBack)
        )
    }
}

/// Per-batch bookkeeping.
struct BatchRun<'a> {
    batch_id: Uuid,
    event: &'a EventConfig,
    candidates: &'a [BatchCandidate],
    state: BatchState,
    /// Persons created for this batch, compensated on rollback.
    created_persons: Vec<PersonId>,
}

impl<'a> BatchRun<'a> {
    fn new(event: &'a EventConfig, candidates: &'a [BatchCandidate]) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            event,
            candidates,
            state: BatchState::Received,
            created_persons: Vec::new(),
        }
    }

    fn advance(&mut self, next: BatchState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid batch transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(
            batch_id = %self.batch_id,
            event_id = %self.event.id,
            from = ?self.state,
            to = ?next,
            "Batch state transition"
        );
        self.state = next;
    }

    fn row_count(&self) -> usize {
        self.candidates.len()
    }
}

/// Collaborators consumed by the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub events: Arc<dyn EventDirectory>,
    pub submitters: Arc<dyn SubmitterDirectory>,
    pub profile_data: Arc<dyn ProfileDataSink>,
    pub audit: Arc<dyn AuditSink>,
}

/// Entry point turning candidate rows into accreditation records.
pub struct AccreditationEngine {
    store: Arc<dyn AccreditationStore>,
    collaborators: Collaborators,
    identity: IdentityResolver,
    commit: AtomicCommit,
    compensator: Compensator,
    config: EngineConfig,
}

impl AccreditationEngine {
    pub fn new(
        store: Arc<dyn AccreditationStore>,
        collaborators: Collaborators,
        config: EngineConfig,
    ) -> Self {
        Self {
            identity: IdentityResolver::new(store.clone(), config.identity_chunk_size),
            commit: AtomicCommit::new(store.clone()),
            compensator: Compensator::new(store.clone()),
            store,
            collaborators,
            config,
        }
    }

    /// Build an engine whose storage and collaborators are all served by
    /// one backend.
    pub fn with_backend<B>(backend: Arc<B>, config: EngineConfig) -> Self
    where
        B: AccreditationStore
            + EventDirectory
            + SubmitterDirectory
            + ProfileDataSink
            + AuditSink
            + 'static,
    {
        let collaborators = Collaborators {
            events: backend.clone(),
            submitters: backend.clone(),
            profile_data: backend.clone(),
            audit: backend.clone(),
        };
        Self::new(backend, collaborators, config)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Commit a bulk batch, all-or-nothing.
    pub async fn submit_batch(
        &self,
        event_id: EventId,
        rows: &[BatchCandidate],
        submitter: Option<AuthenticatedUser>,
    ) -> Result<BatchResponse, EngineError> {
        self.run(event_id, rows, submitter, None).await
    }

    /// Commit a single submission. The submitter's account, when present, is
    /// linked to the resolved Person unless it already belongs to another.
    pub async fn submit_single(
        &self,
        event_id: EventId,
        candidate: BatchCandidate,
        submitter: Option<AuthenticatedUser>,
    ) -> Result<BatchResponse, EngineError> {
        let link = submitter.map(|s| s.user_id);
        self.run(event_id, std::slice::from_ref(&candidate), submitter, link)
            .await
    }

    async fn run(
        &self,
        event_id: EventId,
        rows: &[BatchCandidate],
        submitter: Option<AuthenticatedUser>,
        link_account: Option<UserId>,
    ) -> Result<BatchResponse, EngineError> {
        if rows.is_empty() {
            return Err(EngineError::EmptyBatch);
        }
        if rows.len() > self.config.max_batch_rows {
            return Err(EngineError::TooManyRows {
                count: rows.len(),
                max: self.config.max_batch_rows,
            });
        }

        let event = self
            .collaborators
            .events
            .get_event(event_id)
            .await?
            .ok_or(EngineError::EventNotFound(event_id))?;

        let window = event.accreditation_window(Utc::now());
        if window.closed {
            return Err(EngineError::AccreditationClosed {
                reason: window
                    .reason
                    .unwrap_or_else(|| "Accreditation is closed".to_string()),
            });
        }

        let submitted_by = self.attribution(submitter).await?;

        let mut run = BatchRun::new(&event, rows);
        tracing::info!(
            batch_id = %run.batch_id,
            event_id = %event_id,
            row_count = rows.len(),
            attributed = submitted_by.is_some(),
            "Batch received"
        );

        // Row-local and in-batch checks need no storage access. A batch that
        // already fails here never touches identities.
        let checked: Vec<CheckedRow> = rows.iter().map(check_row).collect();
        let pre_rows: Vec<ValidationRow<DocumentKey>> = rows
            .iter()
            .zip(&checked)
            .map(|(candidate, c)| validation_row(candidate, c, c.key.clone()))
            .collect();
        let (no_identities, no_emails) = (HashSet::new(), HashSet::new());
        let mut report = batch_validator::validate(
            &pre_rows,
            &EventFacts::batch_only(&no_identities, &no_emails),
        );
        if !report.is_clean() {
            // Persisted facts outrank in-batch duplicates, so the rows are
            // judged again against the event, looked up by document.
            match self.load_document_facts(&event, &checked).await {
                Ok((accredited, registered, quota)) => {
                    let facts = EventFacts {
                        accredited: &accredited,
                        registered_emails: &registered,
                        quota: Some(&quota),
                    };
                    report = batch_validator::validate(&pre_rows, &facts);
                }
                Err(e) => {
                    tracing::warn!(
                        batch_id = %run.batch_id,
                        event_id = %event_id,
                        error = %e,
                        "Failed to load event state, reporting in-batch checks only"
                    );
                }
            }
            report.enforce_all_or_nothing();
            return Ok(self
                .roll_back(run, report.outcomes, FailureKind::ValidationError, &[])
                .await);
        }

        run.advance(BatchState::IdentitiesResolving);
        let requests: Vec<IdentityRequest> = rows
            .iter()
            .zip(&checked)
            .filter_map(|(candidate, c)| {
                c.key.clone().map(|key| IdentityRequest {
                    key,
                    attributes: identity_attributes(candidate),
                })
            })
            .collect();

        let identities = match self.identity.resolve_or_create(&requests, link_account).await {
            Ok(identities) => identities,
            Err(e) => {
                tracing::error!(
                    batch_id = %run.batch_id,
                    event_id = %event_id,
                    row_count = rows.len(),
                    chunk_index = e.chunk_index,
                    error = %e.source,
                    "Identity resolution aborted the batch"
                );
                run.created_persons = e.created;
                return Ok(self
                    .roll_back(
                        run,
                        infrastructure_failure(rows.len()),
                        FailureKind::InfrastructureError,
                        &[],
                    )
                    .await);
            }
        };
        run.created_persons.clone_from(&identities.created);

        let person_ids: Option<Vec<PersonId>> = checked
            .iter()
            .map(|c| c.key.as_ref().and_then(|k| identities.person_for(k)))
            .collect();
        let Some(person_ids) = person_ids else {
            tracing::error!(
                batch_id = %run.batch_id,
                event_id = %event_id,
                row_count = rows.len(),
                "Identity resolution left rows unresolved"
            );
            return Ok(self
                .roll_back(
                    run,
                    infrastructure_failure(rows.len()),
                    FailureKind::InfrastructureError,
                    &[],
                )
                .await);
        };

        run.advance(BatchState::Validating);
        let emails: Vec<String> = checked.iter().filter_map(|c| c.email.clone()).collect();
        let (accredited, registered, quota) =
            match self.load_event_facts(&event, &person_ids, &emails).await {
                Ok(facts) => facts,
                Err(e) => {
                    tracing::error!(
                        batch_id = %run.batch_id,
                        event_id = %event_id,
                        row_count = rows.len(),
                        error = %e,
                        "Failed to load event state for validation"
                    );
                    return Ok(self
                        .roll_back(
                            run,
                            infrastructure_failure(rows.len()),
                            FailureKind::InfrastructureError,
                            &[],
                        )
                        .await);
                }
            };

        let resolved_rows: Vec<ValidationRow<PersonId>> = rows
            .iter()
            .zip(&checked)
            .zip(&person_ids)
            .map(|((candidate, c), person_id)| validation_row(candidate, c, Some(*person_id)))
            .collect();
        let facts = EventFacts {
            accredited: &accredited,
            registered_emails: &registered,
            quota: Some(&quota),
        };
        let mut report = batch_validator::validate(&resolved_rows, &facts);
        if !report.is_clean() {
            report.enforce_all_or_nothing();
            return Ok(self
                .roll_back(run, report.outcomes, FailureKind::ValidationError, &[])
                .await);
        }

        run.advance(BatchState::Committing);
        let zones = ZoneResolver::new(&event.zone_rules);
        let request = CommitRequest {
            event_id,
            rows: rows
                .iter()
                .zip(&person_ids)
                .map(|(candidate, person_id)| commit_row(candidate, *person_id, &zones))
                .collect(),
            submitted_by,
        };

        match self.commit.commit(&request).await {
            Ok(results) if results.iter().all(CommitRowResult::is_success) => {
                let record_ids: Vec<AccreditationId> =
                    results.iter().filter_map(CommitRowResult::record_id).collect();
                run.advance(BatchState::Committed);
                self.after_commit(&run, &person_ids, &record_ids, submitter)
                    .await;
                Ok(committed_response(&run, &record_ids))
            }
            Ok(results) => {
                let created: Vec<AccreditationId> =
                    results.iter().filter_map(CommitRowResult::record_id).collect();
                tracing::warn!(
                    batch_id = %run.batch_id,
                    event_id = %event_id,
                    row_count = rows.len(),
                    committed = created.len(),
                    "Commit reported row failures"
                );
                let mut outcomes: Vec<Option<RowFailure>> = results
                    .iter()
                    .zip(&request.rows)
                    .map(|(result, row)| match result {
                        CommitRowResult::Success { .. } => Some(RowFailure::Aborted),
                        CommitRowResult::Failure { reason } => Some(commit_failure(*reason, row)),
                    })
                    .collect();
                // Rejected under the lock with nothing written: a validation
                // outcome. Anything written alongside failures is an anomaly.
                let mut kind = if created.is_empty() {
                    FailureKind::ValidationError
                } else {
                    FailureKind::PartialCommitAnomaly
                };
                if outcomes.iter().all(|o| *o == Some(RowFailure::Aborted)) {
                    outcomes = infrastructure_failure(rows.len());
                    kind = FailureKind::InfrastructureError;
                }
                Ok(self.roll_back(run, outcomes, kind, &created).await)
            }
            Err(e) => {
                tracing::error!(
                    batch_id = %run.batch_id,
                    event_id = %event_id,
                    row_count = rows.len(),
                    error = %e,
                    "Atomic commit failed"
                );
                let created: Vec<AccreditationId> = match &e {
                    CommitError::Misaligned { results, .. } => {
                        results.iter().filter_map(CommitRowResult::record_id).collect()
                    }
                    CommitError::Store(_) => Vec::new(),
                };
                Ok(self
                    .roll_back(
                        run,
                        infrastructure_failure(rows.len()),
                        FailureKind::InfrastructureError,
                        &created,
                    )
                    .await)
            }
        }
    }

    /// The submitter profile the batch is attributed to. Super-admins and
    /// anonymous callers are never attributed.
    async fn attribution(
        &self,
        submitter: Option<AuthenticatedUser>,
    ) -> Result<Option<ProfileId>, StoreError> {
        let Some(user) = submitter else {
            return Ok(None);
        };
        let submitters = &self.collaborators.submitters;
        if submitters.is_super_admin(user.user_id).await? {
            return Ok(None);
        }
        Ok(submitters
            .profile_for_user(user.user_id)
            .await?
            .map(|profile| profile.id))
    }

    async fn load_event_facts(
        &self,
        event: &EventConfig,
        person_ids: &[PersonId],
        emails: &[String],
    ) -> Result<(HashSet<PersonId>, HashSet<String>, QuotaEvaluator), StoreError> {
        let accredited = self.store.accredited_persons(event.id, person_ids).await?;
        let registered = if emails.is_empty() {
            HashSet::new()
        } else {
            self.store.registered_emails(event.id, emails).await?
        };
        let usage = self.store.quota_usage(event.id).await?;
        Ok((
            accredited,
            registered,
            QuotaEvaluator::new(&event.quota_rules, &usage),
        ))
    }

    /// Event facts keyed by document, for rows that have no Person yet.
    /// Read-only: no identity is created.
    async fn load_document_facts(
        &self,
        event: &EventConfig,
        checked: &[CheckedRow],
    ) -> Result<(HashSet<DocumentKey>, HashSet<String>, QuotaEvaluator), StoreError> {
        let keys: Vec<DocumentKey> = checked
            .iter()
            .filter_map(|c| c.key.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let persons = if keys.is_empty() {
            Vec::new()
        } else {
            self.store.find_persons_by_documents(&keys).await?
        };
        let person_ids: Vec<PersonId> = persons.iter().map(|p| p.id).collect();
        let emails: Vec<String> = checked.iter().filter_map(|c| c.email.clone()).collect();

        let (accredited, registered, quota) =
            self.load_event_facts(event, &person_ids, &emails).await?;
        let accredited_keys = persons
            .into_iter()
            .filter(|p| accredited.contains(&p.id))
            .map(|p| p.key)
            .collect();
        Ok((accredited_keys, registered, quota))
    }

    /// Single exit for failed batches.
    async fn roll_back(
        &self,
        mut run: BatchRun<'_>,
        outcomes: Vec<Option<RowFailure>>,
        kind: FailureKind,
        created_records: &[AccreditationId],
    ) -> BatchResponse {
        run.advance(BatchState::RolledBack);

        if !created_records.is_empty() || !run.created_persons.is_empty() {
            self.compensator
                .rollback(run.event.id, created_records, &run.created_persons)
                .await;
        }

        tracing::info!(
            batch_id = %run.batch_id,
            event_id = %run.event.id,
            row_count = run.row_count(),
            failure_kind = ?kind,
            "Batch rolled back"
        );

        build_response(&run, outcomes, vec![None; run.row_count()], Some(kind))
    }

    /// Best-effort steps outside the transaction. Failures are logged only.
    async fn after_commit(
        &self,
        run: &BatchRun<'_>,
        person_ids: &[PersonId],
        record_ids: &[AccreditationId],
        submitter: Option<AuthenticatedUser>,
    ) {
        let event = run.event;
        let profile_data = &self.collaborators.profile_data;
        let saves = run
            .candidates
            .iter()
            .zip(person_ids)
            .filter_map(|(candidate, person_id)| {
                let data = candidate.extra.form_data_for_keys(&event.form_fields);
                (!data.is_empty()).then_some((*person_id, data))
            })
            .map(|(person_id, data)| async move {
                let result = profile_data
                    .save_tenant_profile_data(person_id, event.tenant_id, &data, &event.form_fields)
                    .await;
                (person_id, result)
            });
        for (person_id, result) in join_all(saves).await {
            if let Err(e) = result {
                tracing::warn!(
                    batch_id = %run.batch_id,
                    person_id = %person_id,
                    error = %e,
                    "Failed to save reusable profile data"
                );
            }
        }

        let action = if run.row_count() == 1 {
            "accreditation.submitted"
        } else {
            "accreditation.batch_committed"
        };
        let payload = serde_json::json!({
            "batch_id": run.batch_id,
            "row_count": run.row_count(),
            "record_ids": record_ids,
        });
        if let Err(e) = self
            .collaborators
            .audit
            .log_action(
                submitter.map(|s| s.user_id),
                action,
                "event",
                &event.id.to_string(),
                payload,
            )
            .await
        {
            tracing::warn!(batch_id = %run.batch_id, error = %e, "Failed to write audit entry");
        }

        tracing::info!(
            batch_id = %run.batch_id,
            event_id = %event.id,
            row_count = run.row_count(),
            "Batch committed"
        );
    }
}

fn validation_row<K>(
    candidate: &BatchCandidate,
    checked: &CheckedRow,
    identity: Option<K>,
) -> ValidationRow<K> {
    ValidationRow {
        local_failure: checked.failure.clone(),
        identity,
        email: checked.email.clone(),
        media_type: trimmed(candidate.media_type.as_deref()),
        organization: trimmed(candidate.organization.as_deref()),
    }
}

fn identity_attributes(candidate: &BatchCandidate) -> IdentityAttributes {
    IdentityAttributes {
        first_name: candidate.first_name.clone(),
        last_name: candidate.last_name.clone(),
        email: candidate.email.clone(),
        phone: candidate.phone.clone(),
        role_title: candidate.role.clone(),
        organization: candidate.organization.clone(),
        media_type: candidate.media_type.clone(),
    }
}

fn commit_row(candidate: &BatchCandidate, person_id: PersonId, zones: &ZoneResolver) -> CommitRow {
    let extra: AttributeBag = candidate
        .extra
        .form_data()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    CommitRow {
        person_id,
        organization: trimmed(candidate.organization.as_deref()),
        media_type: trimmed(candidate.media_type.as_deref()),
        role: trimmed(candidate.role.as_deref()),
        contact_email: non_blank(candidate.email.as_deref()).map(str::to_string),
        zone: zones.resolve_zone(candidate.role.as_deref(), candidate.media_type.as_deref()),
        extra,
    }
}

fn commit_failure(reason: CommitFailure, row: &CommitRow) -> RowFailure {
    match reason {
        CommitFailure::DuplicateInEvent => RowFailure::DuplicateInEvent,
        CommitFailure::QuotaExceeded { scope, limit } => RowFailure::QuotaExceeded {
            media_type: row.media_type.clone(),
            organization: row.organization.clone(),
            scope,
            limit,
        },
        CommitFailure::Aborted => RowFailure::Aborted,
    }
}

fn trimmed(value: Option<&str>) -> String {
    non_blank(value).unwrap_or_default().to_string()
}

fn infrastructure_failure(rows: usize) -> Vec<Option<RowFailure>> {
    vec![Some(RowFailure::Infrastructure); rows]
}

fn committed_response(run: &BatchRun<'_>, record_ids: &[AccreditationId]) -> BatchResponse {
    build_response(
        run,
        vec![None; run.row_count()],
        record_ids.iter().copied().map(Some).collect(),
        None,
    )
}

fn build_response(
    run: &BatchRun<'_>,
    outcomes: Vec<Option<RowFailure>>,
    record_ids: Vec<Option<AccreditationId>>,
    failure_kind: Option<FailureKind>,
) -> BatchResponse {
    let mut results: Vec<RowResult> = run
        .candidates
        .iter()
        .zip(outcomes)
        .zip(record_ids)
        .enumerate()
        .map(|(index, ((candidate, error), record_id))| RowResult {
            row: index + 1,
            person_identity_label: candidate.identity_label(),
            ok: error.is_none(),
            error,
            record_id,
        })
        .collect();
    results.sort_by_key(|r| r.row);

    let success = results.iter().filter(|r| r.ok).count();
    BatchResponse {
        batch_id: run.batch_id,
        total: results.len(),
        success,
        errors: results.len() - success,
        failure_kind,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(BatchState::Received.can_advance_to(BatchState::IdentitiesResolving));
        assert!(BatchState::IdentitiesResolving.can_advance_to(BatchState::Validating));
        assert!(BatchState::Validating.can_advance_to(BatchState::Committing));
        assert!(BatchState::Committing.can_advance_to(BatchState::Committed));
    }

    #[test]
    fn test_no_reentry_or_skipping() {
        assert!(!BatchState::Validating.can_advance_to(BatchState::IdentitiesResolving));
        assert!(!BatchState::Received.can_advance_to(BatchState::Committing));
        assert!(!BatchState::Validating.can_advance_to(BatchState::Committed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [BatchState::Committed, BatchState::RolledBack] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_advance_to(BatchState::RolledBack));
            assert!(!terminal.can_advance_to(BatchState::Committed));
        }
    }

    #[test]
    fn test_any_active_state_can_roll_back() {
        for state in [
            BatchState::Received,
            BatchState::IdentitiesResolving,
            BatchState::Validating,
            BatchState::Committing,
        ] {
            assert!(state.can_advance_to(BatchState::RolledBack));
        }
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_batch_rows, 2000);
        assert_eq!(config.identity_chunk_size, 50);
    }
}
