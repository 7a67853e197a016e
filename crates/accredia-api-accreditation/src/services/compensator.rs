//! Cleanup after a failed batch.

use accredia_core::{AccreditationId, EventId, PersonId};
use std::sync::Arc;

use crate::store::AccreditationStore;

/// What a rollback managed to remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompensationSummary {
    pub records_deleted: u64,
    pub persons_deleted: u64,
    /// Newly created Persons kept because something references them.
    pub persons_preserved: usize,
}

/// Best-effort rollback of a failed batch's side effects.
///
/// Never fails: storage errors are logged and the remaining steps still run.
/// A leftover unused Person is a cosmetic leak, not an integrity problem.
pub struct Compensator {
    store: Arc<dyn AccreditationStore>,
}

impl Compensator {
    pub fn new(store: Arc<dyn AccreditationStore>) -> Self {
        Self { store }
    }

    /// Delete `created_records` (only within `event_id`) and every Person of
    /// `new_persons` that no accreditation in any event references.
    pub async fn rollback(
        &self,
        event_id: EventId,
        created_records: &[AccreditationId],
        new_persons: &[PersonId],
    ) -> CompensationSummary {
        let mut summary = CompensationSummary::default();

        if !created_records.is_empty() {
            match self
                .store
                .delete_accreditations(event_id, created_records)
                .await
            {
                Ok(deleted) => summary.records_deleted = deleted,
                Err(e) => tracing::warn!(
                    event_id = %event_id,
                    records = created_records.len(),
                    error = %e,
                    "Failed to delete accreditations of rolled back batch"
                ),
            }
        }

        if new_persons.is_empty() {
            return summary;
        }

        let referenced = match self.store.referenced_persons(new_persons).await {
            Ok(referenced) => referenced,
            Err(e) => {
                tracing::warn!(
                    event_id = %event_id,
                    persons = new_persons.len(),
                    error = %e,
                    "Failed to check person references, leaving persons in place"
                );
                return summary;
            }
        };

        let orphans: Vec<PersonId> = new_persons
            .iter()
            .copied()
            .filter(|id| !referenced.contains(id))
            .collect();
        summary.persons_preserved = new_persons.len() - orphans.len();

        if !orphans.is_empty() {
            match self.store.delete_persons(&orphans).await {
                Ok(deleted) => summary.persons_deleted = deleted,
                Err(e) => tracing::warn!(
                    event_id = %event_id,
                    persons = orphans.len(),
                    error = %e,
                    "Failed to delete orphaned persons"
                ),
            }
        }

        tracing::info!(
            event_id = %event_id,
            records_deleted = summary.records_deleted,
            persons_deleted = summary.persons_deleted,
            persons_preserved = summary.persons_preserved,
            "Batch compensated"
        );
        summary
    }
}
