//! Whole-batch validation.
//!
//! Each row gets at most one failure, taken from the first failing check in
//! this order:
//!
//! 1. missing required fields
//! 2. invalid document
//! 3. invalid email
//! 4. already accredited for the event
//! 5. duplicate document within the batch
//! 6. duplicate email (event or batch)
//! 7. quota exceeded
//!
//! Checks 1 to 3 come precomputed on each row. The validator itself is pure:
//! every fact about persisted state is handed in through [`EventFacts`], so
//! the same code runs once before identity resolution (on document keys, no
//! persisted facts) and once after (on resolved Person ids).

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::models::RowFailure;
use crate::services::quota_evaluator::QuotaEvaluator;

/// One row as the validator sees it.
#[derive(Debug, Clone)]
pub struct ValidationRow<K> {
    /// Result of the row-local checks (1 to 3).
    pub local_failure: Option<RowFailure>,
    /// Identity used for duplicate detection: a document key or a Person id.
    pub identity: Option<K>,
    /// Lowercased email, when supplied.
    pub email: Option<String>,
    pub media_type: String,
    pub organization: String,
}

/// What is already persisted for the event.
#[derive(Debug)]
pub struct EventFacts<'a, K> {
    /// Identities already accredited for the event.
    pub accredited: &'a HashSet<K>,
    /// Lowercased emails already used in the event.
    pub registered_emails: &'a HashSet<String>,
    /// Quota state; `None` skips the quota check.
    pub quota: Option<&'a QuotaEvaluator>,
}

impl<'a, K> EventFacts<'a, K> {
    /// No persisted facts: only in-batch checks apply.
    #[must_use]
    pub fn batch_only(accredited: &'a HashSet<K>, registered_emails: &'a HashSet<String>) -> Self {
        Self {
            accredited,
            registered_emails,
            quota: None,
        }
    }
}

/// Per-row verdicts, aligned with the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub outcomes: Vec<Option<RowFailure>>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(Option::is_none)
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_some()).count()
    }

    /// Mark every passing row as aborted when any row failed.
    pub fn enforce_all_or_nothing(&mut self) {
        if self.is_clean() {
            return;
        }
        for outcome in &mut self.outcomes {
            if outcome.is_none() {
                *outcome = Some(RowFailure::Aborted);
            }
        }
    }
}

/// Validate a batch. All-or-nothing is not applied here; see
/// [`ValidationReport::enforce_all_or_nothing`].
#[must_use]
pub fn validate<K: Eq + Hash + Clone>(
    rows: &[ValidationRow<K>],
    facts: &EventFacts<'_, K>,
) -> ValidationReport {
    let mut outcomes: Vec<Option<RowFailure>> =
        rows.iter().map(|r| r.local_failure.clone()).collect();

    // Checks 4 and 5. First sightings are claimed by rows that passed 1-3.
    let mut first_identity: HashMap<&K, usize> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        if outcomes[index].is_some() {
            continue;
        }
        let Some(identity) = row.identity.as_ref() else {
            continue;
        };
        if facts.accredited.contains(identity) {
            outcomes[index] = Some(RowFailure::DuplicateInEvent);
            continue;
        }
        match first_identity.get(identity) {
            Some(&first) => {
                outcomes[index] = Some(RowFailure::DuplicateInBatch {
                    first_row: first + 1,
                });
            }
            None => {
                first_identity.insert(identity, index);
            }
        }
    }

    // Check 6. As above, only rows still passing claim a first sighting.
    let mut first_email: HashMap<&str, usize> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        if outcomes[index].is_some() {
            continue;
        }
        let Some(email) = row.email.as_deref() else {
            continue;
        };
        if facts.registered_emails.contains(email) {
            outcomes[index] = Some(RowFailure::DuplicateEmail { first_row: None });
            continue;
        }
        match first_email.get(email) {
            Some(&first) => {
                outcomes[index] = Some(RowFailure::DuplicateEmail {
                    first_row: Some(first + 1),
                });
            }
            None => {
                first_email.insert(email, index);
            }
        }
    }

    // Check 7, on rows that passed everything else.
    if let Some(quota) = facts.quota {
        let eligible: Vec<usize> = (0..rows.len()).filter(|&i| outcomes[i].is_none()).collect();
        let entries: Vec<(&str, &str)> = eligible
            .iter()
            .map(|&i| (rows[i].media_type.as_str(), rows[i].organization.as_str()))
            .collect();
        for (&index, check) in eligible.iter().zip(quota.evaluate_batch(&entries)) {
            if let (Some(scope), Some(limit)) = (check.exceeded, check.exceeded_limit()) {
                outcomes[index] = Some(RowFailure::QuotaExceeded {
                    media_type: rows[index].media_type.trim().to_string(),
                    organization: rows[index].organization.trim().to_string(),
                    scope,
                    limit,
                });
            }
        }
    }

    ValidationReport { outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accredia_core::{QuotaLimit, QuotaScope};

    fn row(identity: &str, email: Option<&str>) -> ValidationRow<String> {
        ValidationRow {
            local_failure: None,
            identity: Some(identity.to_string()),
            email: email.map(str::to_string),
            media_type: "Photographer".to_string(),
            organization: "AcmeNews".to_string(),
        }
    }

    fn run(
        rows: &[ValidationRow<String>],
        accredited: &[&str],
        emails: &[&str],
    ) -> ValidationReport {
        let accredited: HashSet<String> = accredited.iter().map(|s| s.to_string()).collect();
        let emails: HashSet<String> = emails.iter().map(|s| s.to_string()).collect();
        validate(rows, &EventFacts::batch_only(&accredited, &emails))
    }

    #[test]
    fn test_clean_batch() {
        let report = run(&[row("a", None), row("b", Some("b@x.org"))], &[], &[]);
        assert!(report.is_clean());
    }

    #[test]
    fn test_duplicate_in_batch_flags_later_rows_only() {
        let mut report = run(&[row("a", None), row("b", None), row("a", None)], &[], &[]);
        assert_eq!(report.outcomes[0], None);
        assert_eq!(
            report.outcomes[2],
            Some(RowFailure::DuplicateInBatch { first_row: 1 })
        );

        report.enforce_all_or_nothing();
        assert_eq!(report.outcomes[0], Some(RowFailure::Aborted));
        assert_eq!(report.outcomes[1], Some(RowFailure::Aborted));
        assert_eq!(
            report.outcomes[2],
            Some(RowFailure::DuplicateInBatch { first_row: 1 })
        );
    }

    #[test]
    fn test_duplicate_in_event_precedes_duplicate_in_batch() {
        let report = run(&[row("a", None), row("a", None)], &["a"], &[]);
        assert_eq!(report.outcomes[0], Some(RowFailure::DuplicateInEvent));
        assert_eq!(report.outcomes[1], Some(RowFailure::DuplicateInEvent));
    }

    #[test]
    fn test_local_failure_precedes_everything() {
        let mut bad = row("a", Some("a@x.org"));
        bad.local_failure = Some(RowFailure::InvalidEmail);
        let report = run(&[bad, row("a", None)], &[], &[]);
        assert_eq!(report.outcomes[0], Some(RowFailure::InvalidEmail));
        // The invalid row does not claim the identity.
        assert_eq!(report.outcomes[1], None);
    }

    #[test]
    fn test_duplicate_email_in_event_and_batch() {
        let report = run(
            &[
                row("a", Some("taken@x.org")),
                row("b", Some("same@x.org")),
                row("c", Some("same@x.org")),
            ],
            &[],
            &["taken@x.org"],
        );
        assert_eq!(
            report.outcomes[0],
            Some(RowFailure::DuplicateEmail { first_row: None })
        );
        assert_eq!(report.outcomes[1], None);
        assert_eq!(
            report.outcomes[2],
            Some(RowFailure::DuplicateEmail { first_row: Some(2) })
        );
    }

    #[test]
    fn test_duplicate_document_precedes_duplicate_email() {
        let report = run(&[row("a", Some("a@x.org")), row("a", Some("a@x.org"))], &[], &[]);
        assert_eq!(
            report.outcomes[1],
            Some(RowFailure::DuplicateInBatch { first_row: 1 })
        );
    }

    #[test]
    fn test_failed_row_does_not_claim_email() {
        let mut bad = row("a", Some("same@x.org"));
        bad.local_failure = Some(RowFailure::MissingFields {
            fields: vec!["last_name"],
        });
        let report = run(
            &[
                bad,
                row("b", None),
                row("b", Some("same@x.org")),
                row("c", Some("same@x.org")),
                row("d", Some("same@x.org")),
            ],
            &[],
            &[],
        );
        assert_eq!(
            report.outcomes[2],
            Some(RowFailure::DuplicateInBatch { first_row: 2 })
        );
        // Neither the invalid row 1 nor the duplicate row 3 is the first sighting.
        assert_eq!(report.outcomes[3], None);
        assert_eq!(
            report.outcomes[4],
            Some(RowFailure::DuplicateEmail { first_row: Some(4) })
        );
    }

    #[test]
    fn test_quota_overflow_fails_every_group_member() {
        let quota = QuotaEvaluator::new(
            &[QuotaLimit {
                media_type: "Photographer".to_string(),
                max_per_organization: 2,
                max_global: 0,
            }],
            &[],
        );
        let rows = vec![row("a", None), row("b", None), row("c", None)];
        let accredited = HashSet::new();
        let emails = HashSet::new();
        let facts = EventFacts {
            accredited: &accredited,
            registered_emails: &emails,
            quota: Some(&quota),
        };
        let report = validate(&rows, &facts);
        assert_eq!(report.failure_count(), 3);
        for outcome in &report.outcomes {
            assert!(matches!(
                outcome,
                Some(RowFailure::QuotaExceeded {
                    scope: QuotaScope::Organization,
                    limit: 2,
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_quota_ignores_rows_failing_earlier_checks() {
        let quota = QuotaEvaluator::new(
            &[QuotaLimit {
                media_type: "Photographer".to_string(),
                max_per_organization: 2,
                max_global: 0,
            }],
            &[],
        );
        let rows = vec![row("a", None), row("b", None), row("a", None)];
        let accredited = HashSet::new();
        let emails = HashSet::new();
        let facts = EventFacts {
            accredited: &accredited,
            registered_emails: &emails,
            quota: Some(&quota),
        };
        let report = validate(&rows, &facts);
        assert_eq!(report.outcomes[0], None);
        assert_eq!(report.outcomes[1], None);
        assert_eq!(
            report.outcomes[2],
            Some(RowFailure::DuplicateInBatch { first_row: 1 })
        );
    }
}
