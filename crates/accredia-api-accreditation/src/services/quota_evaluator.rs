//! Advisory quota pre-check.
//!
//! The authoritative check runs again inside the atomic commit under a lock;
//! this evaluator only lets the validator reject obvious overflows early and
//! with a precise per-row reason.

use accredia_core::{normalize_label, QuotaCheck, QuotaLedger, QuotaLimit};
use std::collections::HashMap;

use crate::store::QuotaUsage;

#[derive(Debug, Clone)]
pub struct QuotaEvaluator {
    ledger: QuotaLedger,
}

impl QuotaEvaluator {
    /// Build from an event's limits and its committed usage.
    #[must_use]
    pub fn new(limits: &[QuotaLimit], usage: &[QuotaUsage]) -> Self {
        let mut ledger = QuotaLedger::new(limits.iter().cloned());
        for row in usage {
            ledger.record(&row.media_type, &row.organization, row.used);
        }
        Self { ledger }
    }

    /// Would `requested` more records of `media_type` for `organization` fit?
    #[must_use]
    pub fn check_quota(&self, media_type: &str, organization: &str, requested: u32) -> QuotaCheck {
        self.ledger
            .check(media_type, organization, requested, requested)
    }

    /// Evaluate a whole batch at once.
    ///
    /// Demand is aggregated per (media type, organization) and per media
    /// type, so every member of an overflowing group gets the same verdict:
    /// 3 rows against a limit of 2 fail all 3, not just the last one.
    /// Returns one check per input entry, aligned with the input.
    #[must_use]
    pub fn evaluate_batch(&self, entries: &[(&str, &str)]) -> Vec<QuotaCheck> {
        let mut per_org: HashMap<(String, String), u32> = HashMap::new();
        let mut global: HashMap<String, u32> = HashMap::new();
        for (media_type, organization) in entries {
            let media = normalize_label(media_type);
            *per_org
                .entry((media.clone(), normalize_label(organization)))
                .or_default() += 1;
            *global.entry(media).or_default() += 1;
        }

        entries
            .iter()
            .map(|(media_type, organization)| {
                let media = normalize_label(media_type);
                let org_demand = per_org
                    .get(&(media.clone(), normalize_label(organization)))
                    .copied()
                    .unwrap_or(0);
                let global_demand = global.get(&media).copied().unwrap_or(0);
                self.ledger
                    .check(media_type, organization, org_demand, global_demand)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accredia_core::QuotaScope;

    fn limits(per_org: u32, global: u32) -> Vec<QuotaLimit> {
        vec![QuotaLimit {
            media_type: "Photographer".to_string(),
            max_per_organization: per_org,
            max_global: global,
        }]
    }

    #[test]
    fn test_check_quota_counts_committed_usage() {
        let usage = vec![QuotaUsage {
            media_type: "photographer".to_string(),
            organization: "acmenews".to_string(),
            used: 2,
        }];
        let evaluator = QuotaEvaluator::new(&limits(2, 0), &usage);
        let check = evaluator.check_quota("Photographer", "AcmeNews", 1);
        assert!(!check.available);
        assert_eq!(check.used_per_org, 2);
        assert_eq!(check.max_per_org, 2);
    }

    #[test]
    fn test_whole_group_fails_together() {
        let evaluator = QuotaEvaluator::new(&limits(2, 0), &[]);
        let entries = vec![("Photographer", "AcmeNews"); 3];
        let checks = evaluator.evaluate_batch(&entries);
        assert_eq!(checks.len(), 3);
        assert!(checks
            .iter()
            .all(|c| c.exceeded == Some(QuotaScope::Organization)));
    }

    #[test]
    fn test_groups_are_independent_per_organization() {
        let evaluator = QuotaEvaluator::new(&limits(2, 0), &[]);
        let entries = vec![
            ("Photographer", "AcmeNews"),
            ("Photographer", "AcmeNews"),
            ("Photographer", "AcmeNews"),
            ("Photographer", "Daily Planet"),
        ];
        let checks = evaluator.evaluate_batch(&entries);
        assert!(!checks[0].available);
        assert!(checks[3].available);
    }

    #[test]
    fn test_global_limit_spans_organizations() {
        let evaluator = QuotaEvaluator::new(&limits(0, 40), &[]);
        let mut entries = vec![("Photographer", "AcmeNews"); 30];
        entries.extend(vec![("photographer", "Daily Planet"); 15]);
        let checks = evaluator.evaluate_batch(&entries);
        assert!(checks.iter().all(|c| c.exceeded == Some(QuotaScope::Global)));
    }

    #[test]
    fn test_unconfigured_media_type_always_fits() {
        let evaluator = QuotaEvaluator::new(&limits(1, 1), &[]);
        let entries = vec![("Writer", "AcmeNews"); 100];
        assert!(evaluator.evaluate_batch(&entries).iter().all(|c| c.available));
    }
}
