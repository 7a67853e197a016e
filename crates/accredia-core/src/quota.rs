//! Quota arithmetic shared by the advisory pre-check and the authoritative
//! commit step.
//!
//! A [`QuotaLedger`] holds the configured limits of one event together with
//! the number of records already counted against them. Media types and
//! organizations are compared trimmed and case-insensitively. A limit of `0`
//! means unlimited for that dimension; media types without a configured rule
//! are unlimited in both dimensions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical form used when comparing media types, organizations and roles.
#[must_use]
pub fn normalize_label(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Configured limits for one media type of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimit {
    pub media_type: String,
    pub max_per_organization: u32,
    pub max_global: u32,
}

/// Which dimension of a quota was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScope {
    Organization,
    Global,
}

/// Outcome of evaluating a request against a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaCheck {
    pub available: bool,
    pub max_per_org: u32,
    pub used_per_org: u32,
    pub max_global: u32,
    pub used_global: u32,
    /// First exceeded dimension, organization checked before global.
    pub exceeded: Option<QuotaScope>,
}

impl QuotaCheck {
    /// The limit of the exceeded dimension, if any.
    #[must_use]
    pub fn exceeded_limit(&self) -> Option<u32> {
        self.exceeded.map(|scope| match scope {
            QuotaScope::Organization => self.max_per_org,
            QuotaScope::Global => self.max_global,
        })
    }
}

/// Limits plus counted usage for one event.
#[derive(Debug, Clone, Default)]
pub struct QuotaLedger {
    limits: HashMap<String, QuotaLimit>,
    per_org: HashMap<(String, String), u32>,
    global: HashMap<String, u32>,
}

impl QuotaLedger {
    pub fn new(limits: impl IntoIterator<Item = QuotaLimit>) -> Self {
        let limits = limits
            .into_iter()
            .map(|l| (normalize_label(&l.media_type), l))
            .collect();
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Count `count` already-committed records.
    pub fn record(&mut self, media_type: &str, organization: &str, count: u32) {
        let media = normalize_label(media_type);
        let org = normalize_label(organization);
        *self.per_org.entry((media.clone(), org)).or_default() += count;
        *self.global.entry(media).or_default() += count;
    }

    #[must_use]
    pub fn limit_for(&self, media_type: &str) -> Option<&QuotaLimit> {
        self.limits.get(&normalize_label(media_type))
    }

    #[must_use]
    pub fn used_per_org(&self, media_type: &str, organization: &str) -> u32 {
        self.per_org
            .get(&(normalize_label(media_type), normalize_label(organization)))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn used_global(&self, media_type: &str) -> u32 {
        self.global
            .get(&normalize_label(media_type))
            .copied()
            .unwrap_or(0)
    }

    /// Would `requested_org` more records for (media type, organization), and
    /// `requested_global` more for the media type overall, still fit?
    #[must_use]
    pub fn check(
        &self,
        media_type: &str,
        organization: &str,
        requested_org: u32,
        requested_global: u32,
    ) -> QuotaCheck {
        let used_per_org = self.used_per_org(media_type, organization);
        let used_global = self.used_global(media_type);
        let (max_per_org, max_global) = self
            .limit_for(media_type)
            .map_or((0, 0), |l| (l.max_per_organization, l.max_global));

        let exceeded = if max_per_org > 0 && used_per_org + requested_org > max_per_org {
            Some(QuotaScope::Organization)
        } else if max_global > 0 && used_global + requested_global > max_global {
            Some(QuotaScope::Global)
        } else {
            None
        };

        QuotaCheck {
            available: exceeded.is_none(),
            max_per_org,
            used_per_org,
            max_global,
            used_global,
            exceeded,
        }
    }

    /// Admit a single record, counting it when it fits.
    pub fn admit(&mut self, media_type: &str, organization: &str) -> QuotaCheck {
        let check = self.check(media_type, organization, 1, 1);
        if check.available {
            self.record(media_type, organization, 1);
        }
        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photographers(per_org: u32, global: u32) -> QuotaLedger {
        QuotaLedger::new([QuotaLimit {
            media_type: "Photographer".to_string(),
            max_per_organization: per_org,
            max_global: global,
        }])
    }

    #[test]
    fn test_unconfigured_media_type_is_unlimited() {
        let ledger = photographers(1, 1);
        let check = ledger.check("Writer", "AcmeNews", 500, 500);
        assert!(check.available);
        assert_eq!(check.max_per_org, 0);
    }

    #[test]
    fn test_zero_means_unlimited() {
        let mut ledger = photographers(0, 0);
        ledger.record("Photographer", "AcmeNews", 1_000);
        assert!(ledger.check("Photographer", "AcmeNews", 1, 1).available);
    }

    #[test]
    fn test_per_org_limit_counts_request_size() {
        let ledger = photographers(2, 0);
        assert!(ledger.check("Photographer", "AcmeNews", 2, 2).available);
        let check = ledger.check("Photographer", "AcmeNews", 3, 3);
        assert!(!check.available);
        assert_eq!(check.exceeded, Some(QuotaScope::Organization));
        assert_eq!(check.exceeded_limit(), Some(2));
    }

    #[test]
    fn test_global_limit_across_organizations() {
        let mut ledger = photographers(0, 3);
        ledger.record("photographer", "AcmeNews", 2);
        ledger.record("PHOTOGRAPHER", "Daily Planet", 1);
        let check = ledger.check("Photographer", "Other", 1, 1);
        assert_eq!(check.used_global, 3);
        assert_eq!(check.exceeded, Some(QuotaScope::Global));
    }

    #[test]
    fn test_labels_compare_case_insensitively() {
        let mut ledger = photographers(1, 0);
        ledger.record(" photographer ", "acmenews", 1);
        assert_eq!(ledger.used_per_org("Photographer", " AcmeNews"), 1);
        assert!(!ledger.check("Photographer", "AcmeNews", 1, 1).available);
    }

    #[test]
    fn test_admit_counts_only_admitted() {
        let mut ledger = photographers(2, 0);
        assert!(ledger.admit("Photographer", "AcmeNews").available);
        assert!(ledger.admit("Photographer", "AcmeNews").available);
        assert!(!ledger.admit("Photographer", "AcmeNews").available);
        assert_eq!(ledger.used_per_org("Photographer", "AcmeNews"), 2);
    }
}
