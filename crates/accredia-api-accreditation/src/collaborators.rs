//! Collaborators the engine consumes but does not own: event configuration,
//! submitter attribution, reusable profile data and the audit trail.

use accredia_core::{AttributeBag, EventId, PersonId, ProfileId, QuotaLimit, TenantId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::store::StoreError;

/// Attribute a zone rule matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneMatchField {
    Role,
    MediaType,
}

impl ZoneMatchField {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneMatchField::Role => "role",
            ZoneMatchField::MediaType => "media_type",
        }
    }
}

impl FromStr for ZoneMatchField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "role" => Ok(ZoneMatchField::Role),
            "media_type" => Ok(ZoneMatchField::MediaType),
            other => Err(format!("unknown zone match field '{other}'")),
        }
    }
}

/// A configured zone rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRule {
    pub match_field: ZoneMatchField,
    pub match_value: String,
    pub zone: String,
    /// Lower positions are evaluated first.
    pub position: i32,
}

/// Whether an event currently accepts submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccreditationWindow {
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Everything the engine needs to know about an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub name: String,
    pub quota_rules: Vec<QuotaLimit>,
    pub zone_rules: Vec<ZoneRule>,
    /// Keys of the event's dynamic form fields.
    pub form_fields: Vec<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub accreditation_open: bool,
}

impl EventConfig {
    /// A new open event without rules, deadline or form fields.
    #[must_use]
    pub fn new(id: EventId, tenant_id: TenantId, name: impl Into<String>) -> Self {
        Self {
            id,
            tenant_id,
            name: name.into(),
            quota_rules: Vec::new(),
            zone_rules: Vec::new(),
            form_fields: Vec::new(),
            deadline: None,
            accreditation_open: true,
        }
    }

    /// Is accreditation closed at `now`?
    #[must_use]
    pub fn accreditation_window(&self, now: DateTime<Utc>) -> AccreditationWindow {
        if !self.accreditation_open {
            return AccreditationWindow {
                closed: true,
                reason: Some("Accreditation has been closed by the organizer".to_string()),
            };
        }
        match self.deadline {
            Some(deadline) if now > deadline => AccreditationWindow {
                closed: true,
                reason: Some(format!(
                    "The accreditation deadline passed on {}",
                    deadline.format("%Y-%m-%d %H:%M UTC")
                )),
            },
            _ => AccreditationWindow {
                closed: false,
                reason: None,
            },
        }
    }
}

/// A submitter profile batches can be attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitterProfile {
    pub id: ProfileId,
    pub user_id: UserId,
    pub tenant_id: Option<TenantId>,
    pub display_name: String,
}

/// Event configuration lookup.
#[async_trait]
pub trait EventDirectory: Send + Sync {
    async fn get_event(&self, event_id: EventId) -> Result<Option<EventConfig>, StoreError>;
}

/// Authenticated-submitter resolution.
#[async_trait]
pub trait SubmitterDirectory: Send + Sync {
    async fn is_super_admin(&self, user_id: UserId) -> Result<bool, StoreError>;

    async fn profile_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<SubmitterProfile>, StoreError>;
}

/// Reusable profile data persistence.
#[async_trait]
pub trait ProfileDataSink: Send + Sync {
    /// Merge `data` into the Person's data for `tenant_id`. Only keys listed
    /// in `form_keys` are kept; reserved keys never are.
    async fn save_tenant_profile_data(
        &self,
        person_id: PersonId,
        tenant_id: TenantId,
        data: &AttributeBag,
        form_keys: &[String],
    ) -> Result<(), StoreError>;
}

/// Audit trail.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_action(
        &self,
        actor_id: Option<UserId>,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event() -> EventConfig {
        EventConfig::new(EventId::new(), TenantId::new(), "Grand Prix")
    }

    #[test]
    fn test_open_event_without_deadline() {
        let window = event().accreditation_window(Utc::now());
        assert!(!window.closed);
        assert!(window.reason.is_none());
    }

    #[test]
    fn test_manually_closed_event() {
        let mut event = event();
        event.accreditation_open = false;
        let window = event.accreditation_window(Utc::now());
        assert!(window.closed);
        assert!(window.reason.unwrap().contains("closed"));
    }

    #[test]
    fn test_deadline_passed() {
        let mut event = event();
        let now = Utc::now();
        event.deadline = Some(now - Duration::hours(1));
        assert!(event.accreditation_window(now).closed);

        event.deadline = Some(now + Duration::hours(1));
        assert!(!event.accreditation_window(now).closed);
    }

    #[test]
    fn test_zone_match_field_parse() {
        assert_eq!("role".parse::<ZoneMatchField>(), Ok(ZoneMatchField::Role));
        assert_eq!(
            "media_type".parse::<ZoneMatchField>(),
            Ok(ZoneMatchField::MediaType)
        );
        assert!("cargo".parse::<ZoneMatchField>().is_err());
    }
}
