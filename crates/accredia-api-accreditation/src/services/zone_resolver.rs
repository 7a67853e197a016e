//! Zone auto-assignment.

use accredia_core::normalize_label;

use crate::collaborators::{ZoneMatchField, ZoneRule};

/// Pure resolver over one event's zone rules.
///
/// A rule matching the role wins over a rule matching the media type.
/// Within a field, the rule with the lowest position wins.
#[derive(Debug, Clone, Default)]
pub struct ZoneResolver {
    by_role: Vec<(String, String)>,
    by_media_type: Vec<(String, String)>,
}

impl ZoneResolver {
    #[must_use]
    pub fn new(rules: &[ZoneRule]) -> Self {
        let mut ordered: Vec<&ZoneRule> = rules.iter().collect();
        ordered.sort_by_key(|r| r.position);

        let mut resolver = Self::default();
        for rule in ordered {
            let entry = (normalize_label(&rule.match_value), rule.zone.clone());
            match rule.match_field {
                ZoneMatchField::Role => resolver.by_role.push(entry),
                ZoneMatchField::MediaType => resolver.by_media_type.push(entry),
            }
        }
        resolver
    }

    /// The zone for a candidate, or `None` to leave it for manual assignment.
    #[must_use]
    pub fn resolve_zone(&self, role: Option<&str>, media_type: Option<&str>) -> Option<String> {
        Self::first_match(&self.by_role, role)
            .or_else(|| Self::first_match(&self.by_media_type, media_type))
    }

    fn first_match(rules: &[(String, String)], value: Option<&str>) -> Option<String> {
        let value = normalize_label(value?);
        if value.is_empty() {
            return None;
        }
        rules
            .iter()
            .find(|(match_value, _)| *match_value == value)
            .map(|(_, zone)| zone.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(field: ZoneMatchField, value: &str, zone: &str, position: i32) -> ZoneRule {
        ZoneRule {
            match_field: field,
            match_value: value.to_string(),
            zone: zone.to_string(),
            position,
        }
    }

    fn resolver() -> ZoneResolver {
        ZoneResolver::new(&[
            rule(ZoneMatchField::MediaType, "Photographer", "Pitch", 0),
            rule(ZoneMatchField::Role, "Chief Editor", "VIP", 1),
            rule(ZoneMatchField::MediaType, "TV", "Broadcast", 2),
        ])
    }

    #[test]
    fn test_role_match_wins_over_media_type() {
        assert_eq!(
            resolver().resolve_zone(Some("Chief Editor"), Some("Photographer")),
            Some("VIP".to_string())
        );
    }

    #[test]
    fn test_media_type_fallback() {
        assert_eq!(
            resolver().resolve_zone(Some("Intern"), Some("photographer ")),
            Some("Pitch".to_string())
        );
    }

    #[test]
    fn test_no_match_is_unassigned() {
        assert_eq!(resolver().resolve_zone(Some("Intern"), Some("Radio")), None);
        assert_eq!(resolver().resolve_zone(None, None), None);
        assert_eq!(resolver().resolve_zone(Some("  "), None), None);
    }

    #[test]
    fn test_lowest_position_wins_for_same_value() {
        let resolver = ZoneResolver::new(&[
            rule(ZoneMatchField::Role, "staff", "Backstage", 5),
            rule(ZoneMatchField::Role, "Staff", "General", 1),
        ]);
        assert_eq!(
            resolver.resolve_zone(Some("STAFF"), None),
            Some("General".to_string())
        );
    }
}
