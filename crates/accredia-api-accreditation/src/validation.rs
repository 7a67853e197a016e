//! Row-local validation helpers: required fields, document format, email.
//!
//! These checks need nothing but the row itself and run before any storage
//! access.

use accredia_core::{AccrediaError, DocumentKey, DocumentType};

use crate::models::{BatchCandidate, RowFailure};

/// Maximum email length per RFC 5321.
const MAX_EMAIL_LENGTH: usize = 254;

/// Validate an email address format.
///
/// Practical check consistent with RFC 5322 basics: exactly one `@`,
/// non-empty local part, a dotted domain, no whitespace, bounded length.
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is empty".to_string());
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(format!(
            "Email exceeds maximum length of {MAX_EMAIL_LENGTH} characters"
        ));
    }

    if email.contains(char::is_whitespace) {
        return Err("Email contains whitespace".to_string());
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err("Email must contain exactly one '@'".to_string());
    };

    if domain.contains('@') {
        return Err("Email must contain exactly one '@'".to_string());
    }

    if local.is_empty() {
        return Err("Email local part is empty".to_string());
    }

    if domain.is_empty() || !domain.contains('.') {
        return Err("Email domain must contain at least one '.'".to_string());
    }

    if domain.starts_with(['.', '-']) || domain.ends_with(['.', '-']) || domain.contains("..") {
        return Err("Email domain is malformed".to_string());
    }

    Ok(())
}

/// Trimmed value, `None` when absent or blank.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A candidate after row-local checks.
#[derive(Debug, Clone)]
pub struct CheckedRow {
    /// Identity key, present when the document parsed and is well-formed.
    pub key: Option<DocumentKey>,
    /// Lowercased email, present when supplied and well-formed.
    pub email: Option<String>,
    /// First failing row-local check, in precedence order.
    pub failure: Option<RowFailure>,
}

/// Run the row-local checks in precedence order: required fields, document
/// format, email format.
#[must_use]
pub fn check_row(candidate: &BatchCandidate) -> CheckedRow {
    let document_type = non_blank(candidate.document_type.as_deref());
    let document_number = non_blank(candidate.document_number.as_deref());

    let mut missing = Vec::new();
    if document_type.is_none() || document_number.is_none() {
        missing.push("document");
    }
    if non_blank(candidate.first_name.as_deref()).is_none() {
        missing.push("first_name");
    }
    if non_blank(candidate.last_name.as_deref()).is_none() {
        missing.push("last_name");
    }

    let key = match (document_type, document_number) {
        (Some(kind), Some(number)) => parse_document(kind, number),
        _ => Err(RowFailure::MissingFields {
            fields: vec!["document"],
        }),
    };

    let email = non_blank(candidate.email.as_deref());
    let email_ok = email.map(validate_email).transpose().is_ok();

    let failure = if !missing.is_empty() {
        Some(RowFailure::MissingFields { fields: missing })
    } else if let Err(failure) = &key {
        Some(failure.clone())
    } else if !email_ok {
        Some(RowFailure::InvalidEmail)
    } else {
        None
    };

    CheckedRow {
        key: key.ok(),
        email: email.filter(|_| email_ok).map(str::to_lowercase),
        failure,
    }
}

fn parse_document(kind: &str, number: &str) -> Result<DocumentKey, RowFailure> {
    let document_type: DocumentType = kind.parse().map_err(invalid_document)?;
    let key = DocumentKey::new(document_type, number);
    if key.number.is_empty() {
        return Err(RowFailure::MissingFields {
            fields: vec!["document"],
        });
    }
    key.validate_format().map_err(invalid_document)?;
    Ok(key)
}

fn invalid_document(err: AccrediaError) -> RowFailure {
    let detail = match err {
        AccrediaError::ValidationError { message, .. } => message,
        other => other.to_string(),
    };
    RowFailure::InvalidDocument { detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> BatchCandidate {
        BatchCandidate {
            document_type: Some("national_id".to_string()),
            document_number: Some("12.345.678-5".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            email: Some("Ada@Example.com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_emails() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.org").is_ok());
    }

    #[test]
    fn test_invalid_emails() {
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("two@@example.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@localhost").is_err());
        assert!(validate_email("user@.example.com").is_err());
        assert!(validate_email("user@example..com").is_err());
        assert!(validate_email("us er@example.com").is_err());
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(validate_email(&long).is_err());
    }

    #[test]
    fn test_valid_row_normalizes_document_and_email() {
        let checked = check_row(&candidate());
        assert!(checked.failure.is_none());
        assert_eq!(checked.key.unwrap().number, "123456785");
        assert_eq!(checked.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_missing_fields_listed_together() {
        let mut row = candidate();
        row.document_number = Some("  ".to_string());
        row.last_name = None;
        let checked = check_row(&row);
        assert_eq!(
            checked.failure,
            Some(RowFailure::MissingFields {
                fields: vec!["document", "last_name"]
            })
        );
    }

    #[test]
    fn test_missing_fields_take_precedence_over_bad_email() {
        let mut row = candidate();
        row.first_name = Some(String::new());
        row.email = Some("broken".to_string());
        let checked = check_row(&row);
        assert!(matches!(
            checked.failure,
            Some(RowFailure::MissingFields { .. })
        ));
    }

    #[test]
    fn test_unknown_document_type_is_invalid_document() {
        let mut row = candidate();
        row.document_type = Some("driver_license".to_string());
        assert!(matches!(
            check_row(&row).failure,
            Some(RowFailure::InvalidDocument { .. })
        ));
    }

    #[test]
    fn test_malformed_document_number() {
        let mut row = candidate();
        row.document_number = Some("12K45".to_string());
        let checked = check_row(&row);
        assert!(checked.key.is_none());
        assert!(matches!(
            checked.failure,
            Some(RowFailure::InvalidDocument { .. })
        ));
    }

    #[test]
    fn test_punctuation_only_document_counts_as_missing() {
        let mut row = candidate();
        row.document_number = Some("--..".to_string());
        assert_eq!(
            check_row(&row).failure,
            Some(RowFailure::MissingFields {
                fields: vec!["document"]
            })
        );
    }

    #[test]
    fn test_bad_email_after_valid_document() {
        let mut row = candidate();
        row.email = Some("ada.example.com".to_string());
        let checked = check_row(&row);
        assert_eq!(checked.failure, Some(RowFailure::InvalidEmail));
        assert!(checked.email.is_none());
        assert!(checked.key.is_some());
    }

    #[test]
    fn test_blank_email_is_optional() {
        let mut row = candidate();
        row.email = Some("   ".to_string());
        let checked = check_row(&row);
        assert!(checked.failure.is_none());
        assert!(checked.email.is_none());
    }
}
