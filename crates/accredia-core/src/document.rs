//! Document identity.
//!
//! A Person is identified platform-wide by the pair (document type,
//! normalized document number). Normalization makes the lookup
//! case- and punctuation-insensitive, so `12.345.678-k` and `12345678K`
//! resolve to the same identity.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{AccrediaError, Result};

/// National ID: 6 to 8 digits followed by a digit or `K` check character.
static NATIONAL_ID_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[0-9]{6,8}[0-9K]$").expect("NATIONAL_ID_RE is a valid regex pattern")
});

/// Foreign ID (passport or foreign identity card): 5 to 20 alphanumerics.
static FOREIGN_ID_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Z0-9]{5,20}$").expect("FOREIGN_ID_RE is a valid regex pattern")
});

/// Kind of identity document a candidate presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Domestic national identity number.
    NationalId,
    /// Passport or foreign identity document.
    ForeignId,
}

impl DocumentType {
    /// Database / wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::NationalId => "national_id",
            DocumentType::ForeignId => "foreign_id",
        }
    }

    /// Nationality implied by presenting this kind of document.
    #[must_use]
    pub fn implied_nationality(&self) -> Nationality {
        match self {
            DocumentType::NationalId => Nationality::Domestic,
            DocumentType::ForeignId => Nationality::Foreign,
        }
    }
}

impl Display for DocumentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = AccrediaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "national_id" | "national" | "rut" => Ok(DocumentType::NationalId),
            "foreign_id" | "foreign" | "passport" => Ok(DocumentType::ForeignId),
            other => Err(AccrediaError::validation(
                "document_type",
                format!("unknown document type '{other}', expected 'national_id' or 'foreign_id'"),
            )),
        }
    }
}

/// Nationality inferred from the document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nationality {
    Domestic,
    Foreign,
}

impl Nationality {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Nationality::Domestic => "domestic",
            Nationality::Foreign => "foreign",
        }
    }
}

impl FromStr for Nationality {
    type Err = AccrediaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "domestic" => Ok(Nationality::Domestic),
            "foreign" => Ok(Nationality::Foreign),
            other => Err(AccrediaError::validation(
                "nationality",
                format!("unknown nationality '{other}'"),
            )),
        }
    }
}

/// Normalize a raw document number: uppercase, ASCII alphanumerics only.
#[must_use]
pub fn normalize_document_number(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// The unique identity key of a Person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    pub document_type: DocumentType,
    /// Normalized document number.
    pub number: String,
}

impl DocumentKey {
    /// Build a key from a raw, user-entered document number.
    #[must_use]
    pub fn new(document_type: DocumentType, raw_number: &str) -> Self {
        Self {
            document_type,
            number: normalize_document_number(raw_number),
        }
    }

    /// Check the normalized number against the format of its declared type.
    pub fn validate_format(&self) -> Result<()> {
        let (re, expected) = match self.document_type {
            DocumentType::NationalId => (&*NATIONAL_ID_RE, "7-9 digits, optionally ending in K"),
            DocumentType::ForeignId => (&*FOREIGN_ID_RE, "5-20 letters or digits"),
        };
        if re.is_match(&self.number) {
            Ok(())
        } else {
            Err(AccrediaError::validation(
                "document_number",
                format!(
                    "'{}' is not a valid {} ({expected})",
                    self.number, self.document_type
                ),
            ))
        }
    }
}

impl Display for DocumentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.document_type, self.number)
    }
}
