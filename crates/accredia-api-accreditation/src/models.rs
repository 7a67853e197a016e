//! Request/response models of the accreditation API.

use accredia_core::{AccreditationId, AttributeBag, QuotaScope, UserId};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One incoming row. Every field is optional on the wire so that missing
/// values surface as row-level `missing_fields` failures rather than as a
/// rejected request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchCandidate {
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub document_number: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Extra form fields plus reserved `__` metadata.
    #[serde(default)]
    pub extra: AttributeBag,
}

impl BatchCandidate {
    /// Human-readable label used in per-row results.
    #[must_use]
    pub fn identity_label(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let document = self
            .document_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (name.is_empty(), document) {
            (false, Some(doc)) => format!("{name} ({doc})"),
            (false, None) => name,
            (true, Some(doc)) => doc.to_string(),
            (true, None) => "(unidentified)".to_string(),
        }
    }
}

/// Body of `POST /events/:event_id/accreditations/bulk`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkSubmitRequest {
    pub rows: Vec<BatchCandidate>,
}

/// The authenticated caller, placed in request extensions by upstream middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

// ---------------------------------------------------------------------------
// Row failures
// ---------------------------------------------------------------------------

/// Why a row was not committed. Serialized as `{ "code", "message" }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFailure {
    /// Document, first name or last name absent.
    MissingFields { fields: Vec<&'static str> },
    /// Document type unknown or number malformed for its type.
    InvalidDocument { detail: String },
    InvalidEmail,
    /// Already accredited for this event.
    DuplicateInEvent,
    /// Same document as an earlier row (1-based) of this batch.
    DuplicateInBatch { first_row: usize },
    /// Email used by an earlier row (1-based) of this batch, or, when
    /// `first_row` is `None`, by an existing accreditation of the event.
    DuplicateEmail { first_row: Option<usize> },
    QuotaExceeded {
        media_type: String,
        organization: String,
        scope: QuotaScope,
        limit: u32,
    },
    /// Valid on its own; the batch failed because of other rows.
    Aborted,
    /// Storage or transaction failure, batch-wide.
    Infrastructure,
}

impl RowFailure {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            RowFailure::MissingFields { .. } => "missing_fields",
            RowFailure::InvalidDocument { .. } => "invalid_document",
            RowFailure::InvalidEmail => "invalid_email",
            RowFailure::DuplicateInEvent => "duplicate_in_event",
            RowFailure::DuplicateInBatch { .. } => "duplicate_in_batch",
            RowFailure::DuplicateEmail { .. } => "duplicate_email",
            RowFailure::QuotaExceeded { .. } => "quota_exceeded",
            RowFailure::Aborted => "aborted",
            RowFailure::Infrastructure => "infrastructure_error",
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            RowFailure::MissingFields { fields } => {
                format!("Missing required fields: {}", fields.join(", "))
            }
            RowFailure::InvalidDocument { detail } => format!("Invalid document: {detail}"),
            RowFailure::InvalidEmail => "Email address is malformed".to_string(),
            RowFailure::DuplicateInEvent => {
                "This person is already accredited for the event".to_string()
            }
            RowFailure::DuplicateInBatch { first_row } => {
                format!("Same document as row {first_row} of this batch")
            }
            RowFailure::DuplicateEmail {
                first_row: Some(row),
            } => format!("Same email as row {row} of this batch"),
            RowFailure::DuplicateEmail { first_row: None } => {
                "Email is already registered for the event".to_string()
            }
            RowFailure::QuotaExceeded {
                media_type,
                organization,
                scope: QuotaScope::Organization,
                limit,
            } => format!("Quota exceeded: at most {limit} '{media_type}' for '{organization}'"),
            RowFailure::QuotaExceeded {
                media_type,
                scope: QuotaScope::Global,
                limit,
                ..
            } => format!("Quota exceeded: at most {limit} '{media_type}' for the event"),
            RowFailure::Aborted => "aborted: sibling errors elsewhere in the batch".to_string(),
            RowFailure::Infrastructure => {
                "The batch could not be processed, please retry later".to_string()
            }
        }
    }
}

impl Serialize for RowFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RowFailure", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.message())?;
        state.end()
    }
}

/// Batch-wide failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rows were rejected before commit. The user can fix and resubmit.
    ValidationError,
    /// Storage was unavailable or a transaction failed.
    InfrastructureError,
    /// The commit itself reported mixed results; compensation ran.
    PartialCommitAnomaly,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Outcome of one row.
#[derive(Debug, Clone, Serialize)]
pub struct RowResult {
    /// 1-based position in the submitted list.
    pub row: usize,
    pub person_identity_label: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RowFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<AccreditationId>,
}

/// Outcome of a batch, rows sorted by submission order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub batch_id: Uuid,
    pub total: usize,
    pub success: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    pub results: Vec<RowResult>,
}

impl BatchResponse {
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.failure_kind.is_none()
    }

    /// Failure of a 1-based row, if any.
    #[must_use]
    pub fn failure_of(&self, row: usize) -> Option<&RowFailure> {
        self.results
            .iter()
            .find(|r| r.row == row)
            .and_then(|r| r.error.as_ref())
    }
}
