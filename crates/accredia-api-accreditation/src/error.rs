//! Error types for the accreditation API.
//!
//! Uses RFC 7807 Problem Details for HTTP APIs. Only refusals that happen
//! before a batch starts are errors; row-level outcomes travel in the
//! [`BatchResponse`](crate::models::BatchResponse) body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::EngineError;
use crate::store::StoreError;

/// Base URL for error type URIs.
const ERROR_BASE_URL: &str = "https://accredia.dev/errors/accreditation";

/// RFC 7807 Problem Details structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI identifying the problem type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// Short human-readable summary.
    pub title: String,

    /// HTTP status code.
    pub status: u16,

    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// URI of the specific occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    #[must_use]
    pub fn new(error_type: &str, title: &str, status: StatusCode) -> Self {
        Self {
            error_type: format!("{ERROR_BASE_URL}/{error_type}"),
            title: title.to_string(),
            status: status.as_u16(),
            detail: None,
            instance: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

/// Accreditation API errors.
#[derive(Debug, Error)]
pub enum AccreditationApiError {
    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Accreditation closed: {0}")]
    AccreditationClosed(String),

    #[error("Empty batch")]
    EmptyBatch,

    #[error("Too many rows: {count} (max {max})")]
    TooManyRows { count: usize, max: usize },

    /// A route requiring a submitter was called anonymously.
    #[error("Unauthorized")]
    Unauthorized,

    /// Event or submitter lookup failed before the batch started.
    #[error("Service unavailable: {0}")]
    Unavailable(#[from] StoreError),
}

impl From<EngineError> for AccreditationApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::EventNotFound(id) => AccreditationApiError::EventNotFound(id.to_string()),
            EngineError::AccreditationClosed { reason } => {
                AccreditationApiError::AccreditationClosed(reason)
            }
            EngineError::EmptyBatch => AccreditationApiError::EmptyBatch,
            EngineError::TooManyRows { count, max } => {
                AccreditationApiError::TooManyRows { count, max }
            }
            EngineError::Unavailable(e) => AccreditationApiError::Unavailable(e),
        }
    }
}

impl AccreditationApiError {
    /// Convert to `ProblemDetails`.
    pub fn to_problem_details(&self) -> ProblemDetails {
        match self {
            AccreditationApiError::EventNotFound(id) => {
                ProblemDetails::new("event-not-found", "Event Not Found", StatusCode::NOT_FOUND)
                    .with_detail("The requested event was not found.")
                    .with_instance(format!("/events/{id}"))
            }

            AccreditationApiError::AccreditationClosed(reason) => ProblemDetails::new(
                "accreditation-closed",
                "Accreditation Closed",
                StatusCode::CONFLICT,
            )
            .with_detail(reason.clone()),

            AccreditationApiError::EmptyBatch => {
                ProblemDetails::new("empty-batch", "Empty Batch", StatusCode::BAD_REQUEST)
                    .with_detail("The batch contains no rows.")
            }

            AccreditationApiError::TooManyRows { count, max } => {
                ProblemDetails::new("too-many-rows", "Too Many Rows", StatusCode::BAD_REQUEST)
                    .with_detail(format!(
                        "The batch contains {count} rows; at most {max} are accepted per request."
                    ))
            }

            AccreditationApiError::Unauthorized => {
                ProblemDetails::new("unauthorized", "Unauthorized", StatusCode::UNAUTHORIZED)
                    .with_detail("Authentication required.")
            }

            AccreditationApiError::Unavailable(err) => {
                tracing::error!(error = %err, "Accreditation dependency unavailable");
                ProblemDetails::new(
                    "service-unavailable",
                    "Service Unavailable",
                    StatusCode::SERVICE_UNAVAILABLE,
                )
                .with_detail("A required service is unavailable. Please try again later.")
            }
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            AccreditationApiError::EventNotFound(_) => StatusCode::NOT_FOUND,
            AccreditationApiError::AccreditationClosed(_) => StatusCode::CONFLICT,
            AccreditationApiError::EmptyBatch | AccreditationApiError::TooManyRows { .. } => {
                StatusCode::BAD_REQUEST
            }
            AccreditationApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            AccreditationApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AccreditationApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let problem = self.to_problem_details();

        let mut response = (status, Json(problem)).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );

        response
    }
}
