//! Accreditation submission handlers.
//!
//! - POST /events/:event_id/accreditations/bulk: all-or-nothing batch
//! - POST /events/:event_id/accreditations: single submission

use accredia_core::EventId;
use axum::{extract::Path, Extension, Json};
use std::sync::Arc;

use crate::error::AccreditationApiError;
use crate::models::{AuthenticatedUser, BatchCandidate, BatchResponse, BulkSubmitRequest};
use crate::services::AccreditationEngine;

/// POST /events/:event_id/accreditations/bulk
///
/// Row-level failures are reported in the body with status 200; only
/// refusals before the batch starts are Problem Details.
pub async fn submit_bulk(
    Extension(engine): Extension<Arc<AccreditationEngine>>,
    Path(event_id): Path<EventId>,
    submitter: Option<AuthenticatedUser>,
    Json(request): Json<BulkSubmitRequest>,
) -> Result<Json<BatchResponse>, AccreditationApiError> {
    let response = engine
        .submit_batch(event_id, &request.rows, submitter)
        .await?;
    Ok(Json(response))
}

/// POST /events/:event_id/accreditations
///
/// Links the authenticated submitter's account to the resolved Person.
pub async fn submit_single(
    Extension(engine): Extension<Arc<AccreditationEngine>>,
    Path(event_id): Path<EventId>,
    submitter: Option<AuthenticatedUser>,
    Json(candidate): Json<BatchCandidate>,
) -> Result<Json<BatchResponse>, AccreditationApiError> {
    let response = engine.submit_single(event_id, candidate, submitter).await?;
    Ok(Json(response))
}
