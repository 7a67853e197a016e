//! Router and state for the accreditation API.

use axum::{routing::post, Extension, Router};
use std::sync::Arc;

use crate::handlers;
use crate::services::AccreditationEngine;

/// Shared state for accreditation routes.
#[derive(Clone)]
pub struct AccreditationState {
    pub engine: Arc<AccreditationEngine>,
}

impl AccreditationState {
    pub fn new(engine: Arc<AccreditationEngine>) -> Self {
        Self { engine }
    }
}

/// Create the accreditation router.
///
/// - POST /events/:event_id/accreditations/bulk: submit a batch
/// - POST /events/:event_id/accreditations: submit one person
///
/// Authentication is left to the caller: install middleware that places an
/// [`AuthenticatedUser`](crate::models::AuthenticatedUser) in request
/// extensions.
pub fn accreditation_router(state: AccreditationState) -> Router {
    Router::new()
        .route(
            "/events/:event_id/accreditations/bulk",
            post(handlers::accreditations::submit_bulk),
        )
        .route(
            "/events/:event_id/accreditations",
            post(handlers::accreditations::submit_single),
        )
        .layer(Extension(state.engine))
}
