//! Accreditation commit engine.
//!
//! Turns a list of candidate rows (from a bulk upload or a single form
//! submission) into accreditation records for one event, all-or-nothing:
//! either every row is committed or nothing is, and each row gets its own
//! result. Persons are resolved or created by document, rows are validated
//! against duplicates and quotas, the batch is inserted in one locking
//! transaction, and side effects of a failed batch are compensated.
//!
//! # Example
//!
//! ```rust,ignore
//! use accredia_api_accreditation::{
//!     accreditation_router, AccreditationEngine, AccreditationState, EngineConfig,
//!     PgAccreditationStore,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(PgAccreditationStore::new(pool));
//! let engine = Arc::new(AccreditationEngine::with_backend(store, EngineConfig::default()));
//! let app = axum::Router::new().merge(accreditation_router(AccreditationState::new(engine)));
//! ```

pub mod collaborators;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;
pub mod validation;

pub use collaborators::{
    AuditSink, EventConfig, EventDirectory, ProfileDataSink, SubmitterDirectory,
    SubmitterProfile, ZoneMatchField, ZoneRule,
};
pub use error::{AccreditationApiError, ProblemDetails};
pub use models::{
    AuthenticatedUser, BatchCandidate, BatchResponse, BulkSubmitRequest, FailureKind, RowFailure,
    RowResult,
};
pub use router::{accreditation_router, AccreditationState};
pub use services::{AccreditationEngine, Collaborators, EngineConfig, EngineError};
pub use store::{
    AccreditationStore, InMemoryAccreditationStore, PgAccreditationStore, StoreError,
};
