//! Engine components, leaves first.

pub mod atomic_commit;
pub mod batch_validator;
pub mod compensator;
pub mod engine;
pub mod identity_resolver;
pub mod quota_evaluator;
pub mod zone_resolver;

pub use atomic_commit::{AtomicCommit, CommitError};
pub use batch_validator::{EventFacts, ValidationReport, ValidationRow};
pub use compensator::{CompensationSummary, Compensator};
pub use engine::{
    AccreditationEngine, BatchState, Collaborators, EngineConfig, EngineError,
    DEFAULT_IDENTITY_CHUNK_SIZE, DEFAULT_MAX_BATCH_ROWS,
};
pub use identity_resolver::{
    IdentityAttributes, IdentityError, IdentityRequest, IdentityResolver, ResolvedIdentities,
};
pub use quota_evaluator::QuotaEvaluator;
pub use zone_resolver::ZoneResolver;
