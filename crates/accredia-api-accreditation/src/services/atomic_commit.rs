//! The only writer of accreditation records.

use std::sync::Arc;
use thiserror::Error;

use crate::store::{AccreditationStore, CommitRequest, CommitRowResult, StoreError};

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("commit failed: {0}")]
    Store(#[from] StoreError),

    /// The store answered with a result vector of the wrong length. Any
    /// successes it did report still need compensating.
    #[error("commit returned {got} results for {expected} rows")]
    Misaligned {
        expected: usize,
        got: usize,
        results: Vec<CommitRowResult>,
    },
}

pub struct AtomicCommit {
    store: Arc<dyn AccreditationStore>,
}

impl AtomicCommit {
    pub fn new(store: Arc<dyn AccreditationStore>) -> Self {
        Self { store }
    }

    /// Commit a validated batch in one storage call.
    ///
    /// The returned vector is positionally aligned with `request.rows`.
    pub async fn commit(
        &self,
        request: &CommitRequest,
    ) -> Result<Vec<CommitRowResult>, CommitError> {
        let results = self.store.commit(request).await?;
        if results.len() != request.rows.len() {
            return Err(CommitError::Misaligned {
                expected: request.rows.len(),
                got: results.len(),
                results,
            });
        }
        Ok(results)
    }
}
