//! accredia-db: PostgreSQL persistence for the accreditation engine.
//!
//! # Modules
//!
//! - [`pool`] - Connection pool wrapper ([`DbPool`])
//! - [`migrations`] - Embedded schema migrations
//! - [`models`] - Table models and queries
//! - [`error`] - [`DbError`]

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::DbPool;
