//! Per-event, per-media-type quota rules. Read-only to the commit engine.

use accredia_core::QuotaLimit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

/// A quota rule. `0` means unlimited for that dimension.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuotaRule {
    pub id: Uuid,
    pub event_id: Uuid,
    pub media_type: String,
    pub max_per_organization: i32,
    pub max_global: i32,
    pub created_at: DateTime<Utc>,
}

impl QuotaRule {
    /// All rules of an event.
    pub async fn list_by_event(pool: &PgPool, event_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM quota_rules WHERE event_id = $1 ORDER BY media_type")
            .bind(event_id)
            .fetch_all(pool)
            .await
    }

    /// Lock the rules of the given (normalized) media types for the rest of
    /// the transaction. Rows are locked in a stable order to avoid deadlocks
    /// between concurrent batches.
    pub async fn lock_for_media_types(
        conn: &mut PgConnection,
        event_id: Uuid,
        media_types: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM quota_rules
            WHERE event_id = $1 AND lower(btrim(media_type)) = ANY($2)
            ORDER BY lower(btrim(media_type))
            FOR UPDATE
            ",
        )
        .bind(event_id)
        .bind(media_types)
        .fetch_all(conn)
        .await
    }

    /// Create a rule (administrative tooling and tests).
    pub async fn create(
        pool: &PgPool,
        event_id: Uuid,
        media_type: &str,
        max_per_organization: i32,
        max_global: i32,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO quota_rules (event_id, media_type, max_per_organization, max_global)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(event_id)
        .bind(media_type)
        .bind(max_per_organization)
        .bind(max_global)
        .fetch_one(pool)
        .await
    }

    /// Convert to the engine's limit type. Negative values are treated as unlimited.
    #[must_use]
    pub fn to_limit(&self) -> QuotaLimit {
        QuotaLimit {
            media_type: self.media_type.clone(),
            max_per_organization: u32::try_from(self.max_per_organization).unwrap_or(0),
            max_global: u32::try_from(self.max_global).unwrap_or(0),
        }
    }
}
