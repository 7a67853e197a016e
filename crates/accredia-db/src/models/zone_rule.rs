//! Zone auto-assignment rules. Read-only to the commit engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Maps a role or media type value to an access zone.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ZoneRule {
    pub id: Uuid,
    pub event_id: Uuid,
    /// `role` or `media_type`.
    pub match_field: String,
    pub match_value: String,
    pub zone: String,
    /// Evaluation order within the same match field.
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl ZoneRule {
    /// All rules of an event in evaluation order.
    pub async fn list_by_event(pool: &PgPool, event_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM zone_rules WHERE event_id = $1 ORDER BY position, created_at, id",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    /// Create a rule (administrative tooling and tests).
    pub async fn create(
        pool: &PgPool,
        event_id: Uuid,
        match_field: &str,
        match_value: &str,
        zone: &str,
        position: i32,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO zone_rules (event_id, match_field, match_value, zone, position)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            ",
        )
        .bind(event_id)
        .bind(match_field)
        .bind(match_value)
        .bind(zone)
        .bind(position)
        .fetch_one(pool)
        .await
    }
}
