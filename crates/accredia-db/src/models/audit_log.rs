//! Append-only audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Data required to append an audit entry.
#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
}

impl AuditLog {
    pub async fn create(pool: &PgPool, data: &CreateAuditLog) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO audit_logs (actor_id, action, entity_type, entity_id, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            ",
        )
        .bind(data.actor_id)
        .bind(&data.action)
        .bind(&data.entity_type)
        .bind(&data.entity_id)
        .bind(&data.payload)
        .fetch_one(pool)
        .await
    }

    /// Entries for one entity, newest first.
    pub async fn list_by_entity(
        pool: &PgPool,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM audit_logs
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY created_at DESC
            ",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(pool)
        .await
    }
}
