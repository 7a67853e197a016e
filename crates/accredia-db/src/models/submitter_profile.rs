//! Submitter profiles, used to attribute batches to the account that sent them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubmitterProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub display_name: String,
    pub is_super_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl SubmitterProfile {
    pub async fn find_by_user_id(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM submitter_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
        display_name: &str,
        is_super_admin: bool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO submitter_profiles (user_id, tenant_id, display_name, is_super_admin)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(display_name)
        .bind(is_super_admin)
        .fetch_one(pool)
        .await
    }
}
