//! Accreditation event configuration, as far as the commit engine needs it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// An event collecting accreditation requests.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccreditationEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// Keys of the event's dynamic form fields.
    pub form_fields: Vec<String>,
    /// Submissions are refused after this instant.
    pub deadline: Option<DateTime<Utc>>,
    /// Manual open/close switch.
    pub accreditation_open: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create an event.
#[derive(Debug, Clone)]
pub struct CreateAccreditationEvent {
    pub tenant_id: Uuid,
    pub name: String,
    pub form_fields: Vec<String>,
    pub deadline: Option<DateTime<Utc>>,
}

impl AccreditationEvent {
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM accreditation_events WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &PgPool, data: CreateAccreditationEvent) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO accreditation_events (tenant_id, name, form_fields, deadline)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(data.tenant_id)
        .bind(&data.name)
        .bind(&data.form_fields)
        .bind(data.deadline)
        .fetch_one(pool)
        .await
    }

    /// Open or close accreditation manually.
    pub async fn set_open(pool: &PgPool, id: Uuid, open: bool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE accreditation_events SET accreditation_open = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(open)
        .execute(pool)
        .await?;
        Ok(())
    }
}
