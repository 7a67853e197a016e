//! Accreditation record model.
//!
//! One row per (event, person). Rows are only ever inserted through
//! [`Accreditation::commit_batch`], which enforces quotas and per-event
//! uniqueness inside a single transaction.

use accredia_core::{QuotaLedger, QuotaScope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::quota_rule::QuotaRule;

/// An accreditation record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Accreditation {
    pub id: Uuid,
    pub event_id: Uuid,
    pub person_id: Uuid,
    pub organization: String,
    pub media_type: String,
    pub role: String,
    /// Email given on submission, used for per-event email deduplication.
    pub contact_email: Option<String>,
    /// Assigned access zone; `None` means manual assignment pending.
    pub zone: Option<String>,
    /// Extra form fields submitted with the request.
    pub extra: serde_json::Value,
    /// pending, approved, rejected, `under_review`.
    pub status: String,
    /// Submitter profile the batch is attributed to.
    pub submitted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of a batch insert.
#[derive(Debug, Clone)]
pub struct CreateAccreditation {
    pub person_id: Uuid,
    pub organization: String,
    pub media_type: String,
    pub role: String,
    pub contact_email: Option<String>,
    pub zone: Option<String>,
    pub extra: serde_json::Value,
}

/// Per-row outcome of [`Accreditation::commit_batch`], aligned with the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchInsertStatus {
    /// Row inserted and committed.
    Inserted(Uuid),
    /// The person already holds an accreditation for this event.
    DuplicateInEvent,
    /// Admitting the row would exceed the given limit.
    QuotaExceeded { scope: QuotaScope, limit: u32 },
    /// Row was valid but the transaction rolled back because of another row.
    Aborted,
}

/// Committed usage of one (media type, organization) pair.
#[derive(Debug, Clone, FromRow)]
pub struct QuotaUsageRow {
    pub media_type: String,
    pub organization: String,
    pub used: i64,
}

impl Accreditation {
    /// Find an event's accreditation for a person.
    pub async fn find_by_event_and_person(
        pool: &PgPool,
        event_id: Uuid,
        person_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM accreditations WHERE event_id = $1 AND person_id = $2")
            .bind(event_id)
            .bind(person_id)
            .fetch_optional(pool)
            .await
    }

    /// Which of `person_ids` already hold an accreditation for the event.
    pub async fn accredited_person_ids(
        pool: &PgPool,
        event_id: Uuid,
        person_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT person_id FROM accreditations WHERE event_id = $1 AND person_id = ANY($2)",
        )
        .bind(event_id)
        .bind(person_ids)
        .fetch_all(pool)
        .await
    }

    /// Which of the (lowercased) `emails` are already used in the event.
    pub async fn registered_emails(
        pool: &PgPool,
        event_id: Uuid,
        emails: &[String],
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT DISTINCT lower(contact_email) FROM accreditations
            WHERE event_id = $1 AND lower(contact_email) = ANY($2)
            ",
        )
        .bind(event_id)
        .bind(emails)
        .fetch_all(pool)
        .await
    }

    /// Committed usage per (media type, organization), rejected records excluded.
    pub async fn quota_usage(
        pool: &PgPool,
        event_id: Uuid,
    ) -> Result<Vec<QuotaUsageRow>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT lower(btrim(media_type)) AS media_type,
                   lower(btrim(organization)) AS organization,
                   COUNT(*) AS used
            FROM accreditations
            WHERE event_id = $1 AND status <> 'rejected'
            GROUP BY 1, 2
            ",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    /// Insert a whole batch in one transaction.
    ///
    /// An event-scoped advisory lock is taken first, then the quota rule rows
    /// of every touched media type are locked `FOR UPDATE` (in media type
    /// order) before usage is counted, so concurrent batches for the same
    /// event and media type are serialized. Per-event
    /// uniqueness is enforced by the `(event_id, person_id)` constraint.
    /// If any row fails, the transaction is rolled back and every other row
    /// reports [`BatchInsertStatus::Aborted`].
    pub async fn commit_batch(
        pool: &PgPool,
        event_id: Uuid,
        rows: &[CreateAccreditation],
        submitted_by: Option<Uuid>,
    ) -> Result<Vec<BatchInsertStatus>, sqlx::Error> {
        let mut media_types: Vec<String> = rows
            .iter()
            .map(|r| accredia_core::normalize_label(&r.media_type))
            .collect();
        media_types.sort();
        media_types.dedup();

        let mut tx = pool.begin().await?;

        // Serializes duplicate detection for the event across concurrent batches.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(event_id.to_string())
            .execute(&mut *tx)
            .await?;

        let rules = QuotaRule::lock_for_media_types(&mut *tx, event_id, &media_types).await?;
        let mut ledger = QuotaLedger::new(rules.iter().map(QuotaRule::to_limit));

        let usage: Vec<QuotaUsageRow> = sqlx::query_as(
            r"
            SELECT lower(btrim(media_type)) AS media_type,
                   lower(btrim(organization)) AS organization,
                   COUNT(*) AS used
            FROM accreditations
            WHERE event_id = $1 AND status <> 'rejected'
              AND lower(btrim(media_type)) = ANY($2)
            GROUP BY 1, 2
            ",
        )
        .bind(event_id)
        .bind(&media_types)
        .fetch_all(&mut *tx)
        .await?;
        for row in &usage {
            ledger.record(
                &row.media_type,
                &row.organization,
                u32::try_from(row.used).unwrap_or(u32::MAX),
            );
        }

        let mut statuses = Vec::with_capacity(rows.len());
        let mut failed = false;

        for row in rows {
            let inserted: Option<Uuid> = sqlx::query_scalar(
                r"
                INSERT INTO accreditations (
                    event_id, person_id, organization, media_type, role,
                    contact_email, zone, extra, status, submitted_by
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9)
                ON CONFLICT (event_id, person_id) DO NOTHING
                RETURNING id
                ",
            )
            .bind(event_id)
            .bind(row.person_id)
            .bind(&row.organization)
            .bind(&row.media_type)
            .bind(&row.role)
            .bind(&row.contact_email)
            .bind(&row.zone)
            .bind(&row.extra)
            .bind(submitted_by)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(id) = inserted else {
                statuses.push(BatchInsertStatus::DuplicateInEvent);
                failed = true;
                continue;
            };

            let check = ledger.admit(&row.media_type, &row.organization);
            match (check.exceeded, check.exceeded_limit()) {
                (Some(scope), Some(limit)) => {
                    statuses.push(BatchInsertStatus::QuotaExceeded { scope, limit });
                    failed = true;
                }
                _ => statuses.push(BatchInsertStatus::Inserted(id)),
            }
        }

        if failed {
            tx.rollback().await?;
            for status in &mut statuses {
                if matches!(status, BatchInsertStatus::Inserted(_)) {
                    *status = BatchInsertStatus::Aborted;
                }
            }
            tracing::info!(
                event_id = %event_id,
                row_count = rows.len(),
                "Batch insert rolled back"
            );
        } else {
            tx.commit().await?;
        }

        Ok(statuses)
    }

    /// Delete accreditations by id, never touching rows of another event.
    pub async fn delete_in_event(
        pool: &PgPool,
        event_id: Uuid,
        ids: &[Uuid],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM accreditations WHERE event_id = $1 AND id = ANY($2)")
            .bind(event_id)
            .bind(ids)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of accreditations in an event.
    pub async fn count_by_event(pool: &PgPool, event_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM accreditations WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(pool)
            .await
    }
}
