//! Person identity model.
//!
//! A Person is keyed platform-wide by (document type, normalized document
//! number). Rows are created on first sighting, merged non-destructively on
//! later sightings, and only deleted when a failed batch leaves them
//! unreferenced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A person identity record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,

    /// `national_id` or `foreign_id`.
    pub document_type: String,

    /// Normalized document number.
    pub document_number: String,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub media_type: Option<String>,

    /// `domestic` or `foreign`, inferred from the document type.
    pub nationality: Option<String>,

    /// Reusable profile data namespaced per tenant: `{ "<tenant_id>": { ... } }`.
    pub tenant_data: serde_json::Value,

    /// Linked authenticated account, if any.
    pub user_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a Person.
#[derive(Debug, Clone, Default)]
pub struct CreatePerson {
    pub document_type: String,
    pub document_number: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub media_type: Option<String>,
    pub nationality: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Non-destructive update: `None` leaves the stored value untouched.
///
/// `user_id` only fills an empty account link, it never replaces one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub media_type: Option<String>,
    pub nationality: Option<String>,
    pub user_id: Option<Uuid>,
}

impl PersonPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A row returned by [`Person::insert_or_fetch_many`].
#[derive(Debug, Clone, FromRow)]
pub struct UpsertedPerson {
    #[sqlx(flatten)]
    pub person: Person,
    /// True when this statement created the row.
    pub inserted: bool,
}

/// Partial unique index holding one Person per linked account.
pub const ACCOUNT_LINK_CONSTRAINT: &str = "uq_persons_user";

/// True when `err` is a violation of [`ACCOUNT_LINK_CONSTRAINT`].
#[must_use]
pub fn is_account_link_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.constraint() == Some(ACCOUNT_LINK_CONSTRAINT),
        _ => false,
    }
}

impl Person {
    /// Batched lookup by (document type, document number) pairs.
    pub async fn find_by_documents(
        pool: &PgPool,
        document_types: &[String],
        document_numbers: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT p.* FROM persons p
            JOIN UNNEST($1::text[], $2::text[]) AS d(document_type, document_number)
              ON p.document_type = d.document_type AND p.document_number = d.document_number
            ",
        )
        .bind(document_types)
        .bind(document_numbers)
        .fetch_all(pool)
        .await
    }

    /// Batched insert. Rows whose document already exists (for example
    /// created by a concurrent request) are returned unchanged with
    /// `inserted = false`.
    ///
    /// Callers must not pass the same document twice in one call.
    pub async fn insert_or_fetch_many(
        pool: &PgPool,
        rows: &[CreatePerson],
    ) -> Result<Vec<UpsertedPerson>, sqlx::Error> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let column = |f: fn(&CreatePerson) -> Option<String>| -> Vec<Option<String>> {
            rows.iter().map(f).collect()
        };
        let document_types: Vec<String> = rows.iter().map(|r| r.document_type.clone()).collect();
        let document_numbers: Vec<String> =
            rows.iter().map(|r| r.document_number.clone()).collect();
        let user_ids: Vec<Option<Uuid>> = rows.iter().map(|r| r.user_id).collect();

        sqlx::query_as(
            r"
            INSERT INTO persons (
                document_type, document_number, first_name, last_name, email, phone,
                role_title, organization, media_type, nationality, user_id
            )
            SELECT * FROM UNNEST(
                $1::text[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[],
                $7::text[], $8::text[], $9::text[], $10::text[], $11::uuid[]
            )
            ON CONFLICT (document_type, document_number)
                DO UPDATE SET updated_at = persons.updated_at
            RETURNING *, (xmax = 0) AS inserted
            ",
        )
        .bind(&document_types)
        .bind(&document_numbers)
        .bind(column(|r| r.first_name.clone()))
        .bind(column(|r| r.last_name.clone()))
        .bind(column(|r| r.email.clone()))
        .bind(column(|r| r.phone.clone()))
        .bind(column(|r| r.role_title.clone()))
        .bind(column(|r| r.organization.clone()))
        .bind(column(|r| r.media_type.clone()))
        .bind(column(|r| r.nationality.clone()))
        .bind(&user_ids)
        .fetch_all(pool)
        .await
    }

    /// Apply a non-destructive patch.
    pub async fn apply_patch(
        pool: &PgPool,
        id: Uuid,
        patch: &PersonPatch,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE persons SET
                first_name   = COALESCE($2, first_name),
                last_name    = COALESCE($3, last_name),
                email        = COALESCE($4, email),
                phone        = COALESCE($5, phone),
                role_title   = COALESCE($6, role_title),
                organization = COALESCE($7, organization),
                media_type   = COALESCE($8, media_type),
                nationality  = COALESCE($9, nationality),
                user_id      = COALESCE(user_id, $10),
                updated_at   = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&patch.first_name)
        .bind(&patch.last_name)
        .bind(&patch.email)
        .bind(&patch.phone)
        .bind(&patch.role_title)
        .bind(&patch.organization)
        .bind(&patch.media_type)
        .bind(&patch.nationality)
        .bind(patch.user_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find the Person linked to an authenticated account.
    pub async fn find_by_user_id(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM persons WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Which of `ids` are referenced by at least one accreditation (any event).
    pub async fn referenced_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT DISTINCT person_id FROM accreditations WHERE person_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(pool)
        .await
    }

    /// Delete the given Persons, skipping any that gained a reference in the
    /// meantime. Returns the number of deleted rows.
    pub async fn delete_unreferenced(pool: &PgPool, ids: &[Uuid]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r"
            DELETE FROM persons p
            WHERE p.id = ANY($1)
              AND NOT EXISTS (SELECT 1 FROM accreditations a WHERE a.person_id = p.id)
            ",
        )
        .bind(ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Merge `data` into `tenant_data[tenant_id]`, keeping keys not present in `data`.
    pub async fn merge_tenant_data(
        pool: &PgPool,
        id: Uuid,
        tenant_id: Uuid,
        data: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE persons SET
                tenant_data = jsonb_set(
                    tenant_data,
                    ARRAY[$2::text],
                    COALESCE(tenant_data -> ($2::text), '{}'::jsonb) || $3::jsonb
                ),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(tenant_id.to_string())
        .bind(data)
        .execute(pool)
        .await?;
        Ok(())
    }
}
