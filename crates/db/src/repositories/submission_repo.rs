//! Repository for the `provider_submissions` table.

use sqlx::PgPool;

use genflow_core::types::DbId;

use crate::models::status::SubmissionStatus;
use crate::models::submission::{CreateSubmission, ProviderSubmission};

/// Column list for `provider_submissions` queries.
const COLUMNS: &str = "\
    id, generation_id, provider_id, provider_account_id, provider_job_id, \
    payload, response, error, retry_attempt, status_id, started_at, finished_at";

/// Provides CRUD operations for provider submissions.
pub struct SubmissionRepo;

impl SubmissionRepo {
    /// Insert a new submission row (one per attempt).
    pub async fn create(
        pool: &PgPool,
        input: &CreateSubmission,
    ) -> Result<ProviderSubmission, sqlx::Error> {
        let query = format!(
            "INSERT INTO provider_submissions \
                (generation_id, provider_id, provider_account_id, provider_job_id, \
                 payload, response, error, retry_attempt, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProviderSubmission>(&query)
            .bind(input.generation_id)
            .bind(&input.provider_id)
            .bind(input.provider_account_id)
            .bind(&input.provider_job_id)
            .bind(&input.payload)
            .bind(&input.response)
            .bind(&input.error)
            .bind(input.retry_attempt)
            .bind(input.status_id)
            .fetch_one(pool)
            .await
    }

    /// The current submission for a generation: the attempt with the
    /// highest `retry_attempt`.
    pub async fn find_current(
        pool: &PgPool,
        generation_id: DbId,
    ) -> Result<Option<ProviderSubmission>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM provider_submissions \
             WHERE generation_id = $1 \
             ORDER BY retry_attempt DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, ProviderSubmission>(&query)
            .bind(generation_id)
            .fetch_optional(pool)
            .await
    }

    /// All submissions for a generation, oldest attempt first.
    pub async fn list_by_generation(
        pool: &PgPool,
        generation_id: DbId,
    ) -> Result<Vec<ProviderSubmission>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM provider_submissions \
             WHERE generation_id = $1 \
             ORDER BY retry_attempt ASC, id ASC"
        );
        sqlx::query_as::<_, ProviderSubmission>(&query)
            .bind(generation_id)
            .fetch_all(pool)
            .await
    }

    /// Finish an in-flight submission: CAS Pending -> Success/Error with
    /// the provider job id, final response, and timing.
    pub async fn finish(
        pool: &PgPool,
        id: DbId,
        status: SubmissionStatus,
        provider_job_id: Option<&str>,
        response: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE provider_submissions \
             SET status_id = $2, provider_job_id = COALESCE($3, provider_job_id), \
                 response = COALESCE($4, response), error = $5, finished_at = NOW() \
             WHERE id = $1 AND status_id = $6",
        )
        .bind(id)
        .bind(status.id())
        .bind(provider_job_id)
        .bind(response)
        .bind(error)
        .bind(SubmissionStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
