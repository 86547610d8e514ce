//! Repository for the `generations` table.
//!
//! All lifecycle transitions are compare-and-set against the expected
//! prior status and return whether a row was updated, so callers can
//! detect (and discard work after) a lost race.

use sqlx::PgPool;

use genflow_core::types::DbId;

use crate::models::generation::{CreateGeneration, Generation, GenerationListQuery};
use crate::models::status::{GenerationStatus, StatusId};

/// Column list for `generations` queries.
const COLUMNS: &str = "\
    id, user_id, operation_type, provider_id, params, status_id, priority, \
    retry_count, max_retry_attempts, result_artifact_id, last_error, \
    submitted_at, completed_at, created_at, updated_at";

/// Maximum page size for generation listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for generation listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD operations and CAS transitions for generations.
pub struct GenerationRepo;

impl GenerationRepo {
    /// Insert a new pending generation.
    pub async fn create(
        pool: &PgPool,
        input: &CreateGeneration,
    ) -> Result<Generation, sqlx::Error> {
        let query = format!(
            "INSERT INTO generations \
                (user_id, operation_type, provider_id, params, status_id, priority, \
                 max_retry_attempts) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(input.user_id)
            .bind(&input.operation_type)
            .bind(&input.provider_id)
            .bind(&input.params)
            .bind(GenerationStatus::Pending.id())
            .bind(input.priority)
            .bind(input.max_retry_attempts)
            .fetch_one(pool)
            .await
    }

    /// Find a generation by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Generation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generations WHERE id = $1");
        sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List generations with optional user/status/provider filters.
    pub async fn list(
        pool: &PgPool,
        params: &GenerationListQuery,
    ) -> Result<Vec<Generation>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if params.user_id.is_some() {
            conditions.push(format!("user_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.status_id.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.provider_id.is_some() {
            conditions.push(format!("provider_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM generations \
             {where_clause} \
             ORDER BY created_at DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, Generation>(&query);
        if let Some(uid) = params.user_id {
            q = q.bind(uid);
        }
        if let Some(sid) = params.status_id {
            q = q.bind(sid);
        }
        if let Some(ref pid) = params.provider_id {
            q = q.bind(pid);
        }
        q = q.bind(limit).bind(offset);

        q.fetch_all(pool).await
    }

    /// List generations currently in any of the given statuses, oldest
    /// first. Used by the poller (Submitted/Processing) and the requeue
    /// pass (Pending).
    pub async fn list_in_statuses(
        pool: &PgPool,
        statuses: &[GenerationStatus],
    ) -> Result<Vec<Generation>, sqlx::Error> {
        let ids: Vec<StatusId> = statuses.iter().map(|s| s.id()).collect();
        let query = format!(
            "SELECT {COLUMNS} FROM generations \
             WHERE status_id = ANY($1) \
             ORDER BY priority DESC, created_at ASC"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(&ids)
            .fetch_all(pool)
            .await
    }

    /// CAS Pending -> Submitted, stamping `submitted_at`.
    pub async fn mark_submitted(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $2, submitted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(GenerationStatus::Submitted.id())
        .bind(GenerationStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS Submitted -> Processing (first poller observation of a running
    /// remote job).
    pub async fn begin_processing(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(GenerationStatus::Processing.id())
        .bind(GenerationStatus::Submitted.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS Submitted/Processing -> Completed with the result artifact.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        result_artifact_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $2, result_artifact_id = $3, last_error = NULL, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(id)
        .bind(GenerationStatus::Completed.id())
        .bind(result_artifact_id)
        .bind(GenerationStatus::Submitted.id())
        .bind(GenerationStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS any in-flight status -> Failed, retaining the error text.
    ///
    /// Cancelled and already-terminal rows are left untouched, which is
    /// how a stale poller result gets discarded.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $2, last_error = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5, $6)",
        )
        .bind(id)
        .bind(GenerationStatus::Failed.id())
        .bind(error)
        .bind(GenerationStatus::Pending.id())
        .bind(GenerationStatus::Submitted.id())
        .bind(GenerationStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Requeue a failed generation for another attempt on the SAME row:
    /// CAS Failed -> Pending and increment `retry_count`.
    ///
    /// The `expected_retry_count` guard makes the retry handler idempotent
    /// under event redelivery — a second delivery of the same failure sees
    /// a bumped count and updates nothing.
    pub async fn requeue(
        pool: &PgPool,
        id: DbId,
        expected_retry_count: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $2, retry_count = retry_count + 1, updated_at = NOW() \
             WHERE id = $1 AND status_id = $3 AND retry_count = $4 \
               AND retry_count < max_retry_attempts",
        )
        .bind(id)
        .bind(GenerationStatus::Pending.id())
        .bind(GenerationStatus::Failed.id())
        .bind(expected_retry_count)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel a generation unless it is already terminal.
    pub async fn cancel(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $2, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($3, $4, $5)",
        )
        .bind(id)
        .bind(GenerationStatus::Cancelled.id())
        .bind(GenerationStatus::Completed.id())
        .bind(GenerationStatus::Failed.id())
        .bind(GenerationStatus::Cancelled.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
