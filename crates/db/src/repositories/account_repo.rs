//! Repository for the `provider_accounts` table.
//!
//! The in-process account pool is authoritative for slot admission; these
//! methods load the credential roster and mirror pool-side mutations back
//! to the rows for observability.

use sqlx::PgPool;

use genflow_core::types::DbId;

use crate::models::account::ProviderAccount;
use crate::models::status::AccountStatus;

/// Column list for `provider_accounts` queries.
const COLUMNS: &str = "\
    id, provider_id, label, api_key, status_id, credit_balances, \
    max_concurrent_jobs, current_jobs, priority, last_error, \
    created_at, updated_at";

/// Provides roster loading and mirroring for provider accounts.
pub struct AccountRepo;

impl AccountRepo {
    /// Load every account for a provider, highest priority first.
    pub async fn list_by_provider(
        pool: &PgPool,
        provider_id: &str,
    ) -> Result<Vec<ProviderAccount>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM provider_accounts \
             WHERE provider_id = $1 \
             ORDER BY priority DESC, id ASC"
        );
        sqlx::query_as::<_, ProviderAccount>(&query)
            .bind(provider_id)
            .fetch_all(pool)
            .await
    }

    /// Mirror the pool's slot counter to the row.
    pub async fn update_slots(
        pool: &PgPool,
        id: DbId,
        current_jobs: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE provider_accounts SET current_jobs = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(current_jobs)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mirror a credit pool balance to the row's JSONB map.
    pub async fn update_balance(
        pool: &PgPool,
        id: DbId,
        credit_pool: &str,
        balance: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE provider_accounts \
             SET credit_balances = jsonb_set(credit_balances, ARRAY[$2], to_jsonb($3::BIGINT)), \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(credit_pool)
        .bind(balance)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mirror an account status change (e.g. cooling down after a
    /// provider-side auth failure), retaining the triggering error.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status: AccountStatus,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE provider_accounts \
             SET status_id = $2, last_error = COALESCE($3, last_error), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
