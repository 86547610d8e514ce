//! Provider account entity model.
//!
//! Accounts are credentialed, credit-metered identities at an external
//! provider. Rows are mutated only through account pool operations — the
//! pipeline and poller never write them directly.

use genflow_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `provider_accounts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProviderAccount {
    pub id: DbId,
    pub provider_id: String,
    /// Human-readable label for dashboards ("team-a main", "overflow 2").
    pub label: String,
    /// Provider API key. Never logged.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub status_id: StatusId,
    /// Named credit pool balances, e.g. `{"video": 120, "image": 40}`.
    pub credit_balances: serde_json::Value,
    pub max_concurrent_jobs: i32,
    pub current_jobs: i32,
    pub priority: i32,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ProviderAccount {
    /// Remaining balance in a named credit pool. Missing pools read as 0.
    pub fn balance_for(&self, pool: &str) -> i64 {
        self.credit_balances
            .get(pool)
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_with_balances(balances: serde_json::Value) -> ProviderAccount {
        ProviderAccount {
            id: 1,
            provider_id: "dreamframe".to_string(),
            label: "test".to_string(),
            api_key: "sk-test".to_string(),
            status_id: 1,
            credit_balances: balances,
            max_concurrent_jobs: 2,
            current_jobs: 0,
            priority: 0,
            last_error: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn balance_for_reads_named_pool() {
        let account = account_with_balances(serde_json::json!({"video": 120, "image": 40}));
        assert_eq!(account.balance_for("video"), 120);
        assert_eq!(account.balance_for("image"), 40);
    }

    #[test]
    fn missing_pool_reads_as_zero() {
        let account = account_with_balances(serde_json::json!({"video": 120}));
        assert_eq!(account.balance_for("audio"), 0);
    }

    #[test]
    fn non_numeric_balance_reads_as_zero() {
        let account = account_with_balances(serde_json::json!({"video": "plenty"}));
        assert_eq!(account.balance_for("video"), 0);
    }
}
