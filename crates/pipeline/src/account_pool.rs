//! In-process account pool: the single admission point for provider
//! accounts.
//!
//! The pool owns the authoritative slot and balance state, loaded from
//! the account roster at startup. Selection, admission, and release all
//! happen inside one mutex-guarded critical section, so two concurrent
//! submissions can never both claim the last free slot. Database rows are
//! mirrored after each change for observability; a mirror failure is
//! logged and never blocks dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use genflow_core::credit::{credit_cost_for, credit_pool_for};
use genflow_core::selection::{select_candidate, CandidateAccount};
use genflow_core::types::DbId;
use genflow_db::models::status::AccountStatus;
use genflow_db::{OrchestratorStore, StoreError};
use genflow_providers::AccountCredentials;

/// Errors from account pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Every account for the provider is inactive, out of credits, or at
    /// its concurrency limit. The generation stays pending.
    #[error("No available account for provider '{0}'")]
    NoAccountAvailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A claimed concurrency slot plus everything the pipeline needs to
/// submit against it. Not a guard — the caller must release the slot
/// explicitly on every exit path.
#[derive(Debug, Clone)]
pub struct AccountLease {
    pub account_id: DbId,
    pub credentials: AccountCredentials,
    /// Credit pool the operation draws from.
    pub credit_pool: &'static str,
    /// Credits one attempt costs.
    pub credit_cost: i64,
}

struct AccountState {
    provider_id: String,
    api_key: String,
    active: bool,
    balances: HashMap<String, i64>,
    max_concurrent_jobs: i32,
    current_jobs: i32,
    priority: i32,
}

/// Shared account pool. Cheap to clone via `Arc`.
pub struct AccountPool {
    store: Arc<dyn OrchestratorStore>,
    state: Mutex<HashMap<DbId, AccountState>>,
}

impl AccountPool {
    /// Load the pool from the stored roster for the given providers.
    ///
    /// `current_jobs` is reset to zero: a fresh worker has no in-flight
    /// submissions, whatever a crashed predecessor left behind in the
    /// mirror columns.
    pub async fn load(
        store: Arc<dyn OrchestratorStore>,
        provider_ids: &[String],
    ) -> Result<Self, PoolError> {
        let mut state = HashMap::new();
        for provider_id in provider_ids {
            for account in store.list_accounts(provider_id).await? {
                let balances = match &account.credit_balances {
                    serde_json::Value::Object(map) => map
                        .iter()
                        .map(|(k, v)| (k.clone(), v.as_i64().unwrap_or(0)))
                        .collect(),
                    _ => HashMap::new(),
                };
                state.insert(
                    account.id,
                    AccountState {
                        provider_id: account.provider_id.clone(),
                        api_key: account.api_key.clone(),
                        active: account.status_id == AccountStatus::Active.id(),
                        balances,
                        max_concurrent_jobs: account.max_concurrent_jobs,
                        current_jobs: 0,
                        priority: account.priority,
                    },
                );
            }
        }
        tracing::info!(accounts = state.len(), "Account pool loaded");
        Ok(Self {
            store,
            state: Mutex::new(state),
        })
    }

    /// Select an account for an operation and claim one concurrency slot
    /// on it, atomically.
    pub async fn acquire(
        &self,
        provider_id: &str,
        operation_type: &str,
    ) -> Result<AccountLease, PoolError> {
        let credit_pool = credit_pool_for(operation_type);
        let credit_cost = credit_cost_for(operation_type);

        let (lease, current_jobs) = {
            let mut state = self.state.lock().unwrap();
            let candidates: Vec<CandidateAccount> = state
                .iter()
                .filter(|(_, a)| a.provider_id == provider_id)
                .map(|(id, a)| CandidateAccount {
                    id: *id,
                    active: a.active,
                    balance: a.balances.get(credit_pool).copied().unwrap_or(0),
                    current_jobs: a.current_jobs,
                    max_concurrent_jobs: a.max_concurrent_jobs,
                    priority: a.priority,
                })
                .collect();

            let Some(account_id) = select_candidate(&candidates, credit_cost) else {
                return Err(PoolError::NoAccountAvailable(provider_id.to_string()));
            };

            // Present in the map: select_candidate only returns candidate ids.
            let account = state.get_mut(&account_id).unwrap();
            account.current_jobs += 1;
            (
                AccountLease {
                    account_id,
                    credentials: AccountCredentials {
                        account_id,
                        api_key: account.api_key.clone(),
                    },
                    credit_pool,
                    credit_cost,
                },
                account.current_jobs,
            )
        };

        tracing::debug!(
            account_id = lease.account_id,
            provider_id,
            current_jobs,
            "Account slot acquired",
        );
        self.mirror_slots(lease.account_id, current_jobs).await;
        Ok(lease)
    }

    /// Return a previously acquired slot.
    pub async fn release(&self, account_id: DbId) {
        let current_jobs = {
            let mut state = self.state.lock().unwrap();
            match state.get_mut(&account_id) {
                Some(account) => {
                    account.current_jobs = (account.current_jobs - 1).max(0);
                    Some(account.current_jobs)
                }
                None => None,
            }
        };
        if let Some(current_jobs) = current_jobs {
            tracing::debug!(account_id, current_jobs, "Account slot released");
            self.mirror_slots(account_id, current_jobs).await;
        }
    }

    /// Deduct the lease's credit cost from its account, marking the
    /// account exhausted when the pool runs dry.
    pub async fn deduct(&self, lease: &AccountLease) {
        let (balance, exhausted) = {
            let mut state = self.state.lock().unwrap();
            let Some(account) = state.get_mut(&lease.account_id) else {
                return;
            };
            let balance = account.balances.entry(lease.credit_pool.to_string()).or_insert(0);
            *balance -= lease.credit_cost;
            let exhausted = *balance <= 0;
            if exhausted {
                account.active = false;
            }
            (*balance, exhausted)
        };

        tracing::debug!(
            account_id = lease.account_id,
            credit_pool = lease.credit_pool,
            balance,
            "Credits deducted",
        );
        if let Err(e) = self
            .store
            .mirror_account_balance(lease.account_id, lease.credit_pool, balance)
            .await
        {
            tracing::warn!(account_id = lease.account_id, error = %e, "Balance mirror failed");
        }
        if exhausted {
            tracing::warn!(account_id = lease.account_id, "Account credits exhausted");
            if let Err(e) = self
                .store
                .mirror_account_status(lease.account_id, AccountStatus::Exhausted, None)
                .await
            {
                tracing::warn!(account_id = lease.account_id, error = %e, "Status mirror failed");
            }
        }
    }

    /// Take an account out of rotation after an authentication failure.
    pub async fn suspend(&self, account_id: DbId, error: &str) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(account) = state.get_mut(&account_id) {
                account.active = false;
            }
        }
        tracing::warn!(account_id, error, "Account suspended");
        if let Err(e) = self
            .store
            .mirror_account_status(account_id, AccountStatus::Suspended, Some(error))
            .await
        {
            tracing::warn!(account_id, error = %e, "Status mirror failed");
        }
    }

    /// Take an account out of rotation after the provider rate-limited
    /// it. Reactivation is operator-side, like [`Self::suspend`].
    pub async fn cool_down(&self, account_id: DbId, error: &str) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(account) = state.get_mut(&account_id) {
                account.active = false;
            }
        }
        tracing::warn!(account_id, error, "Account cooling down");
        if let Err(e) = self
            .store
            .mirror_account_status(account_id, AccountStatus::CoolingDown, Some(error))
            .await
        {
            tracing::warn!(account_id, error = %e, "Status mirror failed");
        }
    }

    /// Credentials for an account, for status polling.
    pub fn credentials(&self, account_id: DbId) -> Option<AccountCredentials> {
        let state = self.state.lock().unwrap();
        state.get(&account_id).map(|a| AccountCredentials {
            account_id,
            api_key: a.api_key.clone(),
        })
    }

    /// Current in-flight count for an account.
    pub fn current_jobs(&self, account_id: DbId) -> Option<i32> {
        self.state.lock().unwrap().get(&account_id).map(|a| a.current_jobs)
    }

    async fn mirror_slots(&self, account_id: DbId, current_jobs: i32) {
        if let Err(e) = self.store.mirror_account_slots(account_id, current_jobs).await {
            tracing::warn!(account_id, error = %e, "Slot mirror failed");
        }
    }
}
