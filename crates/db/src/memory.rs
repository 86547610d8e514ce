//! In-memory [`OrchestratorStore`] for tests and local development.
//!
//! Mirrors the compare-and-set semantics of the Postgres repositories
//! exactly — transition methods return `false` for a lost race the same
//! way `rows_affected() == 0` does — so pipeline and poller behavior can
//! be exercised without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use genflow_core::types::DbId;

use crate::models::account::ProviderAccount;
use crate::models::artifact::{Artifact, CreateArtifact};
use crate::models::generation::{CreateGeneration, Generation, GenerationListQuery};
use crate::models::status::{AccountStatus, GenerationStatus, SubmissionStatus};
use crate::models::submission::{CreateSubmission, ProviderSubmission};
use crate::store::{OrchestratorStore, StoreError};

#[derive(Default)]
struct Inner {
    generations: HashMap<DbId, Generation>,
    submissions: Vec<ProviderSubmission>,
    artifacts: HashMap<DbId, Artifact>,
    accounts: HashMap<DbId, ProviderAccount>,
    next_id: DbId,
}

impl Inner {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

/// Map-backed store guarded by a single mutex.
///
/// The lock is never held across an await point, so it cannot deadlock
/// under tokio.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account row. Returns the assigned id.
    pub fn add_account(
        &self,
        provider_id: &str,
        api_key: &str,
        credit_balances: serde_json::Value,
        max_concurrent_jobs: i32,
        priority: i32,
    ) -> DbId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id();
        let now = Utc::now();
        inner.accounts.insert(
            id,
            ProviderAccount {
                id,
                provider_id: provider_id.to_string(),
                label: format!("account-{id}"),
                api_key: api_key.to_string(),
                status_id: AccountStatus::Active.id(),
                credit_balances,
                max_concurrent_jobs,
                current_jobs: 0,
                priority,
                last_error: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Seed an artifact row. Returns the assigned id.
    pub fn add_artifact(&self, media_type: &str, remote_url: &str) -> DbId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id();
        inner.artifacts.insert(
            id,
            Artifact {
                id,
                media_type: media_type.to_string(),
                origin_provider_id: None,
                remote_url: remote_url.to_string(),
                local_path: None,
                provider_uploads: serde_json::json!({}),
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Direct read of an account row, for assertions.
    pub fn account(&self, id: DbId) -> Option<ProviderAccount> {
        self.inner.lock().unwrap().accounts.get(&id).cloned()
    }

    /// All submissions for a generation, oldest attempt first.
    pub fn submissions_for(&self, generation_id: DbId) -> Vec<ProviderSubmission> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<ProviderSubmission> = inner
            .submissions
            .iter()
            .filter(|s| s.generation_id == generation_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.retry_attempt, s.id));
        rows
    }
}

#[async_trait]
impl OrchestratorStore for MemoryStore {
    async fn create_generation(&self, input: &CreateGeneration) -> Result<Generation, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id();
        let now = Utc::now();
        let generation = Generation {
            id,
            user_id: input.user_id,
            operation_type: input.operation_type.clone(),
            provider_id: input.provider_id.clone(),
            params: input.params.clone(),
            status_id: GenerationStatus::Pending.id(),
            priority: input.priority,
            retry_count: 0,
            max_retry_attempts: input.max_retry_attempts,
            result_artifact_id: None,
            last_error: None,
            submitted_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.generations.insert(id, generation.clone());
        Ok(generation)
    }

    async fn get_generation(&self, id: DbId) -> Result<Option<Generation>, StoreError> {
        Ok(self.inner.lock().unwrap().generations.get(&id).cloned())
    }

    async fn list_generations(
        &self,
        query: &GenerationListQuery,
    ) -> Result<Vec<Generation>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Generation> = inner
            .generations
            .values()
            .filter(|g| query.user_id.is_none_or(|u| g.user_id == u))
            .filter(|g| query.status_id.is_none_or(|s| g.status_id == s))
            .filter(|g| {
                query
                    .provider_id
                    .as_ref()
                    .is_none_or(|p| &g.provider_id == p)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.unwrap_or(50).clamp(0, 100) as usize;
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_generations_in_statuses(
        &self,
        statuses: &[GenerationStatus],
    ) -> Result<Vec<Generation>, StoreError> {
        let ids: Vec<i16> = statuses.iter().map(|s| s.id()).collect();
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Generation> = inner
            .generations
            .values()
            .filter(|g| ids.contains(&g.status_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(rows)
    }

    async fn mark_generation_submitted(&self, id: DbId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(g) = inner.generations.get_mut(&id) else {
            return Ok(false);
        };
        if g.status_id != GenerationStatus::Pending.id() {
            return Ok(false);
        }
        g.status_id = GenerationStatus::Submitted.id();
        g.submitted_at = Some(Utc::now());
        g.updated_at = Utc::now();
        Ok(true)
    }

    async fn begin_generation_processing(&self, id: DbId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(g) = inner.generations.get_mut(&id) else {
            return Ok(false);
        };
        if g.status_id != GenerationStatus::Submitted.id() {
            return Ok(false);
        }
        g.status_id = GenerationStatus::Processing.id();
        g.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete_generation(&self, id: DbId, artifact_id: DbId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(g) = inner.generations.get_mut(&id) else {
            return Ok(false);
        };
        let in_flight = [
            GenerationStatus::Submitted.id(),
            GenerationStatus::Processing.id(),
        ];
        if !in_flight.contains(&g.status_id) {
            return Ok(false);
        }
        g.status_id = GenerationStatus::Completed.id();
        g.result_artifact_id = Some(artifact_id);
        g.last_error = None;
        g.completed_at = Some(Utc::now());
        g.updated_at = Utc::now();
        Ok(true)
    }

    async fn fail_generation(&self, id: DbId, error: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(g) = inner.generations.get_mut(&id) else {
            return Ok(false);
        };
        let in_flight = [
            GenerationStatus::Pending.id(),
            GenerationStatus::Submitted.id(),
            GenerationStatus::Processing.id(),
        ];
        if !in_flight.contains(&g.status_id) {
            return Ok(false);
        }
        g.status_id = GenerationStatus::Failed.id();
        g.last_error = Some(error.to_string());
        g.updated_at = Utc::now();
        Ok(true)
    }

    async fn requeue_generation(
        &self,
        id: DbId,
        expected_retry_count: i32,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(g) = inner.generations.get_mut(&id) else {
            return Ok(false);
        };
        if g.status_id != GenerationStatus::Failed.id()
            || g.retry_count != expected_retry_count
            || g.retry_count >= g.max_retry_attempts
        {
            return Ok(false);
        }
        g.status_id = GenerationStatus::Pending.id();
        g.retry_count += 1;
        g.updated_at = Utc::now();
        Ok(true)
    }

    async fn cancel_generation(&self, id: DbId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(g) = inner.generations.get_mut(&id) else {
            return Ok(false);
        };
        let terminal = GenerationStatus::from_id(g.status_id).is_some_and(|s| s.is_terminal());
        if terminal {
            return Ok(false);
        }
        g.status_id = GenerationStatus::Cancelled.id();
        g.completed_at = Some(Utc::now());
        g.updated_at = Utc::now();
        Ok(true)
    }

    async fn create_submission(
        &self,
        input: &CreateSubmission,
    ) -> Result<ProviderSubmission, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id();
        let submission = ProviderSubmission {
            id,
            generation_id: input.generation_id,
            provider_id: input.provider_id.clone(),
            provider_account_id: input.provider_account_id,
            provider_job_id: input.provider_job_id.clone(),
            payload: input.payload.clone(),
            response: input.response.clone(),
            error: input.error.clone(),
            retry_attempt: input.retry_attempt,
            status_id: input.status_id,
            started_at: Utc::now(),
            finished_at: None,
        };
        inner.submissions.push(submission.clone());
        Ok(submission)
    }

    async fn current_submission(
        &self,
        generation_id: DbId,
    ) -> Result<Option<ProviderSubmission>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .submissions
            .iter()
            .filter(|s| s.generation_id == generation_id)
            .max_by_key(|s| (s.retry_attempt, s.id))
            .cloned())
    }

    async fn finish_submission(
        &self,
        id: DbId,
        status: SubmissionStatus,
        provider_job_id: Option<&str>,
        response: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(s) = inner.submissions.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if s.status_id != SubmissionStatus::Pending.id() {
            return Ok(false);
        }
        s.status_id = status.id();
        if let Some(job_id) = provider_job_id {
            s.provider_job_id = Some(job_id.to_string());
        }
        if let Some(r) = response {
            s.response = Some(r.clone());
        }
        s.error = error.map(|e| e.to_string());
        s.finished_at = Some(Utc::now());
        Ok(true)
    }

    async fn create_artifact(&self, input: &CreateArtifact) -> Result<Artifact, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id();
        let artifact = Artifact {
            id,
            media_type: input.media_type.clone(),
            origin_provider_id: input.origin_provider_id.clone(),
            remote_url: input.remote_url.clone(),
            local_path: input.local_path.clone(),
            provider_uploads: serde_json::json!({}),
            created_at: Utc::now(),
        };
        inner.artifacts.insert(id, artifact.clone());
        Ok(artifact)
    }

    async fn get_artifact(&self, id: DbId) -> Result<Option<Artifact>, StoreError> {
        Ok(self.inner.lock().unwrap().artifacts.get(&id).cloned())
    }

    async fn cache_provider_upload(
        &self,
        artifact_id: DbId,
        provider_id: &str,
        provider_asset_id: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let artifact = inner
            .artifacts
            .get_mut(&artifact_id)
            .ok_or(StoreError::NotFound {
                entity: "artifact",
                id: artifact_id,
            })?;
        if let serde_json::Value::Object(map) = &mut artifact.provider_uploads {
            map.insert(
                provider_id.to_string(),
                serde_json::Value::String(provider_asset_id.to_string()),
            );
        }
        Ok(())
    }

    async fn list_accounts(&self, provider_id: &str) -> Result<Vec<ProviderAccount>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<ProviderAccount> = inner
            .accounts
            .values()
            .filter(|a| a.provider_id == provider_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.id);
        Ok(rows)
    }

    async fn mirror_account_slots(&self, id: DbId, current_jobs: i32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(a) = inner.accounts.get_mut(&id) {
            a.current_jobs = current_jobs;
            a.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mirror_account_balance(
        &self,
        id: DbId,
        credit_pool: &str,
        balance: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(a) = inner.accounts.get_mut(&id) {
            if let serde_json::Value::Object(map) = &mut a.credit_balances {
                map.insert(credit_pool.to_string(), serde_json::json!(balance));
            }
            a.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mirror_account_status(
        &self,
        id: DbId,
        status: AccountStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(a) = inner.accounts.get_mut(&id) {
            a.status_id = status.id();
            if let Some(e) = error {
                a.last_error = Some(e.to_string());
            }
            a.updated_at = Utc::now();
        }
        Ok(())
    }
}
