//! Storage seam between the orchestration logic and Postgres.
//!
//! [`OrchestratorStore`] is the object-safe trait the pipeline, poller,
//! and retry handler depend on. [`PgStore`] is the production
//! implementation delegating to the repositories; tests substitute an
//! in-memory store. Boolean-returning transition methods report whether
//! the compare-and-set won — callers treat `false` as a lost race and
//! discard their work.

use async_trait::async_trait;
use sqlx::PgPool;

use genflow_core::types::DbId;

use crate::models::account::ProviderAccount;
use crate::models::artifact::{Artifact, CreateArtifact};
use crate::models::generation::{CreateGeneration, Generation, GenerationListQuery};
use crate::models::status::{AccountStatus, GenerationStatus, SubmissionStatus};
use crate::models::submission::{CreateSubmission, ProviderSubmission};
use crate::repositories::{AccountRepo, ArtifactRepo, GenerationRepo, SubmissionRepo};

/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },
}

/// Durable storage operations the orchestrator depends on.
#[async_trait]
pub trait OrchestratorStore: Send + Sync {
    // ---- generations ----

    async fn create_generation(&self, input: &CreateGeneration) -> Result<Generation, StoreError>;

    async fn get_generation(&self, id: DbId) -> Result<Option<Generation>, StoreError>;

    async fn list_generations(
        &self,
        query: &GenerationListQuery,
    ) -> Result<Vec<Generation>, StoreError>;

    /// Generations in any of the given statuses, highest priority and
    /// oldest first.
    async fn list_generations_in_statuses(
        &self,
        statuses: &[GenerationStatus],
    ) -> Result<Vec<Generation>, StoreError>;

    /// CAS Pending -> Submitted.
    async fn mark_generation_submitted(&self, id: DbId) -> Result<bool, StoreError>;

    /// CAS Submitted -> Processing.
    async fn begin_generation_processing(&self, id: DbId) -> Result<bool, StoreError>;

    /// CAS Submitted/Processing -> Completed with the result artifact.
    async fn complete_generation(&self, id: DbId, artifact_id: DbId) -> Result<bool, StoreError>;

    /// CAS in-flight -> Failed, retaining the error text.
    async fn fail_generation(&self, id: DbId, error: &str) -> Result<bool, StoreError>;

    /// CAS Failed -> Pending on the same row, incrementing `retry_count`,
    /// guarded by the expected prior count.
    async fn requeue_generation(
        &self,
        id: DbId,
        expected_retry_count: i32,
    ) -> Result<bool, StoreError>;

    /// Cancel unless already terminal.
    async fn cancel_generation(&self, id: DbId) -> Result<bool, StoreError>;

    // ---- submissions ----

    async fn create_submission(
        &self,
        input: &CreateSubmission,
    ) -> Result<ProviderSubmission, StoreError>;

    /// The attempt with the highest `retry_attempt` for a generation.
    async fn current_submission(
        &self,
        generation_id: DbId,
    ) -> Result<Option<ProviderSubmission>, StoreError>;

    /// CAS an in-flight submission Pending -> Success/Error, recording the
    /// provider-assigned job id when one was issued.
    async fn finish_submission(
        &self,
        id: DbId,
        status: SubmissionStatus,
        provider_job_id: Option<&str>,
        response: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<bool, StoreError>;

    // ---- artifacts ----

    async fn create_artifact(&self, input: &CreateArtifact) -> Result<Artifact, StoreError>;

    async fn get_artifact(&self, id: DbId) -> Result<Option<Artifact>, StoreError>;

    async fn cache_provider_upload(
        &self,
        artifact_id: DbId,
        provider_id: &str,
        provider_asset_id: &str,
    ) -> Result<(), StoreError>;

    // ---- accounts (roster + mirroring) ----

    async fn list_accounts(&self, provider_id: &str) -> Result<Vec<ProviderAccount>, StoreError>;

    async fn mirror_account_slots(&self, id: DbId, current_jobs: i32) -> Result<(), StoreError>;

    async fn mirror_account_balance(
        &self,
        id: DbId,
        credit_pool: &str,
        balance: i64,
    ) -> Result<(), StoreError>;

    async fn mirror_account_status(
        &self,
        id: DbId,
        status: AccountStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;
}

/// Postgres-backed [`OrchestratorStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrchestratorStore for PgStore {
    async fn create_generation(&self, input: &CreateGeneration) -> Result<Generation, StoreError> {
        Ok(GenerationRepo::create(&self.pool, input).await?)
    }

    async fn get_generation(&self, id: DbId) -> Result<Option<Generation>, StoreError> {
        Ok(GenerationRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_generations(
        &self,
        query: &GenerationListQuery,
    ) -> Result<Vec<Generation>, StoreError> {
        Ok(GenerationRepo::list(&self.pool, query).await?)
    }

    async fn list_generations_in_statuses(
        &self,
        statuses: &[GenerationStatus],
    ) -> Result<Vec<Generation>, StoreError> {
        Ok(GenerationRepo::list_in_statuses(&self.pool, statuses).await?)
    }

    async fn mark_generation_submitted(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(GenerationRepo::mark_submitted(&self.pool, id).await?)
    }

    async fn begin_generation_processing(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(GenerationRepo::begin_processing(&self.pool, id).await?)
    }

    async fn complete_generation(&self, id: DbId, artifact_id: DbId) -> Result<bool, StoreError> {
        Ok(GenerationRepo::complete(&self.pool, id, artifact_id).await?)
    }

    async fn fail_generation(&self, id: DbId, error: &str) -> Result<bool, StoreError> {
        Ok(GenerationRepo::fail(&self.pool, id, error).await?)
    }

    async fn requeue_generation(
        &self,
        id: DbId,
        expected_retry_count: i32,
    ) -> Result<bool, StoreError> {
        Ok(GenerationRepo::requeue(&self.pool, id, expected_retry_count).await?)
    }

    async fn cancel_generation(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(GenerationRepo::cancel(&self.pool, id).await?)
    }

    async fn create_submission(
        &self,
        input: &CreateSubmission,
    ) -> Result<ProviderSubmission, StoreError> {
        Ok(SubmissionRepo::create(&self.pool, input).await?)
    }

    async fn current_submission(
        &self,
        generation_id: DbId,
    ) -> Result<Option<ProviderSubmission>, StoreError> {
        Ok(SubmissionRepo::find_current(&self.pool, generation_id).await?)
    }

    async fn finish_submission(
        &self,
        id: DbId,
        status: SubmissionStatus,
        provider_job_id: Option<&str>,
        response: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(
            SubmissionRepo::finish(&self.pool, id, status, provider_job_id, response, error)
                .await?,
        )
    }

    async fn create_artifact(&self, input: &CreateArtifact) -> Result<Artifact, StoreError> {
        Ok(ArtifactRepo::create(&self.pool, input).await?)
    }

    async fn get_artifact(&self, id: DbId) -> Result<Option<Artifact>, StoreError> {
        Ok(ArtifactRepo::find_by_id(&self.pool, id).await?)
    }

    async fn cache_provider_upload(
        &self,
        artifact_id: DbId,
        provider_id: &str,
        provider_asset_id: &str,
    ) -> Result<(), StoreError> {
        Ok(
            ArtifactRepo::cache_provider_upload(&self.pool, artifact_id, provider_id, provider_asset_id)
                .await?,
        )
    }

    async fn list_accounts(&self, provider_id: &str) -> Result<Vec<ProviderAccount>, StoreError> {
        Ok(AccountRepo::list_by_provider(&self.pool, provider_id).await?)
    }

    async fn mirror_account_slots(&self, id: DbId, current_jobs: i32) -> Result<(), StoreError> {
        Ok(AccountRepo::update_slots(&self.pool, id, current_jobs).await?)
    }

    async fn mirror_account_balance(
        &self,
        id: DbId,
        credit_pool: &str,
        balance: i64,
    ) -> Result<(), StoreError> {
        Ok(AccountRepo::update_balance(&self.pool, id, credit_pool, balance).await?)
    }

    async fn mirror_account_status(
        &self,
        id: DbId,
        status: AccountStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        Ok(AccountRepo::update_status(&self.pool, id, status, error).await?)
    }
}
