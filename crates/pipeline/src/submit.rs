//! The submission pipeline: everything between a pending generation and
//! an in-flight provider job.
//!
//! One call to [`SubmissionPipeline::submit`] runs the staged flow for a
//! single attempt: adapter lookup, account admission, input artifact
//! resolution, parameter mapping, the Pending -> Submitted transition,
//! and the provider call. The account slot is claimed for exactly the
//! span of the provider call and released on every exit path.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use genflow_core::params::parse_params;
use genflow_core::types::DbId;
use genflow_db::models::generation::Generation;
use genflow_db::models::status::SubmissionStatus;
use genflow_db::models::submission::CreateSubmission;
use genflow_db::OrchestratorStore;
use genflow_events::{EventBus, GenerationEvent};
use genflow_providers::{AdapterError, ProviderRegistry};

use crate::account_pool::{AccountPool, PoolError};
use crate::artifacts::InputResolver;
use crate::PipelineError;

/// Outcome of one submission attempt.
#[derive(Debug)]
pub enum SubmitReport {
    /// The provider accepted the job.
    Submitted { submission_id: DbId },
    /// No eligible account right now; the generation stays pending.
    NoAccount,
    /// Someone else transitioned the generation first (concurrent
    /// dispatcher, cancellation). Nothing was submitted.
    LostRace,
    /// The attempt failed and the generation was marked failed; the
    /// auto-retry handler takes it from here.
    Failed { error: String },
}

/// Drives submission attempts for pending generations.
pub struct SubmissionPipeline {
    store: Arc<dyn OrchestratorStore>,
    registry: Arc<ProviderRegistry>,
    pool: Arc<AccountPool>,
    resolver: InputResolver,
    events: Arc<EventBus>,
}

impl SubmissionPipeline {
    pub fn new(
        store: Arc<dyn OrchestratorStore>,
        registry: Arc<ProviderRegistry>,
        pool: Arc<AccountPool>,
        events: Arc<EventBus>,
    ) -> Self {
        let resolver = InputResolver::new(Arc::clone(&store));
        Self {
            store,
            registry,
            pool,
            resolver,
            events,
        }
    }

    /// Run one submission attempt for a pending generation.
    pub async fn submit(&self, generation_id: DbId) -> Result<SubmitReport, PipelineError> {
        let generation = self
            .store
            .get_generation(generation_id)
            .await?
            .ok_or(PipelineError::MissingGeneration(generation_id))?;

        tracing::info!(
            generation_id,
            provider_id = %generation.provider_id,
            operation_type = %generation.operation_type,
            retry_attempt = generation.retry_count,
            stage = "pipeline:start",
            "Submission attempt starting",
        );

        let Some(adapter) = self.registry.get(&generation.provider_id) else {
            return self
                .record_failure(
                    &generation,
                    &format!("No adapter registered for provider '{}'", generation.provider_id),
                )
                .await;
        };

        let lease = match self
            .pool
            .acquire(&generation.provider_id, &generation.operation_type)
            .await
        {
            Ok(lease) => lease,
            Err(PoolError::NoAccountAvailable(provider_id)) => {
                tracing::debug!(generation_id, provider_id, "No account available, staying pending");
                return Ok(SubmitReport::NoAccount);
            }
            Err(PoolError::Store(e)) => return Err(e.into()),
        };

        // From here on, every exit path must release the slot.
        let report = self.attempt(&generation, adapter.as_ref(), &lease).await;
        self.pool.release(lease.account_id).await;
        report
    }

    /// The slot-holding part of a submission attempt.
    async fn attempt(
        &self,
        generation: &Generation,
        adapter: &dyn genflow_providers::ProviderAdapter,
        lease: &crate::account_pool::AccountLease,
    ) -> Result<SubmitReport, PipelineError> {
        // Stored params were validated at the boundary; a parse failure
        // here means the row predates a format change. Permanent.
        let params = match parse_params(&generation.operation_type, &generation.params) {
            Ok(params) => params,
            Err(e) => {
                return self
                    .record_failure(generation, &format!("Invalid stored parameters: {e}"))
                    .await;
            }
        };

        let resolve_started = Instant::now();
        let inputs = match self
            .resolver
            .resolve(adapter, &lease.credentials, &params)
            .await
        {
            Ok(inputs) => inputs,
            Err(crate::artifacts::ResolveError::Pipeline(inner)) => return Err(inner),
            Err(e) => return self.record_failure(generation, &e.to_string()).await,
        };
        tracing::debug!(
            generation_id = generation.id,
            provider_id = %generation.provider_id,
            stage = "pipeline:artifact",
            duration_ms = resolve_started.elapsed().as_millis() as u64,
            "Input artifacts resolved",
        );

        let payload = match adapter.map_parameters(&params, &inputs) {
            Ok(payload) => payload,
            Err(e) => return self.record_failure(generation, &e.to_string()).await,
        };

        // Claim the generation before calling out: the CAS loser must not
        // submit a cancelled or already-dispatched generation.
        if !self.store.mark_generation_submitted(generation.id).await? {
            tracing::debug!(generation_id = generation.id, "Lost submission race");
            return Ok(SubmitReport::LostRace);
        }

        let submission = self
            .store
            .create_submission(&CreateSubmission {
                generation_id: generation.id,
                provider_id: generation.provider_id.clone(),
                provider_account_id: lease.account_id,
                provider_job_id: None,
                payload,
                response: None,
                error: None,
                retry_attempt: generation.retry_count,
                status_id: SubmissionStatus::Pending.id(),
            })
            .await?;

        tracing::debug!(
            generation_id = generation.id,
            provider_id = %generation.provider_id,
            submission_id = submission.id,
            stage = "provider:submit",
            "Calling provider",
        );
        let call_started = Instant::now();
        match adapter.execute(&lease.credentials, &submission.payload).await {
            Ok(outcome) => {
                self.store
                    .finish_submission(
                        submission.id,
                        SubmissionStatus::Success,
                        Some(outcome.provider_job_id.as_str()),
                        Some(&outcome.raw_response),
                        None,
                    )
                    .await?;
                self.pool.deduct(lease).await;

                tracing::info!(
                    generation_id = generation.id,
                    provider_id = %generation.provider_id,
                    submission_id = submission.id,
                    provider_job_id = %outcome.provider_job_id,
                    account_id = lease.account_id,
                    stage = "provider:complete",
                    duration_ms = call_started.elapsed().as_millis() as u64,
                    "Generation submitted",
                );
                self.events.publish(GenerationEvent::Submitted {
                    generation_id: generation.id,
                    provider_id: generation.provider_id.clone(),
                    provider_account_id: lease.account_id,
                    retry_attempt: generation.retry_count,
                    timestamp: Utc::now(),
                });
                Ok(SubmitReport::Submitted {
                    submission_id: submission.id,
                })
            }
            Err(e) => {
                let error_text = e.to_string();
                tracing::warn!(
                    generation_id = generation.id,
                    provider_id = %generation.provider_id,
                    submission_id = submission.id,
                    stage = "provider:error",
                    duration_ms = call_started.elapsed().as_millis() as u64,
                    error = %error_text,
                    "Provider rejected the submission",
                );
                self.store
                    .finish_submission(
                        submission.id,
                        SubmissionStatus::Error,
                        None,
                        None,
                        Some(&error_text),
                    )
                    .await?;
                if is_auth_failure(&e) {
                    self.pool.suspend(lease.account_id, &error_text).await;
                } else if is_rate_limited(&e) {
                    self.pool.cool_down(lease.account_id, &error_text).await;
                }
                self.record_failure(generation, &error_text).await
            }
        }
    }

    /// Mark the generation failed and publish the failure, unless a
    /// concurrent transition (cancellation) got there first.
    async fn record_failure(
        &self,
        generation: &Generation,
        error: &str,
    ) -> Result<SubmitReport, PipelineError> {
        tracing::warn!(
            generation_id = generation.id,
            provider_id = %generation.provider_id,
            error,
            "Submission attempt failed",
        );
        if self.store.fail_generation(generation.id, error).await? {
            self.events.publish(GenerationEvent::Failed {
                generation_id: generation.id,
                provider_id: generation.provider_id.clone(),
                error: error.to_string(),
                retry_count: generation.retry_count,
                timestamp: Utc::now(),
            });
            Ok(SubmitReport::Failed {
                error: error.to_string(),
            })
        } else {
            Ok(SubmitReport::LostRace)
        }
    }
}

/// Whether a provider error means the account's credentials are bad.
fn is_auth_failure(error: &AdapterError) -> bool {
    matches!(error, AdapterError::Api { status: 401 | 403, .. })
}

/// Whether a provider error means the account hit its rate limit.
fn is_rate_limited(error: &AdapterError) -> bool {
    matches!(error, AdapterError::Api { status: 429, .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_detection() {
        assert!(is_auth_failure(&AdapterError::Api {
            status: 401,
            body: "invalid api key".to_string(),
        }));
        assert!(is_auth_failure(&AdapterError::Api {
            status: 403,
            body: String::new(),
        }));
        assert!(!is_auth_failure(&AdapterError::Api {
            status: 500,
            body: String::new(),
        }));
        assert!(!is_auth_failure(&AdapterError::MalformedResponse(
            "x".to_string()
        )));
    }

    #[test]
    fn rate_limit_detection() {
        assert!(is_rate_limited(&AdapterError::Api {
            status: 429,
            body: "rate limit exceeded".to_string(),
        }));
        assert!(!is_rate_limited(&AdapterError::Api {
            status: 503,
            body: String::new(),
        }));
    }
}
