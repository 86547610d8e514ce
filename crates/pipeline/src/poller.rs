//! Status poller: tracks in-flight generations to completion.
//!
//! One poller loop runs per provider, on that provider's poll interval.
//! Each tick walks the Submitted/Processing generations and asks the
//! adapter for the remote job's state. Every observed transition is
//! applied with a compare-and-set, so a generation cancelled mid-poll
//! discards the stale result instead of resurrecting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use genflow_db::models::artifact::CreateArtifact;
use genflow_db::models::generation::Generation;
use genflow_db::models::status::GenerationStatus;
use genflow_db::OrchestratorStore;
use genflow_events::{EventBus, GenerationEvent};
use genflow_providers::{ProviderRegistry, RemoteJobState};

use crate::account_pool::AccountPool;
use crate::PipelineError;

/// Media type recorded on result artifacts.
const RESULT_MEDIA_TYPE: &str = "video/mp4";

/// Polls providers for the status of in-flight generations.
pub struct StatusPoller {
    store: Arc<dyn OrchestratorStore>,
    registry: Arc<ProviderRegistry>,
    pool: Arc<AccountPool>,
    events: Arc<EventBus>,
}

impl StatusPoller {
    pub fn new(
        store: Arc<dyn OrchestratorStore>,
        registry: Arc<ProviderRegistry>,
        pool: Arc<AccountPool>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            registry,
            pool,
            events,
        }
    }

    /// Poll one provider on a fixed interval until cancelled.
    pub async fn run(&self, provider_id: &str, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(provider_id, interval_secs = interval.as_secs(), "Status poller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(provider_id, "Status poller stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(provider_id).await {
                        tracing::error!(provider_id, error = %e, "Poll tick failed");
                    }
                }
            }
        }
    }

    /// Poll every in-flight generation for a provider once. Returns the
    /// number of generations polled.
    pub async fn tick(&self, provider_id: &str) -> Result<usize, PipelineError> {
        let in_flight = self
            .store
            .list_generations_in_statuses(&[
                GenerationStatus::Submitted,
                GenerationStatus::Processing,
            ])
            .await?;

        let mut polled = 0;
        for generation in in_flight
            .iter()
            .filter(|g| g.provider_id == provider_id)
        {
            if let Err(e) = self.poll_one(generation).await {
                tracing::error!(
                    generation_id = generation.id,
                    error = %e,
                    "Polling generation failed",
                );
            }
            polled += 1;
        }
        Ok(polled)
    }

    async fn poll_one(&self, generation: &Generation) -> Result<(), PipelineError> {
        let Some(submission) = self.store.current_submission(generation.id).await? else {
            tracing::warn!(generation_id = generation.id, "In-flight generation has no submission");
            return Ok(());
        };
        let Some(job_id) = submission.provider_job_id.as_deref() else {
            tracing::warn!(
                generation_id = generation.id,
                submission_id = submission.id,
                "In-flight submission has no provider job id",
            );
            return Ok(());
        };
        let Some(adapter) = self.registry.get(&generation.provider_id) else {
            tracing::warn!(
                generation_id = generation.id,
                provider_id = %generation.provider_id,
                "No adapter for in-flight generation",
            );
            return Ok(());
        };
        let Some(credentials) = self.pool.credentials(submission.provider_account_id) else {
            tracing::warn!(
                generation_id = generation.id,
                account_id = submission.provider_account_id,
                "Submitting account no longer in the pool",
            );
            return Ok(());
        };

        let status = match adapter.check_status(&credentials, job_id).await {
            Ok(status) => status,
            Err(e) if e.is_transient() => {
                // Next tick retries.
                tracing::debug!(generation_id = generation.id, error = %e, "Status poll failed");
                return Ok(());
            }
            Err(e) => {
                return self.record_failure(generation, &e.to_string()).await;
            }
        };

        match status.state {
            RemoteJobState::Queued => Ok(()),
            RemoteJobState::Running => {
                // Only the first observation transitions; later ones lose
                // the CAS and that is fine.
                self.store.begin_generation_processing(generation.id).await?;
                Ok(())
            }
            RemoteJobState::Done => {
                let Some(result_url) = status.result_url else {
                    return self
                        .record_failure(generation, "Provider reported done without a result URL")
                        .await;
                };
                self.record_completion(generation, &result_url).await
            }
            RemoteJobState::Error => {
                let error = status
                    .error
                    .unwrap_or_else(|| "Provider reported failure".to_string());
                self.record_failure(generation, &error).await
            }
        }
    }

    async fn record_completion(
        &self,
        generation: &Generation,
        result_url: &str,
    ) -> Result<(), PipelineError> {
        let artifact = self
            .store
            .create_artifact(&CreateArtifact {
                media_type: RESULT_MEDIA_TYPE.to_string(),
                origin_provider_id: Some(generation.provider_id.clone()),
                remote_url: result_url.to_string(),
                local_path: None,
            })
            .await?;

        if self.store.complete_generation(generation.id, artifact.id).await? {
            tracing::info!(
                generation_id = generation.id,
                artifact_id = artifact.id,
                "Generation completed",
            );
            self.events.publish(GenerationEvent::Completed {
                generation_id: generation.id,
                provider_id: generation.provider_id.clone(),
                artifact_id: artifact.id,
                timestamp: Utc::now(),
            });
        } else {
            // Cancelled while the job finished remotely. The artifact row
            // stays for manual recovery; the generation does not change.
            tracing::debug!(generation_id = generation.id, "Completion lost to cancellation");
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        generation: &Generation,
        error: &str,
    ) -> Result<(), PipelineError> {
        if self.store.fail_generation(generation.id, error).await? {
            tracing::warn!(generation_id = generation.id, error, "Generation failed");
            self.events.publish(GenerationEvent::Failed {
                generation_id: generation.id,
                provider_id: generation.provider_id.clone(),
                error: error.to_string(),
                retry_count: generation.retry_count,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }
}
