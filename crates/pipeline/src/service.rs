//! Boundary operations: creating, querying, cancelling, and dispatching
//! generations.
//!
//! [`OrchestratorService`] is what an API surface or the worker binary
//! talks to. Creation only validates and enqueues; the dispatch loop
//! picks pending generations up, so a burst of requests never blocks on
//! provider calls.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use genflow_core::params::parse_params;
use genflow_core::retry::clamp_max_retry_attempts;
use genflow_core::types::DbId;
use genflow_db::models::generation::{CreateGeneration, Generation, GenerationListQuery};
use genflow_db::models::status::GenerationStatus;
use genflow_db::OrchestratorStore;
use genflow_events::{EventBus, GenerationEvent};
use genflow_providers::ProviderRegistry;

use crate::submit::{SubmissionPipeline, SubmitReport};
use crate::PipelineError;

/// An inbound request to generate content.
#[derive(Debug, Clone)]
pub struct NewGenerationRequest {
    pub user_id: DbId,
    pub provider_id: String,
    pub operation_type: String,
    /// Free-form params object, validated against the operation type.
    pub params: serde_json::Value,
    pub priority: i32,
    /// Per-request retry cap; `None` takes the configured default.
    pub max_retry_attempts: Option<i32>,
}

/// Front door for generation lifecycle operations.
pub struct OrchestratorService {
    store: Arc<dyn OrchestratorStore>,
    registry: Arc<ProviderRegistry>,
    pipeline: Arc<SubmissionPipeline>,
    events: Arc<EventBus>,
    default_max_retry_attempts: i32,
}

impl OrchestratorService {
    pub fn new(
        store: Arc<dyn OrchestratorStore>,
        registry: Arc<ProviderRegistry>,
        pipeline: Arc<SubmissionPipeline>,
        events: Arc<EventBus>,
        default_max_retry_attempts: i32,
    ) -> Self {
        Self {
            store,
            registry,
            pipeline,
            events,
            default_max_retry_attempts,
        }
    }

    /// Validate and enqueue a new generation. Returns the pending row.
    pub async fn create_generation(
        &self,
        request: NewGenerationRequest,
    ) -> Result<Generation, PipelineError> {
        if self.registry.get(&request.provider_id).is_none() {
            return Err(PipelineError::UnknownProvider(request.provider_id));
        }
        // Parse to validate; the canonical serialized form is stored so
        // later attempts see exactly what was accepted.
        let params = parse_params(&request.operation_type, &request.params)?;
        let params_json = serde_json::to_value(&params)
            .map_err(|e| genflow_core::error::CoreError::Validation(e.to_string()))?;

        let max_retry_attempts = clamp_max_retry_attempts(
            request
                .max_retry_attempts
                .unwrap_or(self.default_max_retry_attempts),
        );

        let generation = self
            .store
            .create_generation(&CreateGeneration {
                user_id: request.user_id,
                operation_type: request.operation_type,
                provider_id: request.provider_id,
                params: params_json,
                priority: request.priority,
                max_retry_attempts,
            })
            .await?;

        tracing::info!(
            generation_id = generation.id,
            user_id = generation.user_id,
            provider_id = %generation.provider_id,
            operation_type = %generation.operation_type,
            "Generation created",
        );
        self.events.publish(GenerationEvent::Created {
            generation_id: generation.id,
            user_id: generation.user_id,
            provider_id: generation.provider_id.clone(),
            operation_type: generation.operation_type.clone(),
            timestamp: Utc::now(),
        });
        Ok(generation)
    }

    pub async fn get_generation(&self, id: DbId) -> Result<Option<Generation>, PipelineError> {
        Ok(self.store.get_generation(id).await?)
    }

    pub async fn list_generations(
        &self,
        query: &GenerationListQuery,
    ) -> Result<Vec<Generation>, PipelineError> {
        Ok(self.store.list_generations(query).await?)
    }

    /// Cancel a generation. Returns `false` when it was already terminal.
    pub async fn cancel_generation(&self, id: DbId) -> Result<bool, PipelineError> {
        let cancelled = self.store.cancel_generation(id).await?;
        if cancelled {
            tracing::info!(generation_id = id, "Generation cancelled");
        }
        Ok(cancelled)
    }

    /// Run one dispatch pass: attempt submission for every pending
    /// generation, highest priority and oldest first. Returns the number
    /// of generations handed to a provider.
    pub async fn dispatch_pending(&self) -> Result<usize, PipelineError> {
        let pending = self
            .store
            .list_generations_in_statuses(&[GenerationStatus::Pending])
            .await?;

        let mut submitted = 0;
        for generation in &pending {
            match self.pipeline.submit(generation.id).await {
                Ok(SubmitReport::Submitted { .. }) => submitted += 1,
                // Stays pending for the next pass.
                Ok(SubmitReport::NoAccount) => {}
                Ok(SubmitReport::LostRace) | Ok(SubmitReport::Failed { .. }) => {}
                Err(e) => {
                    tracing::error!(generation_id = generation.id, error = %e, "Dispatch failed");
                }
            }
        }
        if submitted > 0 {
            tracing::debug!(submitted, pending = pending.len(), "Dispatch pass finished");
        }
        Ok(submitted)
    }

    /// Dispatch pending generations on a fixed interval until cancelled.
    pub async fn run_dispatcher(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(interval_secs = interval.as_secs(), "Dispatcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Dispatcher stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.dispatch_pending().await {
                        tracing::error!(error = %e, "Dispatch pass failed");
                    }
                }
            }
        }
    }
}
