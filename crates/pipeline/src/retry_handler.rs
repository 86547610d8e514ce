//! Auto-retry handler: turns failure events into requeues.
//!
//! Subscribes to the event bus and reacts to failures by classifying the
//! error text. Content-filter and temporary failures are requeued
//! (Failed -> Pending on the same row, retry count bumped); permanent
//! failures and exhausted retry budgets are left alone. The requeue CAS
//! is guarded by the event's retry count, so a redelivered event can
//! never requeue twice.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use genflow_core::retry::{FailureClass, RetryClassifier};
use genflow_core::types::DbId;
use genflow_db::OrchestratorStore;
use genflow_events::{EventBus, GenerationEvent};

use crate::PipelineError;

/// Reacts to generation failures with bounded automatic retries.
pub struct RetryHandler {
    store: Arc<dyn OrchestratorStore>,
    classifier: RetryClassifier,
}

impl RetryHandler {
    pub fn new(store: Arc<dyn OrchestratorStore>, classifier: RetryClassifier) -> Self {
        Self { store, classifier }
    }

    /// Consume failure events until cancelled.
    pub async fn run(&self, events: Arc<EventBus>, cancel: CancellationToken) {
        let mut rx = events.subscribe();
        tracing::info!("Auto-retry handler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Auto-retry handler stopping");
                    break;
                }
                received = rx.recv() => match received {
                    Ok(GenerationEvent::Failed { generation_id, error, retry_count, .. }) => {
                        if let Err(e) = self.handle_failure(generation_id, &error, retry_count).await {
                            tracing::error!(generation_id, error = %e, "Retry handling failed");
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed failures stay Failed; an operator can
                        // requeue them manually.
                        tracing::warn!(skipped, "Retry handler lagged behind the event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Decide and apply the retry verdict for one failure. Returns whether
    /// the generation was requeued.
    pub async fn handle_failure(
        &self,
        generation_id: DbId,
        error: &str,
        retry_count: i32,
    ) -> Result<bool, PipelineError> {
        let class = self.classifier.classify(error);
        tracing::debug!(
            generation_id,
            verdict = class.as_str(),
            retry_count,
            "Failure classified",
        );
        if class == FailureClass::Permanent {
            return Ok(false);
        }

        let Some(generation) = self.store.get_generation(generation_id).await? else {
            return Ok(false);
        };
        if retry_count >= generation.max_retry_attempts {
            tracing::info!(
                generation_id,
                retry_count,
                max_retry_attempts = generation.max_retry_attempts,
                "Retry budget exhausted",
            );
            return Ok(false);
        }

        let requeued = self
            .store
            .requeue_generation(generation_id, retry_count)
            .await?;
        if requeued {
            tracing::info!(
                generation_id,
                verdict = class.as_str(),
                retry_attempt = retry_count + 1,
                "Generation requeued for retry",
            );
        } else {
            // Redelivered event or a concurrent transition; nothing to do.
            tracing::debug!(generation_id, retry_count, "Requeue lost the race");
        }
        Ok(requeued)
    }
}
