//! Dispatch orchestration: account pool, submission pipeline, status
//! poller, and the auto-retry handler.
//!
//! The pieces share three seams: the [`genflow_db::OrchestratorStore`]
//! trait for durable state, the [`genflow_providers::ProviderRegistry`]
//! for provider access, and the [`genflow_events::EventBus`] for
//! lifecycle notifications. Everything here is driven by the worker
//! binary; nothing spawns tasks behind the caller's back.

pub mod account_pool;
pub mod artifacts;
pub mod config;
pub mod poller;
pub mod retry_handler;
pub mod service;
pub mod submit;

pub use account_pool::{AccountLease, AccountPool, PoolError};
pub use artifacts::InputResolver;
pub use config::OrchestratorConfig;
pub use poller::StatusPoller;
pub use retry_handler::RetryHandler;
pub use service::{NewGenerationRequest, OrchestratorService};
pub use submit::{SubmissionPipeline, SubmitReport};

use genflow_core::types::DbId;

/// Errors surfaced by the orchestration layer.
///
/// Provider-side failures are not errors here — they are recorded on the
/// generation and reported through [`SubmitReport`] / events instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] genflow_db::StoreError),

    #[error(transparent)]
    Core(#[from] genflow_core::error::CoreError),

    #[error("No adapter registered for provider '{0}'")]
    UnknownProvider(String),

    #[error("Generation {0} not found")]
    MissingGeneration(DbId),
}
