//! Input artifact resolution: getting local artifacts into the target
//! provider before submission.
//!
//! Operations that reference existing artifacts (image-to-video, extend,
//! transition, fusion) need provider-side asset ids for them. Uploads are
//! cached on the artifact row per provider, so re-submitting or retrying
//! never uploads the same bytes twice.

use std::sync::Arc;

use genflow_core::params::OperationParams;
use genflow_core::types::DbId;
use genflow_db::OrchestratorStore;
use genflow_providers::{AccountCredentials, AdapterError, ProviderAdapter, ResolvedInputs};

use crate::PipelineError;

/// What went wrong while resolving inputs for one attempt.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// A referenced artifact row does not exist. Permanent.
    #[error("Input artifact {0} not found")]
    ArtifactNotFound(DbId),

    /// The upload to the provider failed.
    #[error("Uploading artifact {artifact_id} failed: {source}")]
    Upload {
        artifact_id: DbId,
        #[source]
        source: AdapterError,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Resolves an operation's input artifacts to provider-side asset ids.
pub struct InputResolver {
    store: Arc<dyn OrchestratorStore>,
}

impl InputResolver {
    pub fn new(store: Arc<dyn OrchestratorStore>) -> Self {
        Self { store }
    }

    /// Resolve every input artifact the operation references, uploading
    /// any that the target provider has not seen yet.
    pub async fn resolve(
        &self,
        adapter: &dyn ProviderAdapter,
        account: &AccountCredentials,
        params: &OperationParams,
    ) -> Result<ResolvedInputs, ResolveError> {
        let mut resolved = ResolvedInputs::default();
        for artifact_id in params.input_asset_ids() {
            let artifact = self
                .store
                .get_artifact(artifact_id)
                .await
                .map_err(PipelineError::from)?
                .ok_or(ResolveError::ArtifactNotFound(artifact_id))?;

            let asset_id = match artifact.provider_upload_for(adapter.provider_id()) {
                Some(cached) => cached,
                None => {
                    let asset_id = adapter
                        .upload_asset(account, &artifact.remote_url, &artifact.media_type)
                        .await
                        .map_err(|source| ResolveError::Upload {
                            artifact_id,
                            source,
                        })?;
                    tracing::info!(
                        artifact_id,
                        provider_id = adapter.provider_id(),
                        asset_id = %asset_id,
                        "Artifact uploaded to provider",
                    );
                    self.store
                        .cache_provider_upload(artifact_id, adapter.provider_id(), &asset_id)
                        .await
                        .map_err(PipelineError::from)?;
                    asset_id
                }
            };
            resolved.0.insert(artifact_id, asset_id);
        }
        Ok(resolved)
    }
}
