//! The provider adapter contract.

use std::collections::HashMap;

use async_trait::async_trait;

use genflow_core::params::OperationParams;
use genflow_core::types::DbId;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Credentials snapshot for one provider account, handed out by the
/// account pool. Carries no balances or slot state — adapters only need
/// to authenticate.
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    pub account_id: DbId,
    pub api_key: String,
}

/// Provider-side asset ids for the operation's input artifacts,
/// produced by the pipeline's artifact stage: artifact id -> remote
/// asset id at the target provider.
#[derive(Debug, Clone, Default)]
pub struct ResolvedInputs(pub HashMap<DbId, String>);

impl ResolvedInputs {
    /// Look up the provider-side id for an input artifact.
    pub fn get(&self, artifact_id: DbId) -> Result<&str, AdapterError> {
        self.0
            .get(&artifact_id)
            .map(|s| s.as_str())
            .ok_or(AdapterError::UnresolvedInput(artifact_id))
    }
}

/// Result of a successful submit call.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// Provider-assigned job identifier, used for later status polls.
    pub provider_job_id: String,
    /// Raw provider reply, persisted verbatim on the submission row.
    pub raw_response: serde_json::Value,
}

/// Normalized remote job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteJobState {
    Queued,
    Running,
    Done,
    Error,
}

/// Normalized status poll result.
#[derive(Debug, Clone)]
pub struct RemoteStatus {
    pub state: RemoteJobState,
    /// Download URL for the result, present when `state` is `Done`.
    pub result_url: Option<String>,
    /// Provider error text, present when `state` is `Error`.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the adapter layer.
///
/// Adapters normalize provider failures into these variants and propagate
/// them — they never swallow errors or decide retry policy.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for classification and debugging.
        body: String,
    },

    /// The provider's reply was missing an expected field.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// The operation cannot be expressed in this provider's protocol.
    #[error("Unsupported operation for this provider: {0}")]
    UnsupportedOperation(String),

    /// An input artifact had no resolved provider-side asset id.
    #[error("Input artifact {0} has no provider-side asset id")]
    UnresolvedInput(DbId),
}

impl AdapterError {
    /// Whether this error is worth an adapter-internal transient retry
    /// (distinct from generation-level auto-retry).
    pub fn is_transient(&self) -> bool {
        match self {
            AdapterError::Request(_) => true,
            AdapterError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

/// Uniform interface over one external generation backend.
///
/// Implementations are stateless and shared read-only behind `Arc`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider identifier, matching `Generation::provider_id`.
    fn provider_id(&self) -> &str;

    /// Translate typed operation parameters into this provider's wire
    /// payload. Pure — no I/O, no account state.
    fn map_parameters(
        &self,
        params: &OperationParams,
        inputs: &ResolvedInputs,
    ) -> Result<serde_json::Value, AdapterError>;

    /// Submit a job. Must have a bounded timeout; the caller releases the
    /// account slot as soon as this returns.
    async fn execute(
        &self,
        account: &AccountCredentials,
        payload: &serde_json::Value,
    ) -> Result<SubmitOutcome, AdapterError>;

    /// Poll remote status for a previously submitted job. Never holds an
    /// account slot.
    async fn check_status(
        &self,
        account: &AccountCredentials,
        provider_job_id: &str,
    ) -> Result<RemoteStatus, AdapterError>;

    /// Upload an input asset (by source URL) to the provider, returning
    /// the provider-side asset id. Idempotency is the caller's concern —
    /// the artifact resolver caches results per provider.
    async fn upload_asset(
        &self,
        account: &AccountCredentials,
        source_url: &str,
        media_type: &str,
    ) -> Result<String, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_transient() {
        // Build a reqwest error by failing to parse an invalid URL scheme.
        let err = reqwest::Client::new().get("http://").build().unwrap_err();
        assert!(AdapterError::Request(err).is_transient());
    }

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        assert!(AdapterError::Api { status: 500, body: String::new() }.is_transient());
        assert!(AdapterError::Api { status: 503, body: String::new() }.is_transient());
        assert!(AdapterError::Api { status: 429, body: String::new() }.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        assert!(!AdapterError::Api { status: 400, body: String::new() }.is_transient());
        assert!(!AdapterError::Api { status: 401, body: String::new() }.is_transient());
        assert!(!AdapterError::UnsupportedOperation("fusion".into()).is_transient());
    }

    #[test]
    fn resolved_inputs_lookup() {
        let mut map = HashMap::new();
        map.insert(5, "asset-xyz".to_string());
        let inputs = ResolvedInputs(map);
        assert_eq!(inputs.get(5).unwrap(), "asset-xyz");
        assert!(matches!(
            inputs.get(6),
            Err(AdapterError::UnresolvedInput(6))
        ));
    }
}
