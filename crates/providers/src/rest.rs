//! Reference adapter for providers speaking the common REST generation
//! protocol (`POST /v1/jobs`, `GET /v1/jobs/{id}`, `POST /v1/assets`)
//! with bearer-token authentication.
//!
//! Transient failures (network errors, 5xx, 429) are retried a small
//! bounded number of times with jittered exponential backoff before
//! surfacing. That is adapter-internal plumbing — generation-level
//! auto-retry across whole attempts happens in the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use genflow_core::params::OperationParams;

use crate::adapter::{
    AccountCredentials, AdapterError, ProviderAdapter, RemoteJobState, RemoteStatus,
    ResolvedInputs, SubmitOutcome,
};

/// Tunables for one REST provider endpoint.
#[derive(Debug, Clone)]
pub struct RestAdapterConfig {
    /// Base HTTP URL, e.g. `https://api.dreamframe.ai`.
    pub api_url: String,
    /// Per-request timeout. Every provider call is bounded by this.
    pub request_timeout: Duration,
    /// Extra attempts after the first for transient failures.
    pub max_transient_retries: u32,
    /// Delay before the first transient retry.
    pub retry_initial_delay: Duration,
    /// Upper bound on the delay between transient retries.
    pub retry_max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub retry_multiplier: f64,
}

impl RestAdapterConfig {
    /// Config with production defaults for a base URL.
    pub fn new(api_url: String) -> Self {
        Self {
            api_url,
            request_timeout: Duration::from_secs(30),
            max_transient_retries: 2,
            retry_initial_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(5),
            retry_multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`RestAdapterConfig::retry_max_delay`].
pub fn next_delay(current: Duration, config: &RestAdapterConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.retry_multiplier) as u64;
    Duration::from_millis(next_ms).min(config.retry_max_delay)
}

/// Add up to 100ms of random jitter so synchronized workers do not
/// retry in lockstep.
fn jittered(delay: Duration) -> Duration {
    delay + Duration::from_millis(rand::rng().random_range(0..100))
}

/// HTTP adapter for one REST generation provider.
pub struct RestAdapter {
    provider_id: String,
    client: reqwest::Client,
    config: RestAdapterConfig,
}

impl RestAdapter {
    /// Create an adapter for a provider instance.
    pub fn new(provider_id: String, config: RestAdapterConfig) -> Self {
        Self {
            provider_id,
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create an adapter reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling across multiple providers).
    pub fn with_client(
        provider_id: String,
        client: reqwest::Client,
        config: RestAdapterConfig,
    ) -> Self {
        Self {
            provider_id,
            client,
            config,
        }
    }

    // ---- private helpers ----

    /// Send a request, turning non-2xx replies into [`AdapterError::Api`]
    /// with the raw body retained for classification.
    async fn send(request: reqwest::RequestBuilder) -> Result<serde_json::Value, AdapterError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AdapterError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<serde_json::Value>().await?)
    }

    /// Send with bounded transient retry. The request is rebuilt for each
    /// attempt via the closure.
    async fn send_with_retry<F>(&self, build: F) -> Result<serde_json::Value, AdapterError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        let mut delay = self.config.retry_initial_delay;
        loop {
            match Self::send(build()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_transient_retries => {
                    attempt += 1;
                    tracing::warn!(
                        provider_id = %self.provider_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider error, retrying request",
                    );
                    tokio::time::sleep(jittered(delay)).await;
                    delay = next_delay(delay, &self.config);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn jobs_url(&self) -> String {
        format!("{}/v1/jobs", self.config.api_url)
    }
}

/// Parse the provider's job reply into a normalized [`RemoteStatus`].
///
/// Accepts the status spellings seen across protocol revisions; unknown
/// spellings are a malformed response rather than a silent guess.
pub fn parse_remote_status(value: &serde_json::Value) -> Result<RemoteStatus, AdapterError> {
    let status = value
        .get("status")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AdapterError::MalformedResponse("missing status field".to_string()))?;

    let state = match status {
        "queued" | "pending" => RemoteJobState::Queued,
        "running" | "processing" | "in_progress" => RemoteJobState::Running,
        "succeeded" | "completed" | "done" => RemoteJobState::Done,
        "failed" | "error" => RemoteJobState::Error,
        other => {
            return Err(AdapterError::MalformedResponse(format!(
                "unknown job status '{other}'"
            )))
        }
    };

    let result_url = value
        .get("output_url")
        .or_else(|| value.get("result_url"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let error = value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Ok(RemoteStatus {
        state,
        result_url,
        error,
    })
}

#[async_trait]
impl ProviderAdapter for RestAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn map_parameters(
        &self,
        params: &OperationParams,
        inputs: &ResolvedInputs,
    ) -> Result<serde_json::Value, AdapterError> {
        let payload = match params {
            OperationParams::TextToVideo {
                prompt,
                duration_secs,
                aspect_ratio,
                seed,
            } => serde_json::json!({
                "operation": "text_to_video",
                "prompt": prompt,
                "duration_secs": duration_secs,
                "aspect_ratio": aspect_ratio,
                "seed": seed,
            }),
            OperationParams::ImageToVideo {
                image_asset_id,
                prompt,
                duration_secs,
                seed,
            } => serde_json::json!({
                "operation": "image_to_video",
                "image_asset": inputs.get(*image_asset_id)?,
                "prompt": prompt,
                "duration_secs": duration_secs,
                "seed": seed,
            }),
            OperationParams::Extend {
                video_asset_id,
                prompt,
                extend_secs,
            } => serde_json::json!({
                "operation": "extend",
                "video_asset": inputs.get(*video_asset_id)?,
                "prompt": prompt,
                "extend_secs": extend_secs,
            }),
            OperationParams::Transition {
                from_asset_id,
                to_asset_id,
                prompt,
            } => serde_json::json!({
                "operation": "transition",
                "from_asset": inputs.get(*from_asset_id)?,
                "to_asset": inputs.get(*to_asset_id)?,
                "prompt": prompt,
            }),
            OperationParams::Fusion { asset_ids, prompt } => {
                let assets: Result<Vec<&str>, AdapterError> =
                    asset_ids.iter().map(|id| inputs.get(*id)).collect();
                serde_json::json!({
                    "operation": "fusion",
                    "assets": assets?,
                    "prompt": prompt,
                })
            }
        };
        Ok(payload)
    }

    async fn execute(
        &self,
        account: &AccountCredentials,
        payload: &serde_json::Value,
    ) -> Result<SubmitOutcome, AdapterError> {
        let response = self
            .send_with_retry(|| {
                self.client
                    .post(self.jobs_url())
                    .timeout(self.config.request_timeout)
                    .bearer_auth(&account.api_key)
                    .json(payload)
            })
            .await?;

        let provider_job_id = response
            .get("job_id")
            .or_else(|| response.get("id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::MalformedResponse("missing job_id field".to_string()))?
            .to_string();

        tracing::info!(
            provider_id = %self.provider_id,
            account_id = account.account_id,
            provider_job_id = %provider_job_id,
            "Job submitted to provider",
        );

        Ok(SubmitOutcome {
            provider_job_id,
            raw_response: response,
        })
    }

    async fn check_status(
        &self,
        account: &AccountCredentials,
        provider_job_id: &str,
    ) -> Result<RemoteStatus, AdapterError> {
        let response = self
            .send_with_retry(|| {
                self.client
                    .get(format!("{}/{}", self.jobs_url(), provider_job_id))
                    .timeout(self.config.request_timeout)
                    .bearer_auth(&account.api_key)
            })
            .await?;

        parse_remote_status(&response)
    }

    async fn upload_asset(
        &self,
        account: &AccountCredentials,
        source_url: &str,
        media_type: &str,
    ) -> Result<String, AdapterError> {
        let body = serde_json::json!({
            "source_url": source_url,
            "media_type": media_type,
        });
        let response = self
            .send_with_retry(|| {
                self.client
                    .post(format!("{}/v1/assets", self.config.api_url))
                    .timeout(self.config.request_timeout)
                    .bearer_auth(&account.api_key)
                    .json(&body)
            })
            .await?;

        response
            .get("asset_id")
            .or_else(|| response.get("id"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| AdapterError::MalformedResponse("missing asset_id field".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn adapter() -> RestAdapter {
        RestAdapter::new(
            "dreamframe".to_string(),
            RestAdapterConfig::new("https://api.dreamframe.test".to_string()),
        )
    }

    fn inputs(pairs: &[(i64, &str)]) -> ResolvedInputs {
        let map: HashMap<i64, String> = pairs
            .iter()
            .map(|(id, asset)| (*id, asset.to_string()))
            .collect();
        ResolvedInputs(map)
    }

    // -- map_parameters --

    #[test]
    fn maps_text_to_video() {
        let params = OperationParams::TextToVideo {
            prompt: "a red fox".to_string(),
            duration_secs: Some(5.0),
            aspect_ratio: Some("16:9".to_string()),
            seed: Some(42),
        };
        let payload = adapter()
            .map_parameters(&params, &ResolvedInputs::default())
            .unwrap();
        assert_eq!(payload["operation"], "text_to_video");
        assert_eq!(payload["prompt"], "a red fox");
        assert_eq!(payload["duration_secs"], 5.0);
        assert_eq!(payload["seed"], 42);
    }

    #[test]
    fn maps_image_to_video_with_resolved_asset() {
        let params = OperationParams::ImageToVideo {
            image_asset_id: 7,
            prompt: None,
            duration_secs: None,
            seed: None,
        };
        let payload = adapter()
            .map_parameters(&params, &inputs(&[(7, "asset-abc")]))
            .unwrap();
        assert_eq!(payload["operation"], "image_to_video");
        assert_eq!(payload["image_asset"], "asset-abc");
    }

    #[test]
    fn maps_transition_with_both_assets() {
        let params = OperationParams::Transition {
            from_asset_id: 1,
            to_asset_id: 2,
            prompt: Some("crossfade".to_string()),
        };
        let payload = adapter()
            .map_parameters(&params, &inputs(&[(1, "a-1"), (2, "a-2")]))
            .unwrap();
        assert_eq!(payload["from_asset"], "a-1");
        assert_eq!(payload["to_asset"], "a-2");
    }

    #[test]
    fn maps_fusion_asset_list() {
        let params = OperationParams::Fusion {
            asset_ids: vec![1, 2],
            prompt: "merge".to_string(),
        };
        let payload = adapter()
            .map_parameters(&params, &inputs(&[(1, "a-1"), (2, "a-2")]))
            .unwrap();
        assert_eq!(payload["assets"][0], "a-1");
        assert_eq!(payload["assets"][1], "a-2");
    }

    #[test]
    fn unresolved_input_is_an_error() {
        let params = OperationParams::ImageToVideo {
            image_asset_id: 9,
            prompt: None,
            duration_secs: None,
            seed: None,
        };
        let result = adapter().map_parameters(&params, &ResolvedInputs::default());
        assert!(matches!(result, Err(AdapterError::UnresolvedInput(9))));
    }

    // -- parse_remote_status --

    #[test]
    fn parses_queued_and_running() {
        let s = parse_remote_status(&serde_json::json!({"status": "queued"})).unwrap();
        assert_eq!(s.state, RemoteJobState::Queued);
        let s = parse_remote_status(&serde_json::json!({"status": "processing"})).unwrap();
        assert_eq!(s.state, RemoteJobState::Running);
    }

    #[test]
    fn parses_done_with_output_url() {
        let s = parse_remote_status(&serde_json::json!({
            "status": "succeeded",
            "output_url": "https://cdn.test/out.mp4",
        }))
        .unwrap();
        assert_eq!(s.state, RemoteJobState::Done);
        assert_eq!(s.result_url.as_deref(), Some("https://cdn.test/out.mp4"));
    }

    #[test]
    fn parses_error_with_message() {
        let s = parse_remote_status(&serde_json::json!({
            "status": "failed",
            "error": "content filter violation",
        }))
        .unwrap();
        assert_eq!(s.state, RemoteJobState::Error);
        assert_eq!(s.error.as_deref(), Some("content filter violation"));
    }

    #[test]
    fn missing_status_is_malformed() {
        assert!(parse_remote_status(&serde_json::json!({"ok": true})).is_err());
    }

    #[test]
    fn unknown_status_is_malformed() {
        assert!(parse_remote_status(&serde_json::json!({"status": "warming_up"})).is_err());
    }

    // -- backoff --

    #[test]
    fn next_delay_doubles() {
        let config = RestAdapterConfig::new("http://x".to_string());
        let d = next_delay(Duration::from_millis(500), &config);
        assert_eq!(d, Duration::from_secs(1));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = RestAdapterConfig::new("http://x".to_string());
        let d = next_delay(Duration::from_secs(4), &config);
        assert_eq!(d, Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_bounded() {
        let base = Duration::from_millis(500);
        for _ in 0..50 {
            let j = jittered(base);
            assert!(j >= base);
            assert!(j < base + Duration::from_millis(100));
        }
    }
}
