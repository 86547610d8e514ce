//! Worker binary: wires the store, provider adapters, account pool, and
//! the three orchestration loops (dispatcher, pollers, retry handler),
//! then runs until Ctrl-C.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genflow_db::{OrchestratorStore, PgStore};
use genflow_events::EventBus;
use genflow_pipeline::{
    AccountPool, OrchestratorConfig, OrchestratorService, RetryHandler, StatusPoller,
    SubmissionPipeline,
};
use genflow_providers::{ProviderAdapter, ProviderRegistry, RestAdapter, RestAdapterConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genflow_worker=info,genflow_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = OrchestratorConfig::from_env()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    genflow_db::health_check(&pool).await?;

    let registry = Arc::new(build_registry(&config)?);
    let provider_ids = registry.provider_ids();
    if provider_ids.is_empty() {
        anyhow::bail!("PROVIDERS must configure at least one provider (id=url, comma separated)");
    }
    tracing::info!(providers = ?provider_ids, "Worker starting");

    let store: Arc<dyn OrchestratorStore> = Arc::new(PgStore::new(pool));
    let events = Arc::new(EventBus::default());
    let account_pool = Arc::new(AccountPool::load(Arc::clone(&store), &provider_ids).await?);
    let pipeline = Arc::new(SubmissionPipeline::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&account_pool),
        Arc::clone(&events),
    ));
    let service = Arc::new(OrchestratorService::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&pipeline),
        Arc::clone(&events),
        config.max_retry_attempts,
    ));
    let poller = Arc::new(StatusPoller::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&account_pool),
        Arc::clone(&events),
    ));
    let retry_handler = Arc::new(RetryHandler::new(Arc::clone(&store), config.classifier()));

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    {
        let service = Arc::clone(&service);
        let cancel = cancel.clone();
        let interval = config.dispatch_interval;
        tasks.push(tokio::spawn(async move {
            service.run_dispatcher(interval, cancel).await;
        }));
    }
    for provider_id in &provider_ids {
        let poller = Arc::clone(&poller);
        let cancel = cancel.clone();
        let provider_id = provider_id.clone();
        let interval = config.poll_interval_for(&provider_id);
        tasks.push(tokio::spawn(async move {
            poller.run(&provider_id, interval, cancel).await;
        }));
    }
    {
        let retry_handler = Arc::clone(&retry_handler);
        let events = Arc::clone(&events);
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            retry_handler.run(events, cancel).await;
        }));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    tracing::info!("Worker stopped");
    Ok(())
}

/// Build the adapter registry from the `PROVIDERS` environment variable:
/// comma-separated `id=base_url` pairs.
fn build_registry(config: &OrchestratorConfig) -> anyhow::Result<ProviderRegistry> {
    let raw = std::env::var("PROVIDERS").unwrap_or_default();
    let mut registry = ProviderRegistry::new();
    for (provider_id, api_url) in parse_providers(&raw)? {
        let mut adapter_config = RestAdapterConfig::new(api_url);
        adapter_config.request_timeout = config.request_timeout;
        registry = registry.register(Arc::new(RestAdapter::new(provider_id, adapter_config))
            as Arc<dyn ProviderAdapter>);
    }
    Ok(registry)
}

/// Parse `id=url,id=url` into pairs, rejecting malformed entries.
fn parse_providers(raw: &str) -> anyhow::Result<Vec<(String, String)>> {
    let mut providers = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (id, url) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Malformed PROVIDERS entry '{entry}', want id=url"))?;
        let (id, url) = (id.trim(), url.trim());
        if id.is_empty() || url.is_empty() {
            anyhow::bail!("Malformed PROVIDERS entry '{entry}', want id=url");
        }
        providers.push((id.to_lowercase(), url.to_string()));
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_providers_splits_pairs() {
        let providers =
            parse_providers("dreamframe=https://api.dreamframe.ai, other=http://localhost:9000")
                .unwrap();
        assert_eq!(
            providers,
            vec![
                ("dreamframe".to_string(), "https://api.dreamframe.ai".to_string()),
                ("other".to_string(), "http://localhost:9000".to_string()),
            ]
        );
    }

    #[test]
    fn parse_providers_rejects_malformed_entries() {
        assert!(parse_providers("dreamframe").is_err());
        assert!(parse_providers("=https://x").is_err());
        assert!(parse_providers("dreamframe=").is_err());
    }

    #[test]
    fn parse_providers_empty_is_ok() {
        assert!(parse_providers("").unwrap().is_empty());
    }
}
