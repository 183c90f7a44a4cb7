//! Scatter/gather of discovery requests across providers.
//!
//! Every provider call is an isolated branch: a failing or slow provider only
//! drops out of the aggregate. Branches run under a shared concurrency
//! ceiling and each has its own deadline.

use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::registry::{ProviderDescriptor, Registry};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BranchFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider answered HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response body: {0}")]
    Malformed(String),
}

/// What happened to one provider call.
#[derive(Debug, Clone)]
pub struct BranchOutcome {
    pub provider_id: String,
    pub result: std::result::Result<Value, BranchFailure>,
}

pub struct Broadcaster {
    registry: Arc<dyn Registry>,
    client: Client,
    limiter: Arc<Semaphore>,
    timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: Arc<dyn Registry>, max_concurrency: usize, timeout: Duration) -> Self {
        Self {
            registry,
            client: Client::new(),
            limiter: Arc::new(Semaphore::new(max_concurrency.max(1))),
            timeout,
        }
    }

    pub fn from_config(registry: Arc<dyn Registry>, config: &GatewayConfig) -> Self {
        Self::new(registry, config.max_concurrency, config.timeout())
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Posts `payload` to every provider serving `domain`/`city` and returns the
    /// successful response bodies in completion order.
    ///
    /// Only a failed registry lookup is an error; provider failures shrink the result.
    pub async fn broadcast_search(&self, domain: &str, city: &str, payload: &Value) -> Result<Vec<Value>> {
        let providers = self.registry.lookup(domain, city).await?;
        if providers.is_empty() {
            tracing::info!(domain, city, "No providers registered, nothing to broadcast");
            return Ok(Vec::new());
        }

        let outcomes = self.scatter(&providers, "search", payload).await;
        let total = outcomes.len();
        let responses = gather(outcomes);
        tracing::info!(domain, city, total, succeeded = responses.len(), "Search broadcast finished");
        Ok(responses)
    }

    /// Runs one branch per provider and collects the outcomes as they complete.
    pub async fn scatter(&self, providers: &[ProviderDescriptor], action: &str, payload: &Value) -> Vec<BranchOutcome> {
        let mut branches: FuturesUnordered<_> = providers
            .iter()
            .map(|provider| self.call_provider(provider, action, payload))
            .collect();

        let mut outcomes = Vec::with_capacity(providers.len());
        while let Some(outcome) = branches.next().await {
            if let Err(failure) = &outcome.result {
                tracing::warn!(provider = %outcome.provider_id, "Dropping provider from aggregate: {}", failure);
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn call_provider(&self, provider: &ProviderDescriptor, action: &str, payload: &Value) -> BranchOutcome {
        let provider_id = provider.subscriber_id.clone();

        // Closed only when the broadcaster is dropped.
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return BranchOutcome {
                    provider_id,
                    result: Err(BranchFailure::Transport(e.to_string())),
                }
            }
        };

        let url = provider.endpoint(action);
        let result = match tokio::time::timeout(self.timeout, self.post_json(&url, payload)).await {
            Ok(result) => result,
            Err(_) => Err(BranchFailure::Timeout(self.timeout)),
        };

        BranchOutcome { provider_id, result }
    }

    async fn post_json(&self, url: &str, payload: &Value) -> std::result::Result<Value, BranchFailure> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| BranchFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BranchFailure::Status(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| BranchFailure::Malformed(e.to_string()))
    }
}

/// Keeps the successful bodies, in the order the branches finished.
pub fn gather(outcomes: Vec<BranchOutcome>) -> Vec<Value> {
    outcomes.into_iter().filter_map(|outcome| outcome.result.ok()).collect()
}
