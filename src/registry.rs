use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BecknError, Result};

pub const PROVIDER_TYPE: &str = "BPP";

/// A provider as listed by the registry. A snapshot; never cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderDescriptor {
    #[serde(alias = "subscriberId")]
    pub subscriber_id: String,
    /// Base address of the provider's action endpoints.
    #[serde(alias = "url")]
    pub subscriber_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

impl ProviderDescriptor {
    pub fn new(subscriber_id: impl Into<String>, subscriber_url: impl Into<String>) -> Self {
        Self {
            subscriber_id: subscriber_id.into(),
            subscriber_url: subscriber_url.into(),
            name: None,
            domain: None,
            city: None,
            capabilities: Vec::new(),
        }
    }

    /// `<subscriber_url>/<action>`, tolerating a trailing slash on the base address.
    pub fn endpoint(&self, action: &str) -> String {
        format!("{}/{}", self.subscriber_url.trim_end_matches('/'), action)
    }

    fn serves(&self, domain: &str, city: &str) -> bool {
        self.domain.as_deref().map_or(true, |d| d == domain) && self.city.as_deref().map_or(true, |c| c == city)
    }
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// Providers of type BPP currently registered for `domain` and `city`.
    async fn lookup(&self, domain: &str, city: &str) -> Result<Vec<ProviderDescriptor>>;

    /// A single provider by subscriber id.
    async fn resolve(&self, subscriber_id: &str) -> Result<Option<ProviderDescriptor>>;
}

/// Registry client for a subscriber lookup service over HTTP.
pub struct HttpRegistry {
    endpoint: String,
    client: Client,
}

impl HttpRegistry {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { endpoint, client })
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Vec<ProviderDescriptor>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(params)
            .send()
            .await
            .map_err(|e| BecknError::Registry(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BecknError::Registry(format!(
                "{} answered {}",
                self.endpoint,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| BecknError::Registry(format!("Malformed registry response: {}", e)))
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn lookup(&self, domain: &str, city: &str) -> Result<Vec<ProviderDescriptor>> {
        let providers = self
            .query(&[("type", PROVIDER_TYPE), ("domain", domain), ("city", city)])
            .await?;
        tracing::debug!(domain, city, count = providers.len(), "Registry lookup");
        Ok(providers)
    }

    async fn resolve(&self, subscriber_id: &str) -> Result<Option<ProviderDescriptor>> {
        let providers = self
            .query(&[("type", PROVIDER_TYPE), ("subscriber_id", subscriber_id)])
            .await?;
        Ok(providers.into_iter().find(|p| p.subscriber_id == subscriber_id))
    }
}

/// Fixed provider list, filtered by the domain and city each descriptor declares.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    providers: Vec<ProviderDescriptor>,
}

impl StaticRegistry {
    pub fn new(providers: Vec<ProviderDescriptor>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn lookup(&self, domain: &str, city: &str) -> Result<Vec<ProviderDescriptor>> {
        Ok(self
            .providers
            .iter()
            .filter(|p| p.serves(domain, city))
            .cloned()
            .collect())
    }

    async fn resolve(&self, subscriber_id: &str) -> Result<Option<ProviderDescriptor>> {
        Ok(self.providers.iter().find(|p| p.subscriber_id == subscriber_id).cloned())
    }
}
