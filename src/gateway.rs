//! Gateway operations on the BAP side of the network.
//!
//! The gateway broadcasts searches to providers, lists the providers the
//! registry knows, forwards track requests to one provider, and relays
//! `on_search` callbacks back to the buyer application.

use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::broadcaster::Broadcaster;
use crate::context::CALLBACK_PREFIX;
use crate::error::{BecknError, Result};
use crate::model::{BecknRequest, BecknResponse, ErrorCode, ProtocolError};

pub struct Gateway {
    broadcaster: Arc<Broadcaster>,
    client: Client,
}

impl Gateway {
    pub fn new(broadcaster: Arc<Broadcaster>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { broadcaster, client })
    }

    /// Broadcasts the whole request body to every matching provider.
    pub async fn search(&self, request: &BecknRequest) -> Result<Vec<Value>> {
        let payload = serde_json::to_value(request)?;
        self.broadcaster
            .broadcast_search(&request.context.domain, &request.context.city, &payload)
            .await
    }

    /// Lists the providers registered for the request's domain and city.
    pub async fn discover(&self, request: &BecknRequest) -> BecknResponse {
        let context = request.context.clone();
        let lookup = self
            .broadcaster
            .registry()
            .lookup(&context.domain, &context.city)
            .await;

        let outcome = match lookup {
            Ok(providers) => {
                let providers: Vec<Value> = providers
                    .iter()
                    .map(|p| {
                        json!({
                            "id": p.subscriber_id,
                            "name": p.name.as_deref().unwrap_or("Unknown"),
                            "bpp_uri": p.subscriber_url,
                        })
                    })
                    .collect();
                Ok(json!({ "providers": providers }))
            }
            Err(e) => {
                tracing::error!("Discovery failed: {}", e);
                Err(ProtocolError::new(ErrorCode::DiscoveryFailed, e.to_string()))
            }
        };

        BecknResponse::from_outcome(context, outcome)
    }

    /// Forwards a track request to the provider named by `context.bpp_id`.
    ///
    /// Returns the provider's answer unchanged, or an error envelope.
    pub async fn forward_track(&self, request: &BecknRequest) -> Value {
        match self.try_forward_track(request).await {
            Ok(answer) => answer,
            Err(error) => json!({
                "context": request.context,
                "error": error,
            }),
        }
    }

    async fn try_forward_track(&self, request: &BecknRequest) -> std::result::Result<Value, ProtocolError> {
        let Some(bpp_id) = request.context.bpp_id.as_deref() else {
            return Err(ProtocolError::new(
                ErrorCode::InvalidRequest,
                "Missing 'bpp_id' in context",
            ));
        };

        let tracking_failed = |e: BecknError| {
            tracing::error!(bpp_id, "Tracking failed: {}", e);
            ProtocolError::new(ErrorCode::TrackingFailed, e.to_string())
        };

        let provider = self
            .broadcaster
            .registry()
            .resolve(bpp_id)
            .await
            .map_err(tracking_failed)?
            .ok_or_else(|| ProtocolError::new(ErrorCode::BppNotFound, format!("No BPP found for id {}", bpp_id)))?;

        let url = provider.endpoint("track");
        tracing::info!(bpp_id, "Forwarding track request to {}", url);

        let answer = async {
            let response = self.client.post(&url).json(request).send().await?.error_for_status()?;
            Ok::<Value, BecknError>(response.json::<Value>().await?)
        }
        .await
        .map_err(tracking_failed)?;

        Ok(answer)
    }

    /// Relays an `on_search` callback to `<bap_uri>/on_search`.
    pub async fn relay_on_search(&self, response: &BecknResponse) -> Result<()> {
        let bap_uri = response
            .context
            .bap_uri
            .as_deref()
            .ok_or_else(|| BecknError::InvalidInput("on_search context has no bap_uri".to_string()))?;
        let url = format!("{}/{}search", bap_uri.trim_end_matches('/'), CALLBACK_PREFIX);

        self.client
            .post(&url)
            .json(response)
            .send()
            .await?
            .error_for_status()?;

        tracing::debug!(transaction_id = %response.context.transaction_id, "Relayed on_search to {}", url);
        Ok(())
    }
}
