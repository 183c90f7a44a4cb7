use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::context::Context;
use crate::error::Result;
use crate::model::{BecknResponse, Outcome};

/// Delivers the result of an action to the caller's callback address.
///
/// Delivery is best-effort and at-most-once. Implementations swallow their
/// own failures; nothing is reported back to the dispatcher.
#[async_trait]
pub trait CallbackSink: Send + Sync {
    async fn deliver(&self, context: Context, outcome: Outcome);
}

pub struct HttpCallbackSink {
    client: Client,
}

impl HttpCallbackSink {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Posts one envelope to `context.bap_uri`. `Ok(false)` means there was nowhere to send it.
    pub async fn try_deliver(&self, context: Context, outcome: Outcome) -> Result<bool> {
        let Some(callback_url) = context.bap_uri.clone() else {
            return Ok(false);
        };

        let payload = BecknResponse::from_outcome(context, outcome);
        self.client
            .post(&callback_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(true)
    }
}

#[async_trait]
impl CallbackSink for HttpCallbackSink {
    async fn deliver(&self, context: Context, outcome: Outcome) {
        let callback_url = context.bap_uri.clone();
        let action = context.action.clone();
        let transaction_id = context.transaction_id.clone();

        match self.try_deliver(context, outcome).await {
            Ok(true) => tracing::debug!(%action, %transaction_id, "Callback delivered"),
            Ok(false) => tracing::debug!(%action, %transaction_id, "No bap_uri, callback skipped"),
            Err(e) => tracing::warn!(
                %action,
                %transaction_id,
                "Failed to send callback to {}: {}",
                callback_url.unwrap_or_default(),
                e
            ),
        }
    }
}
