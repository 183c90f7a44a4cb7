//! Provider-side entry points: acknowledge now, deliver later.
//!
//! Each entry point checks the request shape and returns an Ack without
//! touching the store or the network. The action itself runs on the worker
//! pool and its result goes to the caller's `bap_uri` as an `on_<action>`
//! callback.

use std::sync::Arc;
use tracing::Instrument;

use crate::actions;
use crate::callback::CallbackSink;
use crate::context::{Action, Context};
use crate::error::{BecknError, Result};
use crate::model::{AckResponse, BecknRequest, ErrorCode, Outcome, ProtocolError, SupportInfo};
use crate::store::Store;
use crate::worker::WorkerPool;

pub struct ActionDispatcher {
    store: Arc<dyn Store>,
    callbacks: Arc<dyn CallbackSink>,
    workers: Arc<WorkerPool>,
    support: SupportInfo,
}

impl ActionDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        callbacks: Arc<dyn CallbackSink>,
        workers: Arc<WorkerPool>,
        support: SupportInfo,
    ) -> Self {
        Self {
            store,
            callbacks,
            workers,
            support,
        }
    }

    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.workers
    }

    pub fn search(&self, request: BecknRequest) -> Result<AckResponse> {
        self.dispatch(Action::Search, request)
    }

    pub fn select(&self, request: BecknRequest) -> Result<AckResponse> {
        self.dispatch(Action::Select, request)
    }

    pub fn init(&self, request: BecknRequest) -> Result<AckResponse> {
        self.dispatch(Action::Init, request)
    }

    pub fn confirm(&self, request: BecknRequest) -> Result<AckResponse> {
        self.dispatch(Action::Confirm, request)
    }

    pub fn status(&self, request: BecknRequest) -> Result<AckResponse> {
        self.dispatch(Action::Status, request)
    }

    pub fn track(&self, request: BecknRequest) -> Result<AckResponse> {
        self.dispatch(Action::Track, request)
    }

    pub fn cancel(&self, request: BecknRequest) -> Result<AckResponse> {
        self.dispatch(Action::Cancel, request)
    }

    pub fn update(&self, request: BecknRequest) -> Result<AckResponse> {
        self.dispatch(Action::Update, request)
    }

    pub fn rating(&self, request: BecknRequest) -> Result<AckResponse> {
        self.dispatch(Action::Rating, request)
    }

    pub fn support(&self, request: BecknRequest) -> Result<AckResponse> {
        self.dispatch(Action::Support, request)
    }

    /// Synchronous phase shared by every entry point. Never awaits.
    ///
    /// A mismatched `context.action` is rejected with no Ack and no callback.
    /// `init` is the one action that can answer NACK: a request whose
    /// `message.order` is not an object is refused before any work is queued,
    /// and the caller also gets an error callback.
    pub fn dispatch(&self, expected: Action, request: BecknRequest) -> Result<AckResponse> {
        if request.context.action != expected.as_str() {
            return Err(BecknError::ActionMismatch {
                expected,
                found: request.context.action.clone(),
            });
        }

        let span = tracing::info_span!(
            "action",
            action = %expected,
            transaction_id = %request.context.transaction_id,
            message_id = %request.context.message_id,
        );

        if expected == Action::Init {
            if let Some(order) = request.order().filter(|order| !order.is_object()) {
                let _entered = span.enter();
                tracing::warn!("Refusing init with non-object order: {}", order);
                let error = ProtocolError::new(ErrorCode::InvalidRequest, "message.order must be an object");
                self.spawn_delivery(request.context, Err(error), span.clone())?;
                return Ok(AckResponse::nack());
            }
        }

        let store = self.store.clone();
        let callbacks = self.callbacks.clone();
        let support = self.support.clone();
        self.workers.spawn(
            async move {
                let outcome = actions::execute(store.as_ref(), &support, expected, &request).await;
                log_outcome(&outcome);
                callbacks.deliver(request.context.derive_callback(), outcome).await;
            }
            .instrument(span),
        )?;

        Ok(AckResponse::ack())
    }

    fn spawn_delivery(&self, context: Context, outcome: Outcome, span: tracing::Span) -> Result<()> {
        let callbacks = self.callbacks.clone();
        self.workers.spawn(
            async move {
                callbacks.deliver(context.derive_callback(), outcome).await;
            }
            .instrument(span),
        )
    }
}

fn log_outcome(outcome: &Outcome) {
    match outcome {
        Ok(_) => tracing::debug!("Action completed"),
        Err(error) => tracing::info!(code = %error.code, "Action failed: {}", error.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockStore;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct ChannelSink(mpsc::UnboundedSender<(Context, Outcome)>);

    #[async_trait]
    impl CallbackSink for ChannelSink {
        async fn deliver(&self, context: Context, outcome: Outcome) {
            let _ = self.0.send((context, outcome));
        }
    }

    fn dispatcher(store: MockStore) -> (ActionDispatcher, mpsc::UnboundedReceiver<(Context, Outcome)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = ActionDispatcher::new(
            Arc::new(store),
            Arc::new(ChannelSink(tx)),
            Arc::new(WorkerPool::new()),
            SupportInfo {
                contact: "help@bpp.test".to_string(),
                phone: "+100".to_string(),
            },
        );
        (dispatcher, rx)
    }

    fn request(action: Action, message: serde_json::Value) -> BecknRequest {
        let context = Context::new("retail", "IND", "std:080", action).with_bap("bap", "http://bap.test/cb");
        BecknRequest::new(context, message)
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_internal_error_after_ack() {
        let mut store = MockStore::new();
        store
            .expect_catalog_items()
            .returning(|| Err(BecknError::Store("connection refused".to_string())));
        let (dispatcher, mut rx) = dispatcher(store);

        let ack = dispatcher.search(request(Action::Search, json!({}))).unwrap();
        assert_eq!(ack, AckResponse::ack());

        let (context, outcome) = rx.recv().await.unwrap();
        assert_eq!(context.action, "on_search");
        assert_eq!(outcome.unwrap_err().code, ErrorCode::InternalServerError);
    }

    #[tokio::test]
    async fn test_confirm_store_failure_is_internal_error() {
        let mut store = MockStore::new();
        store
            .expect_insert_order()
            .returning(|_| Err(BecknError::Store("disk full".to_string())));
        let (dispatcher, mut rx) = dispatcher(store);

        let ack = dispatcher
            .confirm(request(Action::Confirm, json!({"order": {"items": [{"id": "item1"}]}})))
            .unwrap();
        assert_eq!(ack, AckResponse::ack());

        let (_, outcome) = rx.recv().await.unwrap();
        assert_eq!(outcome.unwrap_err().code, ErrorCode::InternalServerError);
    }

    #[tokio::test]
    async fn test_init_with_bad_order_is_nacked_without_store_access() {
        // No expectations: any store call would panic the background task.
        let (dispatcher, mut rx) = dispatcher(MockStore::new());

        let ack = dispatcher.init(request(Action::Init, json!({"order": "not-an-object"}))).unwrap();
        assert_eq!(ack, AckResponse::nack());

        let (context, outcome) = rx.recv().await.unwrap();
        assert_eq!(context.action, "on_init");
        assert_eq!(outcome.unwrap_err().code, ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn test_support_never_touches_store() {
        let (dispatcher, mut rx) = dispatcher(MockStore::new());

        dispatcher.support(request(Action::Support, json!({}))).unwrap();
        let (_, outcome) = rx.recv().await.unwrap();
        assert_eq!(
            outcome.unwrap(),
            json!({"support": {"contact": "help@bpp.test", "phone": "+100"}})
        );
    }

    #[tokio::test]
    async fn test_mismatched_action_is_rejected_synchronously() {
        let (dispatcher, mut rx) = dispatcher(MockStore::new());

        let err = dispatcher.cancel(request(Action::Status, json!({}))).unwrap_err();
        assert!(matches!(err, BecknError::ActionMismatch { expected: Action::Cancel, .. }));

        dispatcher.workers().drain(std::time::Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_requests() {
        let (dispatcher, _rx) = dispatcher(MockStore::new());
        dispatcher.workers().close();

        let err = dispatcher.support(request(Action::Support, json!({}))).unwrap_err();
        assert!(matches!(err, BecknError::ShuttingDown));
    }
}
