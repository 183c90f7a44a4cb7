#![allow(dead_code)]

use async_trait::async_trait;
use axum::{response::Json, routing::post, Router};
use beckn::{
    model::{Item, SupportInfo},
    ActionDispatcher, BecknRequest, BecknResponse, CallbackSink, Context, InMemoryStore, Outcome, Store,
    WorkerPool,
};
use beckn::Action;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(5);

/// Serves `app` on an ephemeral local port and returns its base URL.
pub async fn spawn_app(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A BAP stand-in: returns the callback URL and a stream of received envelopes.
pub async fn spawn_callback_receiver() -> (String, mpsc::UnboundedReceiver<BecknResponse>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/callback",
        post(move |Json(body): Json<BecknResponse>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(body);
                Json(json!({"message": {"ack": {"status": "ACK"}}}))
            }
        }),
    );
    let base = spawn_app(app).await;
    (format!("{}/callback", base), rx)
}

/// Records every callback instead of sending it anywhere.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<(Context, Outcome)>,
}

#[async_trait]
impl CallbackSink for RecordingSink {
    async fn deliver(&self, context: Context, outcome: Outcome) {
        let _ = self.tx.send((context, outcome));
    }
}

pub fn recording_sink() -> (Arc<RecordingSink>, mpsc::UnboundedReceiver<(Context, Outcome)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingSink { tx }), rx)
}

pub fn sample_catalog() -> Vec<Item> {
    vec![
        Item::new("item1", "Product 1", "100", "INR"),
        Item::new("item2", "Product 2", "200", "INR"),
    ]
}

pub fn support_info() -> SupportInfo {
    SupportInfo {
        contact: "support@bpp.com".to_string(),
        phone: "+1234567890".to_string(),
    }
}

pub fn dispatcher_with(store: Arc<dyn Store>) -> (ActionDispatcher, mpsc::UnboundedReceiver<(Context, Outcome)>) {
    let (sink, rx) = recording_sink();
    let dispatcher = ActionDispatcher::new(store, sink, Arc::new(WorkerPool::new()), support_info());
    (dispatcher, rx)
}

pub async fn catalog_store() -> InMemoryStore {
    InMemoryStore::with_catalog(sample_catalog()).await
}

pub fn request(action: Action, message: Value) -> BecknRequest {
    let context = Context::new("retail", "IND", "std:080", action)
        .with_bap("bap.test", "http://bap.test/callback")
        .with_bpp("bpp.test", "http://bpp.test");
    BecknRequest::new(context, message)
}

pub async fn next_callback(rx: &mut mpsc::UnboundedReceiver<(Context, Outcome)>) -> (Context, Outcome) {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for callback")
        .expect("callback channel closed")
}
