mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use beckn::{
    server::{bpp_router, gateway_router},
    Action, ActionDispatcher, BecknResponse, Broadcaster, Context, Gateway, HttpCallbackSink, ProviderDescriptor,
    StaticRegistry, WorkerPool,
};
use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

fn post_json(path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn test_bpp() -> (Router, mpsc::UnboundedReceiver<(Context, beckn::Outcome)>) {
    let (dispatcher, rx) = dispatcher_with(Arc::new(catalog_store().await));
    (bpp_router(Arc::new(dispatcher)), rx)
}

#[tokio::test]
async fn test_health_check() {
    let (app, _rx) = test_bpp().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "healthy"}));
}

#[tokio::test]
async fn test_action_route_acks() {
    let (app, mut rx) = test_bpp().await;
    let body = serde_json::to_value(request(Action::Search, json!({}))).unwrap();

    let response = app.oneshot(post_json("/search", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"message": {"ack": {"status": "ACK"}}}));

    let (callback, _) = next_callback(&mut rx).await;
    assert_eq!(callback.action, "on_search");
}

#[tokio::test]
async fn test_python_isoformat_timestamp_is_accepted() {
    let (app, mut rx) = test_bpp().await;
    let mut body = serde_json::to_value(request(Action::Search, json!({}))).unwrap();
    body["context"]["timestamp"] = json!("2024-05-01T10:30:00.123456+00:00Z");

    let response = app.oneshot(post_json("/search", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["message"]["ack"]["status"], "ACK");

    let (callback, _) = next_callback(&mut rx).await;
    assert_eq!(callback.action, "on_search");
}

#[tokio::test]
async fn test_action_mismatch_is_bad_request() {
    let (app, mut rx) = test_bpp().await;
    let body = serde_json::to_value(request(Action::Search, json!({}))).unwrap();

    let response = app.oneshot(post_json("/confirm", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_REQUEST");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "a rejected request gets no callback");
}

#[tokio::test]
async fn test_init_with_scalar_order_is_nacked() {
    let (app, mut rx) = test_bpp().await;
    let body = serde_json::to_value(request(Action::Init, json!({"order": "not-an-object"}))).unwrap();

    let response = app.oneshot(post_json("/init", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["message"]["ack"]["status"], "NACK");

    let (_, outcome) = next_callback(&mut rx).await;
    assert_eq!(outcome.unwrap_err().code, beckn::ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn test_confirm_round_trip_over_http() {
    let (callback_url, mut callbacks) = spawn_callback_receiver().await;

    let store = Arc::new(catalog_store().await);
    let sink = Arc::new(HttpCallbackSink::new(Duration::from_secs(2)).unwrap());
    let dispatcher = ActionDispatcher::new(store, sink, Arc::new(WorkerPool::new()), support_info());
    let bpp = spawn_app(bpp_router(Arc::new(dispatcher))).await;

    let context = Context::new("retail", "IND", "std:080", Action::Confirm)
        .with_bap("bap.test", callback_url)
        .with_bpp("bpp.test", bpp.clone());
    let body = json!({"context": context, "message": {"order": {"items": [{"id": "item1"}]}}});

    let ack: Value = reqwest::Client::new()
        .post(format!("{}/confirm", bpp))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ack["message"]["ack"]["status"], "ACK");

    let received: BecknResponse = tokio::time::timeout(WAIT, callbacks.recv()).await.unwrap().unwrap();
    assert_eq!(received.context.action, "on_confirm");
    assert_eq!(received.context.transaction_id, context.transaction_id);
    assert_ne!(received.context.message_id, context.message_id);
    assert_eq!(received.message["order"]["state"], "Confirmed");
    assert_eq!(received.message["order"]["items"][0]["id"], "item1");
}

async fn provider_with_track() -> String {
    let app = Router::new()
        .route("/search", post(|| async { Json(json!({"catalog": {"items": []}})) }))
        .route(
            "/track",
            post(|Json(request): Json<Value>| async move {
                Json(json!({"message": {"ack": {"status": "ACK"}}, "echo": request["context"]["bpp_id"]}))
            }),
        );
    spawn_app(app).await
}

async fn test_gateway() -> Router {
    let mut provider = ProviderDescriptor::new("bpp-1", provider_with_track().await);
    provider.name = Some("Corner Store".to_string());
    let registry = Arc::new(StaticRegistry::new(vec![provider]));
    let broadcaster = Arc::new(Broadcaster::new(registry, 32, Duration::from_secs(2)));
    let gateway = Gateway::new(broadcaster, Duration::from_secs(2)).unwrap();
    gateway_router(Arc::new(gateway))
}

#[tokio::test]
async fn test_gateway_search_aggregates_provider_responses() {
    let app = test_gateway().await;
    let body = serde_json::to_value(request(Action::Search, json!({"intent": {}}))).unwrap();

    let response = app.oneshot(post_json("/search", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([{"catalog": {"items": []}}]));
}

#[tokio::test]
async fn test_gateway_discover_lists_providers() {
    let app = test_gateway().await;
    let body = serde_json::to_value(request(Action::Search, json!({}))).unwrap();

    let response = app.oneshot(post_json("/discover", &body)).await.unwrap();
    let value = body_json(response).await;
    let providers = value["message"]["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0]["id"], "bpp-1");
    assert_eq!(providers[0]["name"], "Corner Store");
}

#[tokio::test]
async fn test_gateway_forwards_track_to_named_provider() {
    let app = test_gateway().await;
    let mut track = request(Action::Track, json!({"order": {"id": "o-1"}}));
    track.context.bpp_id = Some("bpp-1".to_string());

    let response = app
        .oneshot(post_json("/track", &serde_json::to_value(track).unwrap()))
        .await
        .unwrap();
    let value = body_json(response).await;
    assert_eq!(value["echo"], "bpp-1");
}

#[tokio::test]
async fn test_gateway_track_errors() {
    let app = test_gateway().await;

    let mut unknown = request(Action::Track, json!({}));
    unknown.context.bpp_id = Some("bpp-404".to_string());
    let response = app
        .clone()
        .oneshot(post_json("/track", &serde_json::to_value(unknown).unwrap()))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["error"]["code"], "BPP_NOT_FOUND");

    let mut anonymous = request(Action::Track, json!({}));
    anonymous.context.bpp_id = None;
    let response = app
        .oneshot(post_json("/track", &serde_json::to_value(anonymous).unwrap()))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_gateway_relays_on_search() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let bap = Router::new().route(
        "/on_search",
        post(move |Json(body): Json<Value>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(body);
                Json(json!({"message": {"ack": {"status": "ACK"}}}))
            }
        }),
    );
    let bap_uri = spawn_app(bap).await;

    let app = test_gateway().await;
    let context = Context::new("retail", "IND", "std:080", Action::Search)
        .with_bap("bap.test", bap_uri)
        .derive_callback();
    let body = json!({"context": context, "message": {"catalog": {"items": []}}});

    let response = app.oneshot(post_json("/on_search", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ACK"}));

    let relayed = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(relayed["context"]["transaction_id"], json!(context.transaction_id));
    assert_eq!(relayed["message"], json!({"catalog": {"items": []}}));
}

#[tokio::test]
async fn test_gateway_on_search_without_bap_uri_is_bad_request() {
    let app = test_gateway().await;
    let context = Context::new("retail", "IND", "std:080", Action::Search).derive_callback();
    let body = json!({"context": context, "message": {}});

    let response = app.oneshot(post_json("/on_search", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
