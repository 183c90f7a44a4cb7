//! HTTP surface for the provider engine and the gateway.

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::context::Action;
use crate::dispatcher::ActionDispatcher;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::model::{AckResponse, BecknRequest, BecknResponse};

/// One POST route per provider action, plus `/health`.
pub fn bpp_router(dispatcher: Arc<ActionDispatcher>) -> Router {
    let mut router: Router<Arc<ActionDispatcher>> = Router::new().route("/health", get(health_check));

    for action in Action::ALL {
        let path = format!("/{}", action.as_str());
        router = router.route(
            &path,
            post(
                move |State(dispatcher): State<Arc<ActionDispatcher>>, Json(request): Json<BecknRequest>| async move {
                    handle_action(dispatcher, action, request)
                },
            ),
        );
    }

    router.layer(TraceLayer::new_for_http()).with_state(dispatcher)
}

fn handle_action(dispatcher: Arc<ActionDispatcher>, action: Action, request: BecknRequest) -> Result<Json<AckResponse>> {
    let ack = dispatcher.dispatch(action, request)?;
    Ok(Json(ack))
}

pub fn gateway_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/search", post(gateway_search))
        .route("/on_search", post(gateway_on_search))
        .route("/discover", post(gateway_discover))
        .route("/track", post(gateway_track))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

async fn gateway_search(
    State(gateway): State<Arc<Gateway>>,
    Json(request): Json<BecknRequest>,
) -> Result<Json<Vec<Value>>> {
    let responses = gateway.search(&request).await?;
    Ok(Json(responses))
}

async fn gateway_on_search(
    State(gateway): State<Arc<Gateway>>,
    Json(response): Json<BecknResponse>,
) -> Result<Json<Value>> {
    gateway.relay_on_search(&response).await?;
    Ok(Json(serde_json::json!({"status": "ACK"})))
}

async fn gateway_discover(
    State(gateway): State<Arc<Gateway>>,
    Json(request): Json<BecknRequest>,
) -> Json<BecknResponse> {
    Json(gateway.discover(&request).await)
}

async fn gateway_track(State(gateway): State<Arc<Gateway>>, Json(request): Json<BecknRequest>) -> Json<Value> {
    Json(gateway.forward_track(&request).await)
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({"status": "healthy"}))
}
