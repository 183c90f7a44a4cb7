//! Business policy of each provider action, run in the background phase.
//!
//! Every function returns the callback outcome: a message payload, or the
//! protocol error the caller receives instead.

use serde_json::{json, Map, Value};

use crate::context::{Action, Context};
use crate::error::BecknError;
use crate::model::{
    empty_object, BecknRequest, Catalog, Order, OrderItem, Outcome, ProtocolError, SupportInfo, Tracking,
};
use crate::store::Store;

pub async fn execute(store: &dyn Store, support: &SupportInfo, action: Action, request: &BecknRequest) -> Outcome {
    match action {
        Action::Search => search(store).await,
        Action::Select => select(store, request).await,
        Action::Init => init(store, request).await,
        Action::Confirm => confirm(store, &request.context, request).await,
        Action::Status => status(store, request).await,
        Action::Track => track(store, request).await,
        Action::Cancel => cancel(store, request).await,
        Action::Update => update(store, request).await,
        Action::Rating => rating(store, request).await,
        Action::Support => Ok(json!({ "support": support })),
    }
}

fn store_failure(action: &str, err: BecknError) -> ProtocolError {
    tracing::error!(action, "Store operation failed: {}", err);
    err.to_protocol_error()
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(|e| BecknError::from(e).to_protocol_error())
}

async fn search(store: &dyn Store) -> Outcome {
    let items = store.catalog_items().await.map_err(|e| store_failure("search", e))?;
    let catalog = Catalog { items };
    Ok(json!({ "catalog": to_value(&catalog)? }))
}

async fn select(store: &dyn Store, request: &BecknRequest) -> Outcome {
    let selected: Vec<Value> = request
        .order()
        .and_then(|order| order.get("items"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let catalog = store.catalog_items().await.map_err(|e| store_failure("select", e))?;

    // All or nothing: the first unknown id rejects the whole selection.
    for item in &selected {
        let item_id = item.get("id").and_then(Value::as_str);
        let known = item_id.is_some_and(|id| catalog.iter().any(|entry| entry.id == id));
        if !known {
            return Err(ProtocolError::invalid_item(item_id));
        }
    }

    Ok(json!({ "order": { "items": selected } }))
}

async fn init(store: &dyn Store, request: &BecknRequest) -> Outcome {
    let draft = request.order().cloned().unwrap_or_else(empty_object);
    store
        .insert_draft_order(draft.clone())
        .await
        .map_err(|e| store_failure("init", e))?;
    Ok(json!({ "order": draft }))
}

async fn confirm(store: &dyn Store, context: &Context, request: &BecknRequest) -> Outcome {
    let items = match request.order().and_then(|order| order.get("items")) {
        Some(items) => serde_json::from_value::<Vec<OrderItem>>(items.clone())
            .map_err(|e| BecknError::Validation(format!("Invalid order items: {}", e)).to_protocol_error())?,
        None => Vec::new(),
    };

    let order = Order::confirmed(items, context.bpp_id.clone());
    store
        .insert_order(order.clone())
        .await
        .map_err(|e| store_failure("confirm", e))?;
    tracing::info!(order_id = %order.id, "Order confirmed");

    Ok(json!({ "order": to_value(&order)? }))
}

async fn find_order(store: &dyn Store, action: &str, request: &BecknRequest) -> Result<Order, ProtocolError> {
    let order_id = request.order_id();
    let Some(id) = order_id else {
        return Err(ProtocolError::invalid_order(None));
    };

    store
        .get_order(id)
        .await
        .map_err(|e| store_failure(action, e))?
        .ok_or_else(|| ProtocolError::invalid_order(order_id))
}

async fn status(store: &dyn Store, request: &BecknRequest) -> Outcome {
    let order = find_order(store, "status", request).await?;
    Ok(json!({ "order": to_value(&order)? }))
}

async fn track(store: &dyn Store, request: &BecknRequest) -> Outcome {
    let order = find_order(store, "track", request).await?;
    let tracking = Tracking {
        order_id: order.id.clone(),
        status: order.state.to_string(),
    };
    Ok(json!({ "tracking": to_value(&tracking)? }))
}

async fn patch_order(store: &dyn Store, action: &str, order_id: Option<&str>, patch: Map<String, Value>) -> Outcome {
    let Some(id) = order_id else {
        return Err(ProtocolError::invalid_order(None));
    };

    let updated = store
        .update_order(id, patch)
        .await
        .map_err(|e| store_failure(action, e))?
        .ok_or_else(|| ProtocolError::invalid_order(order_id))?;

    Ok(json!({ "order": to_value(&updated)? }))
}

async fn cancel(store: &dyn Store, request: &BecknRequest) -> Outcome {
    let mut patch = Map::new();
    patch.insert("state".to_string(), Value::String("Cancelled".to_string()));
    patch_order(store, "cancel", request.order_id(), patch).await
}

async fn update(store: &dyn Store, request: &BecknRequest) -> Outcome {
    let patch = request
        .order()
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    patch_order(store, "update", request.order_id(), patch).await
}

async fn rating(store: &dyn Store, request: &BecknRequest) -> Outcome {
    let rating = request.message.get("rating").cloned().unwrap_or_else(empty_object);

    if let Some(order_id) = rating.get("order_id").and_then(Value::as_str) {
        let mut patch = Map::new();
        patch.insert("rating".to_string(), rating.clone());
        let attached = store
            .update_order(order_id, patch)
            .await
            .map_err(|e| store_failure("rating", e))?;
        if attached.is_none() {
            tracing::debug!(order_id, "Rating for unknown order not persisted");
        }
    }

    Ok(json!({ "rating": rating }))
}
