use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::context::Context;
use crate::{BecknError, Result};

/// Result of the background phase of an action: a message payload or an error.
pub type Outcome = std::result::Result<Value, ProtocolError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AckStatus {
    Ack,
    Nack,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ack {
    pub status: AckStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AckMessage {
    pub ack: Ack,
}

/// Synchronous answer to every provider action: `{"message": {"ack": {"status": ..}}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AckResponse {
    pub message: AckMessage,
}

impl AckResponse {
    pub fn ack() -> Self {
        Self::with_status(AckStatus::Ack)
    }

    pub fn nack() -> Self {
        Self::with_status(AckStatus::Nack)
    }

    fn with_status(status: AckStatus) -> Self {
        Self {
            message: AckMessage { ack: Ack { status } },
        }
    }

    pub fn status(&self) -> AckStatus {
        self.message.ack.status
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InternalServerError,
    InvalidItem,
    InvalidOrder,
    InvalidRequest,
    BppNotFound,
    DiscoveryFailed,
    TrackingFailed,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::InvalidItem => "INVALID_ITEM",
            ErrorCode::InvalidOrder => "INVALID_ORDER",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::BppNotFound => "BPP_NOT_FOUND",
            ErrorCode::DiscoveryFailed => "DISCOVERY_FAILED",
            ErrorCode::TrackingFailed => "TRACKING_FAILED",
        };
        f.write_str(code)
    }
}

/// Business error carried on the wire in place of a message payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_order(order_id: Option<&str>) -> Self {
        Self::new(
            ErrorCode::InvalidOrder,
            format!("Order {} not found", order_id.unwrap_or("<missing>")),
        )
    }

    pub fn invalid_item(item_id: Option<&str>) -> Self {
        Self::new(
            ErrorCode::InvalidItem,
            format!("Item {} not found", item_id.unwrap_or("<missing>")),
        )
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BecknRequest {
    pub context: Context,
    #[serde(default = "empty_object")]
    pub message: Value,
}

impl BecknRequest {
    pub fn new(context: Context, message: Value) -> Self {
        Self { context, message }
    }

    /// `message.order`, if the request carries one.
    pub fn order(&self) -> Option<&Value> {
        self.message.get("order")
    }

    /// `message.order.id` as sent by the caller.
    pub fn order_id(&self) -> Option<&str> {
        self.order().and_then(|order| order.get("id")).and_then(Value::as_str)
    }
}

/// Envelope of a callback: a payload, or an empty message plus an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BecknResponse {
    pub context: Context,
    #[serde(default = "empty_object")]
    pub message: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProtocolError>,
}

impl BecknResponse {
    pub fn from_outcome(context: Context, outcome: Outcome) -> Self {
        match outcome {
            Ok(message) => Self {
                context,
                message,
                error: None,
            },
            Err(error) => Self {
                context,
                message: empty_object(),
                error: Some(error),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Descriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Price {
    pub currency: String,
    pub value: String,
}

impl Price {
    pub fn validate(&self) -> Result<()> {
        self.value
            .parse::<f64>()
            .map(|_| ())
            .map_err(|_| BecknError::Validation(format!("Price value must be a number, got {}", self.value)))
    }
}

/// An entry of the provider's catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub descriptor: Descriptor,
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map<String, Value>>,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>, value: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            descriptor: Descriptor {
                name: name.into(),
                code: None,
                symbol: None,
                short_desc: None,
                long_desc: None,
                images: None,
            },
            price: Price {
                currency: currency.into(),
                value: value.into(),
            },
            category_id: None,
            tags: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Provider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl Payment {
    pub fn pending() -> Self {
        Self {
            status: "Pending".to_string(),
            amount: None,
            method: None,
        }
    }
}

/// A line of an order as supplied by the caller; only `id` is interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderState {
    Confirmed,
    Cancelled,
    InTransit,
    Delivered,
    Other(String),
}

impl Default for OrderState {
    fn default() -> Self {
        OrderState::InTransit
    }
}

impl From<String> for OrderState {
    fn from(state: String) -> Self {
        match state.as_str() {
            "Confirmed" => OrderState::Confirmed,
            "Cancelled" => OrderState::Cancelled,
            "In Transit" => OrderState::InTransit,
            "Delivered" => OrderState::Delivered,
            _ => OrderState::Other(state),
        }
    }
}

impl From<OrderState> for String {
    fn from(state: OrderState) -> Self {
        match state {
            OrderState::Confirmed => "Confirmed".to_string(),
            OrderState::Cancelled => "Cancelled".to_string(),
            OrderState::InTransit => "In Transit".to_string(),
            OrderState::Delivered => "Delivered".to_string(),
            OrderState::Other(state) => state,
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(self.clone()))
    }
}

/// A confirmed order as held by the store.
///
/// Fields merged in by `update` that the model does not name are kept in
/// `extra` so they survive a read/write cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub state: OrderState,
    #[serde(default)]
    pub provider: Provider,
    pub payment: Payment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Order {
    /// A freshly confirmed order with a generated id.
    pub fn confirmed(items: Vec<OrderItem>, provider_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            items,
            state: OrderState::Confirmed,
            provider: Provider { id: provider_id },
            payment: Payment::pending(),
            billing: None,
            fulfillment: None,
            rating: None,
            extra: Map::new(),
        }
    }

    /// Applies a shallow top-level merge of `patch`, replacing whole fields.
    pub fn merge(&self, patch: &Map<String, Value>) -> Result<Order> {
        let mut document = match serde_json::to_value(self)? {
            Value::Object(document) => document,
            _ => return Err(BecknError::Serialization("Order did not serialize to an object".to_string())),
        };
        for (key, value) in patch {
            document.insert(key.clone(), value.clone());
        }
        // The merge target is addressed by id; a patch cannot move it.
        document.insert("id".to_string(), Value::String(self.id.clone()));

        serde_json::from_value(Value::Object(document))
            .map_err(|e| BecknError::Validation(format!("Order update rejected: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tracking {
    pub order_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupportInfo {
    pub contact: String,
    pub phone: String,
}
