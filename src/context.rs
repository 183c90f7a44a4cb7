//! Correlation envelope shared by every request and callback.
//!
//! A callback is a new message: it keeps the `transaction_id` of the request
//! it answers but gets its own `message_id` and `timestamp`. Callers that
//! expect the callback to echo the request's `message_id` must correlate on
//! `transaction_id` instead.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::BecknError;

pub const DEFAULT_CORE_VERSION: &str = "0.9.3";
pub const CALLBACK_PREFIX: &str = "on_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Context {
    pub domain: String,
    pub country: String,
    pub city: String,
    pub action: String,
    #[serde(default = "default_core_version")]
    pub core_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bap_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bap_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpp_uri: Option<String>,
    #[serde(default = "new_id")]
    pub transaction_id: String,
    #[serde(default = "new_id")]
    pub message_id: String,
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

fn default_core_version() -> String {
    DEFAULT_CORE_VERSION.to_string()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Accepts RFC 3339 plus the forms Python clients emit: `isoformat() + "Z"`
/// (an offset followed by `Z`) and naive timestamps, which are read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    let trimmed = raw.strip_suffix('Z').unwrap_or(raw);
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
}

impl Context {
    /// Starts a fresh transaction for `action`.
    pub fn new(domain: impl Into<String>, country: impl Into<String>, city: impl Into<String>, action: Action) -> Self {
        Self {
            domain: domain.into(),
            country: country.into(),
            city: city.into(),
            action: action.to_string(),
            core_version: default_core_version(),
            bap_id: None,
            bap_uri: None,
            bpp_id: None,
            bpp_uri: None,
            transaction_id: new_id(),
            message_id: new_id(),
            timestamp: Utc::now(),
            ttl: None,
        }
    }

    pub fn with_bap(mut self, bap_id: impl Into<String>, bap_uri: impl Into<String>) -> Self {
        self.bap_id = Some(bap_id.into());
        self.bap_uri = Some(bap_uri.into());
        self
    }

    pub fn with_bpp(mut self, bpp_id: impl Into<String>, bpp_uri: impl Into<String>) -> Self {
        self.bpp_id = Some(bpp_id.into());
        self.bpp_uri = Some(bpp_uri.into());
        self
    }

    /// Builds the context for the callback answering this request.
    ///
    /// Routing fields and `transaction_id` are copied verbatim, the action is
    /// prefixed with `on_`, and `message_id`/`timestamp` are regenerated.
    pub fn derive_callback(&self) -> Context {
        Context {
            action: format!("{}{}", CALLBACK_PREFIX, self.action),
            message_id: new_id(),
            timestamp: Utc::now(),
            ..self.clone()
        }
    }
}

/// The ten transaction actions a provider serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Search,
    Select,
    Init,
    Confirm,
    Status,
    Track,
    Cancel,
    Update,
    Rating,
    Support,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::Search,
        Action::Select,
        Action::Init,
        Action::Confirm,
        Action::Status,
        Action::Track,
        Action::Cancel,
        Action::Update,
        Action::Rating,
        Action::Support,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Search => "search",
            Action::Select => "select",
            Action::Init => "init",
            Action::Confirm => "confirm",
            Action::Status => "status",
            Action::Track => "track",
            Action::Cancel => "cancel",
            Action::Update => "update",
            Action::Rating => "rating",
            Action::Support => "support",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = BecknError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| BecknError::InvalidInput(format!("Unknown action: {}", s)))
    }
}
