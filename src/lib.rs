//! # Beckn provider engine and search gateway
//!
//! An "ask many, acknowledge now, deliver later" transaction protocol between
//! a buyer application (BAP) and independent providers (BPPs).
//!
//! ## Architecture
//!
//! - **Context**: correlation envelope; callbacks keep `transaction_id` and get a new `message_id`
//! - **Dispatcher**: provider endpoints that Ack synchronously and run the action on a worker pool
//! - **Callback**: best-effort, at-most-once delivery of results to `bap_uri`
//! - **Broadcaster**: scatter/gather of searches across providers with per-branch failure containment
//! - **Registry**: provider lookup by domain and city
//! - **Store**: catalog and order documents, in memory or in SQLite

pub mod actions;
pub mod broadcaster;
pub mod callback;
pub mod config;
pub mod context;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod model;
pub mod registry;
pub mod server;
pub mod store;
pub mod worker;

pub use broadcaster::{BranchFailure, BranchOutcome, Broadcaster};
pub use callback::{CallbackSink, HttpCallbackSink};
pub use config::AppConfig;
pub use context::{Action, Context};
pub use database::SqliteStore;
pub use dispatcher::ActionDispatcher;
pub use error::{BecknError, Result};
pub use gateway::Gateway;
pub use model::{AckResponse, AckStatus, BecknRequest, BecknResponse, ErrorCode, Order, Outcome, ProtocolError};
pub use registry::{HttpRegistry, ProviderDescriptor, Registry, StaticRegistry};
pub use store::{InMemoryStore, Store};
pub use worker::WorkerPool;
