use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::{Item, Order};
use crate::Result;

/// Keyed document store behind the provider actions.
///
/// Two logical collections, catalog items and orders, plus the draft
/// payloads persisted by `init`. `update_order` is a shallow merge applied to
/// the latest stored document; there is no version check, so concurrent
/// writers to the same field race and the last one wins.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn catalog_items(&self) -> Result<Vec<Item>>;
    async fn insert_catalog_item(&self, item: Item) -> Result<()>;
    async fn insert_draft_order(&self, draft: Value) -> Result<()>;
    async fn insert_order(&self, order: Order) -> Result<()>;
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>>;
    /// Returns the updated order, or `None` if no order has this id.
    async fn update_order(&self, order_id: &str, patch: Map<String, Value>) -> Result<Option<Order>>;
}

#[derive(Default)]
struct Collections {
    catalog: Vec<Item>,
    orders: HashMap<String, Order>,
    drafts: Vec<Value>,
}

/// Process-local store for tests and single-node demos.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_catalog(items: Vec<Item>) -> Self {
        let store = Self::new();
        store.inner.write().await.catalog = items;
        store
    }

    pub async fn draft_orders(&self) -> Vec<Value> {
        self.inner.read().await.drafts.clone()
    }

    pub async fn order_count(&self) -> usize {
        self.inner.read().await.orders.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn catalog_items(&self) -> Result<Vec<Item>> {
        Ok(self.inner.read().await.catalog.clone())
    }

    async fn insert_catalog_item(&self, item: Item) -> Result<()> {
        item.price.validate()?;
        let mut inner = self.inner.write().await;
        inner.catalog.retain(|existing| existing.id != item.id);
        inner.catalog.push(item);
        Ok(())
    }

    async fn insert_draft_order(&self, draft: Value) -> Result<()> {
        self.inner.write().await.drafts.push(draft);
        Ok(())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        self.inner.write().await.orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(order_id).cloned())
    }

    async fn update_order(&self, order_id: &str, patch: Map<String, Value>) -> Result<Option<Order>> {
        let mut inner = self.inner.write().await;
        let Some(current) = inner.orders.get(order_id) else {
            return Ok(None);
        };
        let updated = current.merge(&patch)?;
        inner.orders.insert(order_id.to_string(), updated.clone());
        Ok(Some(updated))
    }
}
