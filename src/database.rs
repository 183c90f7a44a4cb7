use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::DatabaseConfig;
use crate::model::{Item, Order};
use crate::store::Store;
use crate::Result;

/// SQLite-backed document store. Documents are kept as JSON text keyed by id.
///
/// Writes from this process go through `write_lock`. A deferred transaction
/// that reads before it writes cannot upgrade its lock while another writer
/// has committed in between (`SQLITE_BUSY`), so merges must not overlap with
/// any other write.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(&DatabaseConfig {
            url: database_url.to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut options = SqlitePoolOptions::new();
        if let Some(max) = config.max_connections {
            options = options.max_connections(max);
        }
        if let Some(min) = config.min_connections {
            options = options.min_connections(min);
        }
        if let Some(seconds) = config.acquire_timeout_seconds {
            options = options.acquire_timeout(Duration::from_secs(seconds));
        }

        let pool = options
            .connect_with(
                SqliteConnectOptions::from_str(&config.url)?
                    .create_if_missing(true)
                    .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal),
            )
            .await?;

        let store = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        store.migrate().await?;
        tracing::info!("Connected to store at {}", config.url);
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_items (
                id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS draft_orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Store connection closed");
    }

    pub async fn draft_order_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM draft_orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn catalog_items(&self) -> Result<Vec<Item>> {
        let rows = sqlx::query("SELECT document FROM catalog_items ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let document: String = row.get(0);
            items.push(serde_json::from_str(&document)?);
        }
        Ok(items)
    }

    async fn insert_catalog_item(&self, item: Item) -> Result<()> {
        item.price.validate()?;
        let document = serde_json::to_string(&item)?;
        let _write = self.write_lock.lock().await;
        sqlx::query(
            r#"
            INSERT INTO catalog_items (id, document, created_at) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET document = excluded.document
            "#,
        )
        .bind(&item.id)
        .bind(document)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_draft_order(&self, draft: Value) -> Result<()> {
        let _write = self.write_lock.lock().await;
        sqlx::query("INSERT INTO draft_orders (document, created_at) VALUES (?, ?)")
            .bind(serde_json::to_string(&draft)?)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        let now = Utc::now();
        let _write = self.write_lock.lock().await;
        sqlx::query("INSERT INTO orders (id, document, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(&order.id)
            .bind(serde_json::to_string(&order)?)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: String = row.get(0);
                Ok(Some(serde_json::from_str(&document)?))
            }
            None => Ok(None),
        }
    }

    async fn update_order(&self, order_id: &str, patch: Map<String, Value>) -> Result<Option<Order>> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT document FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let document: String = row.get(0);
        let current: Order = serde_json::from_str(&document)?;
        let updated = current.merge(&patch)?;

        sqlx::query("UPDATE orders SET document = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&updated)?)
            .bind(Utc::now())
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(updated))
    }
}
