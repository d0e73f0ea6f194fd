//! PostgreSQL adapter: one JSONB document table per entity kind
//!
//! Upserts merge the incoming fields into the stored document
//! (`doc || EXCLUDED.doc`), so re-applying a row is a no-op. `xmax = 0`
//! on the returned row tells a fresh insert apart from an update.

use super::{Document, EntityKind, Lookup, Storage, StoreError, StoreResult, Upserted};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Connection settings for [`PgStorage`]
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
    operation_timeout: Duration,
}

impl PgStorage {
    /// Open the pool, failing fast when the server is unreachable
    pub async fn connect(config: &PgConfig) -> StoreResult<Self> {
        let connecting = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url);

        let pool = match tokio::time::timeout(config.connect_timeout, connecting).await {
            Ok(pool) => pool?,
            Err(_) => {
                return Err(StoreError::Timeout {
                    operation: "connect",
                    secs: config.connect_timeout.as_secs(),
                })
            },
        };

        info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self::from_pool(pool, config.operation_timeout))
    }

    pub fn from_pool(pool: PgPool, operation_timeout: Duration) -> Self {
        Self {
            pool,
            operation_timeout,
        }
    }

    /// Create the document tables if they do not exist yet
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout {
                operation,
                secs: self.operation_timeout.as_secs(),
            }),
        }
    }
}

fn into_document(kind: EntityKind, value: Value) -> StoreResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject(kind.table())),
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn upsert(&self, kind: EntityKind, key: &str, fields: Document) -> StoreResult<Upserted> {
        let table = kind.table();
        let sql = format!(
            r#"
            INSERT INTO {table} (id, doc, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO UPDATE
            SET doc = {table}.doc || EXCLUDED.doc,
                updated_at = NOW()
            RETURNING doc, (xmax = 0) AS inserted
            "#
        );

        let (Json(doc), created) = self
            .bounded(
                "upsert",
                sqlx::query_as::<_, (Json<Value>, bool)>(&sql)
                    .bind(key)
                    .bind(Json(Value::Object(fields)))
                    .fetch_one(&self.pool),
            )
            .await?;

        Ok(Upserted {
            record: into_document(kind, doc)?,
            created,
        })
    }

    async fn find_by_key(&self, kind: EntityKind, key: &str) -> StoreResult<Lookup> {
        let sql = format!("SELECT doc FROM {} WHERE id = $1", kind.table());

        let row = self
            .bounded(
                "find_by_key",
                sqlx::query_as::<_, (Json<Value>,)>(&sql)
                    .bind(key)
                    .fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some((Json(doc),)) => Ok(Lookup::Found(into_document(kind, doc)?)),
            None => Ok(Lookup::NotFound),
        }
    }
}
