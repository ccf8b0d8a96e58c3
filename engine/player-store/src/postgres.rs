//! PostgreSQL backend: one table per collection, one JSONB document per
//! player keyed by its lowercased username.

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::info;

use crate::config::StoreConfig;
use crate::document::PlayerDoc;
use crate::error::Result;
use crate::store::DocumentStore;

pub struct PostgresDocumentStore {
    pool: PgPool,
    table: String,
}

impl PostgresDocumentStore {
    /// Connect and make sure the collection table exists
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let pool = PgPoolOptions::new().max_connections(config.max_connections).connect(&config.db_url).await?;
        let store = Self { pool, table: config.collection.clone() };
        store.create_table().await?;
        info!("Connected to document store, collection {}", store.table);
        Ok(store)
    }

    async fn create_table(&self) -> Result<()> {
        let sql = format!("CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, doc JSONB NOT NULL)", self.table);
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn contains(&self, id: &str) -> Result<bool> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", self.table);
        let exists: bool = sqlx::query_scalar(&sql).bind(id).fetch_one(&self.pool).await?;
        Ok(exists)
    }

    async fn find(&self, id: &str) -> Result<Option<PlayerDoc>> {
        let sql = format!("SELECT doc FROM {} WHERE id = $1", self.table);
        let doc: Option<Json<PlayerDoc>> = sqlx::query_scalar(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(doc.map(|Json(doc)| doc))
    }

    async fn upsert_batch(&self, docs: &[PlayerDoc]) -> Result<()> {
        let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
        let bodies = docs.iter().map(serde_json::to_value).collect::<std::result::Result<Vec<_>, _>>()?;

        let sql = format!(
            "INSERT INTO {} (id, doc) SELECT * FROM UNNEST($1::text[], $2::jsonb[]) \
             ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc",
            self.table
        );
        let mut tx = self.pool.begin().await?;
        sqlx::query(&sql).bind(ids).bind(bodies).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn drop_collection(&self) -> Result<()> {
        let sql = format!("TRUNCATE TABLE {}", self.table);
        sqlx::query(&sql).execute(&self.pool).await?;
        info!("Cleared collection {}", self.table);
        Ok(())
    }
}
