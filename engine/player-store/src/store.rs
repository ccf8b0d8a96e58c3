//! Document store abstraction
//!
//! The writer and lookup only talk to [`DocumentStore`]; the PostgreSQL
//! backend and the in-memory backend both implement it.

use crate::document::PlayerDoc;
use crate::error::Result;

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Number of documents in the collection
    async fn count(&self) -> Result<u64>;

    /// Whether a document with primary key `id` exists
    async fn contains(&self, id: &str) -> Result<bool>;

    /// The document with primary key `id`
    async fn find(&self, id: &str) -> Result<Option<PlayerDoc>>;

    /// Insert or replace every document of `docs` atomically
    async fn upsert_batch(&self, docs: &[PlayerDoc]) -> Result<()>;

    /// Remove every document, leaving an empty collection
    async fn drop_collection(&self) -> Result<()>;
}
