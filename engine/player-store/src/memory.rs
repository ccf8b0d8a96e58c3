//! In-memory document store used by tests and dry runs.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::document::PlayerDoc;
use crate::error::{Result, StoreError};
use crate::store::DocumentStore;

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    docs: Mutex<BTreeMap<String, PlayerDoc>>,
    /// Upserts fail once the collection would exceed this many documents
    capacity: Mutex<Option<usize>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any batch that would grow the collection past `limit`
    /// documents, simulating a write failure mid-build
    pub fn fail_beyond(&self, limit: Option<usize>) {
        *self.capacity.lock() = limit;
    }

    pub fn ids(&self) -> Vec<String> {
        self.docs.lock().keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn count(&self) -> Result<u64> {
        Ok(self.docs.lock().len() as u64)
    }

    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.docs.lock().contains_key(id))
    }

    async fn find(&self, id: &str) -> Result<Option<PlayerDoc>> {
        Ok(self.docs.lock().get(id).cloned())
    }

    async fn upsert_batch(&self, batch: &[PlayerDoc]) -> Result<()> {
        let mut docs = self.docs.lock();
        if let Some(limit) = *self.capacity.lock() {
            let new = batch.iter().filter(|d| !docs.contains_key(&d.id)).count();
            if docs.len() + new > limit {
                return Err(StoreError::WriteRejected(format!("store is capped at {limit} documents")));
            }
        }
        for doc in batch {
            docs.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn drop_collection(&self) -> Result<()> {
        self.docs.lock().clear();
        Ok(())
    }
}
