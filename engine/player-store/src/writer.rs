//! # Database writer
//!
//! Loads every player document into a [`DocumentStore`] in batches. A
//! collection that already holds exactly the expected players, last one
//! included, is left alone whatever the mode. A partially filled collection
//! needs operator intent: drop and rewrite it, or resume from the first
//! player not yet stored.

use player_stats::StageOutcome;
use tracing::{info, warn};

use crate::document::{doc_id, PlayerDoc};
use crate::error::{Result, StoreError};
use crate::store::DocumentStore;

/// What to do with a collection that is not already complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Write into an empty collection; refuse a partial one
    #[default]
    Fresh,
    /// Clear the collection and write everything
    Drop,
    /// Keep the stored prefix and continue after it
    Resume,
}

pub struct StoreWriter<'s, S: DocumentStore + ?Sized> {
    store: &'s S,
    batch_size: usize,
}

impl<'s, S: DocumentStore + ?Sized> StoreWriter<'s, S> {
    pub fn new(store: &'s S, batch_size: usize) -> Self {
        Self { store, batch_size: batch_size.max(1) }
    }

    /// Bring the collection to exactly `docs`, in order
    pub async fn write_all(&self, docs: &[PlayerDoc], mode: WriteMode) -> Result<StageOutcome> {
        let expected = docs.len() as u64;
        let present = self.store.count().await?;

        if present == expected && self.is_complete(docs).await? {
            info!("Collection already holds all {} players", expected);
            return Ok(StageOutcome::NothingToDo);
        }

        let start = match mode {
            _ if present == 0 => 0,
            WriteMode::Fresh => return Err(StoreError::PartialCollection { present, expected }),
            WriteMode::Drop => {
                warn!("Dropping {} existing documents", present);
                self.store.drop_collection().await?;
                0
            }
            WriteMode::Resume => {
                if present > expected {
                    return Err(StoreError::inconsistent(format!(
                        "collection holds {present} documents but only {expected} players exist"
                    )));
                }
                let start = self.first_missing(docs).await?;
                info!("Resuming after {} stored players", start);
                start
            }
        };

        self.write_from(docs, start).await?;

        let stored = self.store.count().await?;
        if stored != expected {
            return Err(StoreError::inconsistent(format!(
                "collection holds {stored} documents after the build, expected {expected}"
            )));
        }
        info!("Stored {} players", stored);
        Ok(StageOutcome::Completed)
    }

    async fn is_complete(&self, docs: &[PlayerDoc]) -> Result<bool> {
        match docs.last() {
            Some(last) => self.store.contains(&last.id).await,
            None => Ok(true),
        }
    }

    /// Index of the first document not in the store, assuming the stored
    /// documents form a prefix of `docs`
    async fn first_missing(&self, docs: &[PlayerDoc]) -> Result<usize> {
        let (mut lo, mut hi) = (0, docs.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.store.contains(&docs[mid].id).await? {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    async fn write_from(&self, docs: &[PlayerDoc], start: usize) -> Result<()> {
        let total = docs.len();
        let mut done = start;
        for batch in docs[start..].chunks(self.batch_size) {
            self.store.upsert_batch(batch).await.map_err(|e| {
                warn!("Batch starting at player {} failed after {}/{} stored", done + 1, done, total);
                e
            })?;
            done += batch.len();
            info!("Stored {}/{} players ({:.1}%)", done, total, 100.0 * done as f64 / total.max(1) as f64);
        }
        Ok(())
    }
}

/// Case-insensitive point lookup
pub async fn lookup<S: DocumentStore + ?Sized>(store: &S, username: &str) -> Result<Option<PlayerDoc>> {
    store.find(&doc_id(username.trim())).await
}
