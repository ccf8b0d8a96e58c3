//! # Player Store
//!
//! The per-player document collection the front end queries: cleaned stats
//! plus one cluster id per split, keyed by lowercased username.
//!
//! ## Architecture
//!
//! - **document**: `PlayerDoc` and its construction from the stats table and clusters file
//! - **store**: the `DocumentStore` trait
//! - **postgres** / **memory**: JSONB-on-PostgreSQL and in-memory backends
//! - **writer**: idempotent batched build and case-insensitive lookup

pub mod config;
pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod writer;

pub use config::StoreConfig;
pub use document::{build_documents, PlayerDoc};
pub use error::{Result, StoreError};
pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use store::DocumentStore;
pub use writer::{lookup, StoreWriter, WriteMode};
