//! Error types for the player store

use cluster_analytics::AnalyticsError;
use player_stats::StatsError;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// The collection holds some but not all players and no drop/resume
    /// intent was given
    #[error("Collection holds {present} of {expected} players; rerun with --drop or --resume")]
    PartialCollection { present: u64, expected: u64 },

    /// Inputs or store contents that break the one-document-per-player rule
    #[error("Inconsistent data: {0}")]
    Inconsistent(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Injected write failure of the in-memory store
    #[error("Write rejected: {0}")]
    WriteRejected(String),
}

impl StoreError {
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::Inconsistent(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
