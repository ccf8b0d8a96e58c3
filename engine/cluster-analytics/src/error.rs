//! Error types for the analytics stages

use player_stats::StatsError;
use thiserror::Error;

/// Result type alias for analytics operations
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Errors that can occur while computing or loading analytics artifacts
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// Stats table or pipeline config problems
    #[error(transparent)]
    Stats(#[from] StatsError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bincode serialization errors
    #[error("Bincode serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Malformed CSV artifact
    #[error("line {line}: {message}")]
    Format { line: usize, message: String },

    /// Inputs whose shapes do not line up
    #[error("Shape mismatch: {0}")]
    Shape(String),

    /// Inputs a numerical kernel cannot work with
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Binary artifact with a bad header or body
    #[error("Data corruption: {0}")]
    Corruption(String),
}

impl AnalyticsError {
    pub fn format(line: usize, message: impl Into<String>) -> Self {
        Self::Format { line, message: message.into() }
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }
}
