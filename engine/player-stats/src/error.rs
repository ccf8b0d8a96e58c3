//! Error types for the stats data model

use thiserror::Error;

/// Result type alias for stats operations
pub type Result<T> = std::result::Result<T, StatsError>;

/// Errors raised while reading, cleaning or configuring player stats
#[derive(Error, Debug)]
pub enum StatsError {
    /// I/O errors (missing files, permissions, ...)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config documents that are not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A CSV line that does not follow the expected layout
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A CSV header that does not match the canonical layout
    #[error("unexpected header: {0}")]
    Header(String),

    /// Skill name not present in the canonical skill set
    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    /// Semantically invalid configuration
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl StatsError {
    /// Create a new parse error for a 1-based line number
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse { line, message: message.into() }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
