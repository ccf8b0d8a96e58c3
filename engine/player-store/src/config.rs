//! Store connection settings

use crate::error::{Result, StoreError};

/// Default document batch per upsert
pub const DEFAULT_BATCH_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub db_url: String,
    /// Table holding one JSONB document per player
    pub collection: String,
    pub batch_size: usize,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_url: "postgres://localhost/hiscores".to_string(),
            collection: "players".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_connections: 5,
        }
    }
}

impl StoreConfig {
    /// Defaults with `DATABASE_URL` applied when set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.db_url = url;
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(StoreError::config("batch size must be > 0"));
        }
        if self.max_connections == 0 {
            return Err(StoreError::config("max connections must be > 0"));
        }
        // The collection name is spliced into SQL as an identifier
        let mut chars = self.collection.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            && self.collection.len() <= 63;
        if !valid {
            return Err(StoreError::config(format!("invalid collection name {:?}", self.collection)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert_eq!(config.batch_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_collection_name_must_be_identifier() {
        for bad in ["", "1players", "players; DROP TABLE x", "hi-scores"] {
            let config = StoreConfig { collection: bad.to_string(), ..Default::default() };
            assert!(config.validate().is_err(), "{bad:?} accepted");
        }
        let config = StoreConfig { collection: "hiscores_2024".to_string(), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = StoreConfig { batch_size: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
