//! # Player Stats
//!
//! Shared data model for the hiscores pipeline: the canonical skill set,
//! scraped player records, the cleaned stats table and the feature splits
//! the clustering stages run on.
//!
//! ## Architecture
//!
//! - **skills**: canonical skill ordering; every stat column position derives from it
//! - **record**: `PlayerRecord` plus the raw-scrape and cleaned CSV line codecs
//! - **table**: `StatsTable` loading, cleaning and `split_dataset`
//! - **matrix**: dense row-major `Matrix` used by the numerical stages
//! - **config**: `Split` definitions and the JSON `PipelineConfig`
//! - **stage**: freshness checks, atomic writes and exit codes shared by the binaries

pub mod config;
pub mod error;
pub mod logging;
pub mod matrix;
pub mod record;
pub mod skills;
pub mod stage;
pub mod table;

pub use config::{PipelineConfig, Split, UmapParams};
pub use error::{Result, StatsError};
pub use matrix::Matrix;
pub use record::{PlayerRecord, ScrapeRow};
pub use skills::{MISSING, NUM_SKILLS, NUM_STATS, SKILLS};
pub use stage::StageOutcome;
pub use table::StatsTable;
