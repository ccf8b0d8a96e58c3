//! # Hiscores Scraper
//!
//! Concurrent, order-preserving, resumable scraper for the overall
//! hiscores leaderboard.
//!
//! ## Architecture
//!
//! - **client**: HTTP access to the ranking pages and the per-player stats endpoint
//! - **queue** / **counter**: the async priority queue and the ordering gate workers share
//! - **jobs**: page and username work units, range planning and resume trimming
//! - **workers**: page and stats worker loops plus the completion watchdog
//! - **exporter**: the single writer appending rank-ordered rows to the output CSV
//! - **driver**: attempt lifecycle, IP-reset restarts and abort handling
//! - **vpn**: the external IP reset command

pub mod client;
pub mod config;
pub mod counter;
pub mod driver;
pub mod error;
pub mod exporter;
pub mod jobs;
pub mod queue;
pub mod vpn;
pub mod workers;

pub use client::{HiscoresClient, PageEntry};
pub use config::ScraperConfig;
pub use driver::{ScrapeDriver, ScrapeRequest};
pub use error::{Result, ScrapeError};
pub use vpn::VpnHook;
