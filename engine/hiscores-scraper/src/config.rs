use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError};

/// Hard ceiling on concurrent workers (page + stats)
pub const MAX_WORKERS: usize = 30;

/// Hard ceiling on stats workers, whatever the page worker count
pub const MAX_STATS_WORKERS: usize = 28;

/// Configuration for a scrape run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Ranking page endpoint, queried with `table=0&page=N`
    pub page_url: String,

    /// Stats endpoint, queried with `player=<username>`
    pub stats_url: String,

    /// Timeout for a ranking page request
    pub page_timeout: Duration,

    /// Timeout for a stats request
    pub stats_timeout: Duration,

    /// Number of page workers
    pub page_workers: usize,

    /// Number of stats workers
    pub stats_workers: usize,

    /// Bound on the username queue; page workers block when it is full
    pub username_queue_size: usize,

    /// Stats worker `i` waits `i * worker_startup_delay` before its first fetch
    pub worker_startup_delay: Duration,

    /// How long the queues must stay drained before the run is declared done
    pub idle_grace: Duration,

    /// Emit a progress line every this many exported rows
    pub progress_every: u64,

    /// Busy (timeout) retry policy
    pub retry: RetryConfig,

    /// Restarts allowed after block events when IP resets are enabled
    pub max_restarts: u32,

    /// Pause after an IP reset before the next attempt
    pub restart_cooldown: Duration,

    /// Command run to obtain a fresh IP address
    pub vpn_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first busy response
    pub max_retries: u32,

    /// Fixed wait between busy retries
    pub backoff: Duration,
}

pub const DEFAULT_BASE_URL: &str = "https://secure.runescape.com/m=hiscore_oldschool";

impl Default for ScraperConfig {
    fn default() -> Self {
        let mut config = Self {
            page_url: String::new(),
            stats_url: String::new(),
            page_timeout: Duration::from_secs(15),
            stats_timeout: Duration::from_secs(30),
            page_workers: 2,
            stats_workers: 28,
            username_queue_size: 500,
            worker_startup_delay: Duration::from_millis(100),
            idle_grace: Duration::from_secs(1),
            progress_every: 1000,
            retry: RetryConfig { max_retries: 3, backoff: Duration::from_secs(30) },
            max_restarts: 50,
            restart_cooldown: Duration::from_secs(5),
            vpn_command: None,
        };
        config.set_base_url(DEFAULT_BASE_URL);
        config
    }
}

impl ScraperConfig {
    /// Load a JSON config file; missing fields keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Defaults overridden by environment variables where present
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `HISCORES_BASE_URL`, `VPN_RESET_COMMAND` and the
    /// `SCRAPE_*` retry overrides
    pub fn with_env_overrides(self) -> Self {
        let mut config = self;

        if let Ok(base) = std::env::var("HISCORES_BASE_URL") {
            config.set_base_url(&base);
        }
        if let Ok(command) = std::env::var("VPN_RESET_COMMAND") {
            if !command.trim().is_empty() {
                config.vpn_command = Some(command);
            }
        }
        if let Some(n) = env_parse("SCRAPE_MAX_RESTARTS") {
            config.max_restarts = n;
        }
        if let Some(n) = env_parse("SCRAPE_BUSY_RETRIES") {
            config.retry.max_retries = n;
        }
        if let Some(secs) = env_parse("SCRAPE_BUSY_BACKOFF_SECS") {
            config.retry.backoff = Duration::from_secs(secs);
        }

        config
    }

    /// Point both endpoints at `base`
    pub fn set_base_url(&mut self, base: &str) {
        let base = base.trim_end_matches('/');
        self.page_url = format!("{base}/overall");
        self.stats_url = format!("{base}/index_lite.ws");
    }

    pub fn with_stats_workers(mut self, n: usize) -> Self {
        self.stats_workers = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ScrapeError::InvalidConfig(msg));
        if self.page_workers == 0 || self.stats_workers == 0 {
            return invalid("at least one page worker and one stats worker are required".into());
        }
        if self.stats_workers > MAX_STATS_WORKERS {
            return invalid(format!(
                "{} stats workers exceeds the limit of {}",
                self.stats_workers, MAX_STATS_WORKERS
            ));
        }
        if self.page_workers + self.stats_workers > MAX_WORKERS {
            return invalid(format!(
                "{} page + {} stats workers exceeds the limit of {}",
                self.page_workers, self.stats_workers, MAX_WORKERS
            ));
        }
        if self.username_queue_size == 0 {
            return invalid("username queue size must be positive".into());
        }
        Ok(())
    }

    /// Largest stats worker count allowed alongside the configured page workers
    pub fn max_stats_workers(&self) -> usize {
        MAX_WORKERS.saturating_sub(self.page_workers).min(MAX_STATS_WORKERS)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
