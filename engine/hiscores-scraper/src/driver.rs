//! # Scrape driver
//!
//! Runs scrape attempts over a rank range. Each attempt resumes from the
//! output file, starts the page workers, stats workers, exporter and
//! watchdog, and ends on the first task to finish: the watchdog on
//! success, a worker on error. A block event with IP resets enabled
//! resets the IP and starts a fresh attempt; anything else is fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use player_stats::StageOutcome;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::client::HiscoresClient;
use crate::config::ScraperConfig;
use crate::counter::JobCounter;
use crate::error::{Result, ScrapeError};
use crate::exporter::{last_exported_rank, ExportSummary, Exporter};
use crate::jobs::{plan_page_jobs, resume_page_jobs, PageJob};
use crate::queue::JobQueue;
use crate::vpn::VpnHook;
use crate::workers::{page_worker, stats_worker, watchdog, WorkerContext};

/// A requested rank range and where its rows go
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub start_rank: u64,
    pub stop_rank: u64,
    pub out_file: PathBuf,
}

pub struct ScrapeDriver {
    config: ScraperConfig,
    client: Arc<HiscoresClient>,
    vpn: Option<VpnHook>,
}

impl ScrapeDriver {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(HiscoresClient::new(&config)?);
        Ok(Self { config, client, vpn: None })
    }

    /// Enable restarts after block events, resetting the IP with `hook`
    pub fn with_vpn(mut self, hook: VpnHook) -> Self {
        self.vpn = Some(hook);
        self
    }

    /// Scrape `request` to completion. Returns `NothingToDo` when the output
    /// already covers the range.
    pub async fn run(&self, request: &ScrapeRequest) -> Result<StageOutcome> {
        let planned = plan_page_jobs(request.start_rank, request.stop_rank)?;
        let mut restarts = 0u32;
        let mut total = ExportSummary::default();

        loop {
            let resume_from = last_exported_rank(&request.out_file)?;
            let jobs = resume_page_jobs(planned.clone(), resume_from);
            if jobs.is_empty() {
                if restarts == 0 && total.written == 0 {
                    info!(
                        "{} already covers ranks up to {}",
                        request.out_file.display(),
                        resume_from.unwrap_or(0)
                    );
                    return Ok(StageOutcome::NothingToDo);
                }
                return Ok(StageOutcome::Completed);
            }
            if let Some(rank) = resume_from {
                info!("Resuming after rank {} from {}", rank, request.out_file.display());
            }

            let (result, summary) = self.run_attempt(jobs, &request.out_file, request.stop_rank).await;
            total.written += summary.written;
            total.not_found += summary.not_found;

            match result {
                Ok(()) => {
                    info!(
                        "Scrape of ranks {}..={} complete: {} rows this run, {} not found, {} restarts",
                        request.start_rank, request.stop_rank, total.written, total.not_found, restarts
                    );
                    return Ok(StageOutcome::Completed);
                }
                Err(e) if e.is_block_event() => {
                    let Some(vpn) = &self.vpn else {
                        error!("Block event without IP reset enabled: {}", e);
                        return Err(e);
                    };
                    if restarts >= self.config.max_restarts {
                        error!("Giving up after {} restarts: {}", restarts, e);
                        return Err(e);
                    }
                    restarts += 1;
                    warn!("Block event ({}); resetting IP, restart {}/{}", e, restarts, self.config.max_restarts);
                    vpn.reset().await?;
                    sleep(self.config.restart_cooldown).await;
                }
                Err(e) => {
                    error!("Scrape aborted: {}", e);
                    return Err(e);
                }
            }
        }
    }

    async fn run_attempt(&self, jobs: Vec<PageJob>, out_file: &Path, stop_rank: u64) -> (Result<()>, ExportSummary) {
        let exporter = match Exporter::open(out_file, self.config.progress_every).await {
            Ok(exporter) => exporter,
            Err(e) => return (Err(e), ExportSummary::default()),
        };

        let first = &jobs[0];
        let page_counter = Arc::new(JobCounter::new(first.pagenum as u64));
        let rank_counter = Arc::new(JobCounter::new(first.first_rank()));
        let page_queue = Arc::new(JobQueue::unbounded());
        for job in jobs {
            page_queue.put_force(job);
        }

        let (export_tx, export_rx) = mpsc::unbounded_channel();
        let export_handle = tokio::spawn(exporter.run(export_rx));

        let ctx = WorkerContext {
            client: self.client.clone(),
            page_queue,
            username_queue: Arc::new(JobQueue::bounded(self.config.username_queue_size)),
            page_counter,
            rank_counter,
            emit_lock: Arc::new(Mutex::new(())),
            export_tx,
            retry: self.config.retry.clone(),
        };

        let mut tasks = JoinSet::new();
        for i in 0..self.config.page_workers {
            tasks.spawn(page_worker(ctx.clone(), i));
        }
        for i in 0..self.config.stats_workers {
            tasks.spawn(stats_worker(ctx.clone(), i, self.config.worker_startup_delay));
        }
        tasks.spawn(watchdog(ctx, stop_rank, self.config.idle_grace));

        let first_finished = tasks.join_next().await;
        // Cancel the rest; in-flight jobs drop their senders and the
        // exporter drains whatever was already handed to it
        tasks.shutdown().await;

        let result = match first_finished {
            Some(Ok(result)) => result,
            Some(Err(join_err)) => Err(ScrapeError::WorkerPanicked(join_err.to_string())),
            None => Ok(()),
        };

        match export_handle.await {
            Ok(Ok(summary)) => (result, summary),
            Ok(Err(export_err)) => (Err(export_err), ExportSummary::default()),
            Err(join_err) => (Err(ScrapeError::WorkerPanicked(join_err.to_string())), ExportSummary::default()),
        }
    }
}
