//! Page and stats worker loops.
//!
//! Page workers turn ranking pages into username jobs, emitting pages in
//! ascending order. Stats workers fetch each username's stats and hand the
//! row to the exporter strictly in rank order. A job a worker is holding
//! when it fails or is cancelled goes back to its queue.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use player_stats::{PlayerRecord, ScrapeRow};
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::client::HiscoresClient;
use crate::config::RetryConfig;
use crate::counter::JobCounter;
use crate::error::{Result, ScrapeError};
use crate::jobs::{PageJob, UsernameJob};
use crate::queue::{InFlight, JobQueue};

/// State shared by every worker of one scrape attempt
#[derive(Clone)]
pub struct WorkerContext {
    pub client: Arc<HiscoresClient>,
    pub page_queue: Arc<JobQueue<PageJob>>,
    pub username_queue: Arc<JobQueue<UsernameJob>>,
    /// Next page allowed to emit usernames
    pub page_counter: Arc<JobCounter>,
    /// Next rank allowed to reach the exporter
    pub rank_counter: Arc<JobCounter>,
    pub emit_lock: Arc<Mutex<()>>,
    pub export_tx: mpsc::UnboundedSender<ScrapeRow>,
    pub retry: RetryConfig,
}

/// Retry `f` while the server reports busy, then escalate to a request
/// failure so the attempt ends
pub async fn with_busy_retry<F, Fut, T>(retry: &RetryConfig, what: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Err(ScrapeError::ServerBusy) if attempt < retry.max_retries => {
                attempt += 1;
                warn!(
                    "Server busy fetching {} (attempt {}/{}), retrying in {:?}",
                    what, attempt, retry.max_retries, retry.backoff
                );
                sleep(retry.backoff).await;
            }
            Err(ScrapeError::ServerBusy) => {
                return Err(ScrapeError::request_failed(
                    None,
                    format!("server still busy after {} retries fetching {what}", retry.max_retries),
                ));
            }
            other => return other,
        }
    }
}

/// Consume page jobs forever; returns only on error
pub async fn page_worker(ctx: WorkerContext, index: usize) -> Result<()> {
    debug!("Page worker {} started", index);
    loop {
        let job = ctx.page_queue.get().await;
        let guard = InFlight::new(&ctx.page_queue, job);
        let job = guard.job();

        let what = format!("page {}", job.pagenum);
        let entries = with_busy_retry(&ctx.retry, &what, || ctx.client.fetch_page(job.pagenum)).await?;
        if entries.len() < job.endind {
            return Err(ScrapeError::ParsingFailed(format!(
                "page {} has {} rows, expected at least {}",
                job.pagenum,
                entries.len(),
                job.endind
            )));
        }

        ctx.page_counter.wait_until(job.pagenum as u64).await;
        {
            let _emit = ctx.emit_lock.lock().await;
            for (offset, entry) in entries.into_iter().enumerate().take(job.endind).skip(job.startind) {
                let rank = job.rank_at(offset);
                if entry.rank != rank {
                    debug!("Page {} lists rank {} at offset {}, using {}", job.pagenum, entry.rank, offset, rank);
                }
                ctx.username_queue.put(UsernameJob { rank, username: entry.username }).await;
            }
        }

        let done = guard.complete();
        ctx.page_counter.next();
        debug!("Page {} emitted", done.pagenum);
    }
}

/// Consume username jobs forever; returns only on error
pub async fn stats_worker(ctx: WorkerContext, index: usize, startup_delay: Duration) -> Result<()> {
    sleep(startup_delay * index as u32).await;
    debug!("Stats worker {} started", index);
    loop {
        let job = ctx.username_queue.get().await;
        let guard = InFlight::new(&ctx.username_queue, job);
        let job = guard.job();

        let fetched = with_busy_retry(&ctx.retry, &job.username, || ctx.client.fetch_stats(&job.username)).await;
        let row = match fetched {
            Ok(fetched) => ScrapeRow::Player(
                PlayerRecord::new(job.username.clone(), job.rank, fetched.stats).with_ts(fetched.ts),
            ),
            Err(ScrapeError::UserNotFound(_)) => {
                ScrapeRow::NotFound { username: job.username.clone(), rank: job.rank }
            }
            Err(e) => return Err(e),
        };

        ctx.rank_counter.wait_until(job.rank).await;
        ctx.export_tx.send(row).map_err(|_| ScrapeError::ExporterClosed)?;
        guard.complete();
        ctx.rank_counter.next();
    }
}

/// Resolves once both queues are drained and every rank up to `stop_rank`
/// has been exported, checked every `idle_grace`
pub async fn watchdog(ctx: WorkerContext, stop_rank: u64, idle_grace: Duration) -> Result<()> {
    // The watchdog must not keep the exporter alive
    let WorkerContext { page_queue, username_queue, rank_counter, export_tx, .. } = ctx;
    drop(export_tx);
    loop {
        sleep(idle_grace).await;
        if page_queue.is_empty() && username_queue.is_empty() && rank_counter.value() > stop_rank {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_retry(max_retries: u32) -> RetryConfig {
        RetryConfig { max_retries, backoff: Duration::from_millis(1) }
    }

    #[tokio::test]
    async fn test_busy_retry_recovers() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_busy_retry(&quick_retry(3), "x", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ScrapeError::ServerBusy)
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_busy_retry_escalates() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_busy_retry(&quick_retry(3), "x", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ScrapeError::ServerBusy)
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.is_block_event());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_busy_retry(&quick_retry(3), "x", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ScrapeError::UserNotFound("x".into()))
        })
        .await;
        assert!(matches!(result, Err(ScrapeError::UserNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
