//! End-to-end scrapes against an in-process fake hiscores server.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hiscores_scraper::{ScrapeDriver, ScrapeError, ScrapeRequest, ScraperConfig, VpnHook};
use parking_lot::Mutex;
use player_stats::record::raw_header;
use player_stats::table::read_scrape_rows;
use player_stats::{PlayerRecord, ScrapeRow, StageOutcome, NUM_SKILLS};
use warp::http::StatusCode;
use warp::Filter;

const BLOCK_PAGE: &str =
    "<html><body><p>Sorry, your IP has been temporarily blocked due to unusual traffic.</p></body></html>";

#[derive(Default)]
struct FakeHiscores {
    /// Pages answered with the block sentinel until removed
    blocked_once: Mutex<HashSet<u32>>,
    /// Pages always answered with the block sentinel
    blocked_always: HashSet<u32>,
    /// Ranks whose first stats request stalls past the client timeout
    slow_once: Mutex<HashSet<u64>>,
    page_hits: Mutex<HashMap<u32, u32>>,
    stats_requests: AtomicU32,
}

fn username(rank: u64) -> String {
    if rank % 10 == 0 {
        format!("top {rank}")
    } else {
        format!("player{rank}")
    }
}

fn rank_of(username: &str) -> Option<u64> {
    let digits: String = username.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn is_missing_player(rank: u64) -> bool {
    rank % 37 == 0
}

fn stats_body(rank: u64) -> String {
    let mut body = format!("{},{},{}\n", rank, 2277 - rank % 500, 4_000_000_000 - rank * 1000);
    for skill in 1..NUM_SKILLS as u64 {
        body.push_str(&format!("{},{},{}\n", rank + skill, 99 - skill % 40, 13_034_431 - skill));
    }
    body.push_str("-1,-1\n-1,-1\n");
    body
}

fn ranking_page(page: u32) -> String {
    let mut rows = String::new();
    let first = (page as u64 - 1) * 25 + 1;
    for rank in first..first + 25 {
        rows.push_str(&format!(
            "<tr class=\"personal-hiscores__row\"><td class=\"right\">{}</td>\
             <td class=\"left\"><a href=\"#\">{}</a></td><td class=\"right\">2,277</td>\
             <td class=\"right\">4,600,000,000</td></tr>",
            rank,
            username(rank).replace(' ', "&#160;")
        ));
    }
    format!("<html><body><table class=\"personal-hiscores__table\">{rows}</table></body></html>")
}

impl FakeHiscores {
    fn serve_page(&self, query: &HashMap<String, String>) -> (StatusCode, String) {
        let Some(page) = query.get("page").and_then(|p| p.parse::<u32>().ok()) else {
            return (StatusCode::BAD_REQUEST, String::new());
        };
        *self.page_hits.lock().entry(page).or_default() += 1;
        if self.blocked_always.contains(&page) || self.blocked_once.lock().remove(&page) {
            return (StatusCode::OK, BLOCK_PAGE.to_string());
        }
        (StatusCode::OK, ranking_page(page))
    }

    async fn serve_stats(&self, query: &HashMap<String, String>) -> (StatusCode, String) {
        self.stats_requests.fetch_add(1, Ordering::SeqCst);
        let Some(rank) = query.get("player").and_then(|name| rank_of(name)) else {
            return (StatusCode::NOT_FOUND, String::new());
        };
        // Scramble completion order across workers
        tokio::time::sleep(Duration::from_millis(rank * 7919 % 13)).await;
        if self.slow_once.lock().remove(&rank) {
            tokio::time::sleep(Duration::from_millis(600)).await;
        }
        if is_missing_player(rank) {
            return (StatusCode::NOT_FOUND, "Not Found".to_string());
        }
        (StatusCode::OK, stats_body(rank))
    }

    fn page_hits(&self, page: u32) -> u32 {
        self.page_hits.lock().get(&page).copied().unwrap_or(0)
    }
}

fn start_server(state: Arc<FakeHiscores>) -> SocketAddr {
    let pages_state = state.clone();
    let pages = warp::path("overall").and(warp::query::<HashMap<String, String>>()).map(move |query| {
        let (status, body) = pages_state.serve_page(&query);
        warp::reply::with_status(warp::reply::html(body), status)
    });

    let stats = warp::path("index_lite.ws").and(warp::query::<HashMap<String, String>>()).and_then(
        move |query: HashMap<String, String>| {
            let state = state.clone();
            async move {
                let (status, body) = state.serve_stats(&query).await;
                Ok::<_, warp::Rejection>(warp::reply::with_status(warp::reply::html(body), status))
            }
        },
    );

    let (addr, server) = warp::serve(pages.or(stats)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

fn test_config(addr: SocketAddr) -> ScraperConfig {
    let mut config = ScraperConfig::default();
    config.set_base_url(&format!("http://{addr}"));
    config.worker_startup_delay = Duration::from_millis(1);
    config.idle_grace = Duration::from_millis(50);
    config.stats_timeout = Duration::from_millis(300);
    config.retry.backoff = Duration::from_millis(10);
    config.restart_cooldown = Duration::from_millis(10);
    config.progress_every = 100;
    config.with_stats_workers(28)
}

fn request(start: u64, stop: u64, out: &Path) -> ScrapeRequest {
    ScrapeRequest { start_rank: start, stop_rank: stop, out_file: out.to_path_buf() }
}

fn ranks_in(path: &Path) -> Vec<u64> {
    read_scrape_rows(path).unwrap().iter().map(|row| row.rank()).collect()
}

#[tokio::test]
async fn test_parallel_scrape_preserves_rank_order() {
    let state = Arc::new(FakeHiscores::default());
    let addr = start_server(state.clone());
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("raw.csv");

    let driver = ScrapeDriver::new(test_config(addr)).unwrap();
    let outcome = driver.run(&request(1, 500, &out)).await.unwrap();
    assert_eq!(outcome, StageOutcome::Completed);

    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(text.lines().next().unwrap(), raw_header());

    let rows = read_scrape_rows(&out).unwrap();
    assert_eq!(rows.iter().map(|r| r.rank()).collect::<Vec<_>>(), (1..=500).collect::<Vec<_>>());
    for row in &rows {
        assert_eq!(row.username(), username(row.rank()));
        match row {
            ScrapeRow::NotFound { rank, .. } => assert!(is_missing_player(*rank)),
            ScrapeRow::Player(record) => {
                assert!(!is_missing_player(record.rank));
                assert_eq!(record.stats.len(), 72);
                assert_eq!(record.total_level(), (2277 - record.rank % 500) as i64);
                assert!(record.ts.is_some());
            }
        }
    }

    // Second run finds nothing left to do and makes no stats requests
    let before = state.stats_requests.load(Ordering::SeqCst);
    let outcome = driver.run(&request(1, 500, &out)).await.unwrap();
    assert_eq!(outcome, StageOutcome::NothingToDo);
    assert_eq!(state.stats_requests.load(Ordering::SeqCst), before);
}

#[tokio::test]
async fn test_resume_appends_after_last_rank() {
    let state = Arc::new(FakeHiscores::default());
    let addr = start_server(state.clone());
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("raw.csv");

    let mut existing = format!("{}\n", raw_header());
    for rank in 1..=137 {
        let record = PlayerRecord::new(username(rank), rank, vec![1; 72]);
        existing.push_str(&ScrapeRow::Player(record).to_csv_line());
        existing.push('\n');
    }
    std::fs::write(&out, &existing).unwrap();

    let driver = ScrapeDriver::new(test_config(addr)).unwrap();
    driver.run(&request(1, 200, &out)).await.unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.starts_with(&existing));
    assert_eq!(ranks_in(&out), (1..=200).collect::<Vec<_>>());

    // Pages before the one holding rank 138 are never fetched again
    assert_eq!(state.page_hits(5), 0);
    assert_eq!(state.page_hits(6), 1);
    assert_eq!(state.stats_requests.load(Ordering::SeqCst), 63);
}

#[tokio::test]
async fn test_block_without_vpn_aborts_with_clean_prefix() {
    let state = Arc::new(FakeHiscores { blocked_always: HashSet::from([3]), ..Default::default() });
    let addr = start_server(state.clone());
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("raw.csv");

    let driver = ScrapeDriver::new(test_config(addr)).unwrap();
    let err = driver.run(&request(1, 100, &out)).await.unwrap_err();
    assert!(matches!(err, ScrapeError::IpAddressBlocked));

    let ranks = ranks_in(&out);
    assert!(ranks.len() <= 50);
    assert_eq!(ranks, (1..=ranks.len() as u64).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_block_with_vpn_restarts_and_completes() {
    let state = Arc::new(FakeHiscores { blocked_once: Mutex::new(HashSet::from([3])), ..Default::default() });
    let addr = start_server(state.clone());
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("raw.csv");

    let driver = ScrapeDriver::new(test_config(addr)).unwrap().with_vpn(VpnHook::from_command_line("true").unwrap());
    let outcome = driver.run(&request(1, 100, &out)).await.unwrap();
    assert_eq!(outcome, StageOutcome::Completed);

    assert_eq!(ranks_in(&out), (1..=100).collect::<Vec<_>>());
    assert_eq!(state.page_hits(3), 2);
}

#[tokio::test]
async fn test_restart_limit_is_fatal() {
    let state = Arc::new(FakeHiscores { blocked_always: HashSet::from([1]), ..Default::default() });
    let addr = start_server(state.clone());
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("raw.csv");

    let mut config = test_config(addr);
    config.max_restarts = 2;
    let driver = ScrapeDriver::new(config).unwrap().with_vpn(VpnHook::from_command_line("true").unwrap());
    let err = driver.run(&request(1, 25, &out)).await.unwrap_err();
    assert!(err.is_block_event());
    assert_eq!(state.page_hits(1), 3);
    assert!(ranks_in(&out).is_empty());
}

#[tokio::test]
async fn test_busy_stats_request_is_retried() {
    let state = Arc::new(FakeHiscores { slow_once: Mutex::new(HashSet::from([5])), ..Default::default() });
    let addr = start_server(state.clone());
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("raw.csv");

    let driver = ScrapeDriver::new(test_config(addr)).unwrap();
    driver.run(&request(1, 25, &out)).await.unwrap();

    assert_eq!(ranks_in(&out), (1..=25).collect::<Vec<_>>());
    assert_eq!(state.stats_requests.load(Ordering::SeqCst), 26);
}
