//! HTTP client for the two hiscores endpoints: the HTML ranking pages and
//! the plain-text per-player stats.

use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use player_stats::{MISSING, NUM_SKILLS};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::debug;

use crate::config::ScraperConfig;
use crate::error::{Result, ScrapeError};

/// Highest page number the leaderboard serves
pub const MAX_PAGE: u32 = 80_000;

/// Rows per ranking page
pub const PAGE_SIZE: usize = 25;

/// Text the leaderboard shows instead of the table while the caller's IP
/// is blocked
pub const BLOCK_SENTINEL: &str = "your IP has been temporarily blocked";

/// One row of a ranking page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub rank: u64,
    pub username: String,
    pub total_level: u64,
    pub total_xp: u64,
}

/// A successful stats fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedStats {
    /// 72 values: (rank, level, xp) per skill, -1 where unranked
    pub stats: Vec<i64>,
    /// Scrape time, millisecond precision
    pub ts: DateTime<Utc>,
}

/// Hiscores client; cheap to share behind an `Arc`
pub struct HiscoresClient {
    client: Client,
    page_url: String,
    stats_url: String,
    page_timeout: Duration,
    stats_timeout: Duration,
}

impl HiscoresClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36")
            .build()?;

        Ok(Self {
            client,
            page_url: config.page_url.clone(),
            stats_url: config.stats_url.clone(),
            page_timeout: config.page_timeout,
            stats_timeout: config.stats_timeout,
        })
    }

    /// Fetch one ranking page of the overall leaderboard
    pub async fn fetch_page(&self, page: u32) -> Result<Vec<PageEntry>> {
        if !(1..=MAX_PAGE).contains(&page) {
            return Err(ScrapeError::InvalidPage(page));
        }

        let response = self
            .client
            .get(&self.page_url)
            .query(&[("table", "0".to_string()), ("page", page.to_string())])
            .timeout(self.page_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::request_failed(
                Some(status.as_u16()),
                format!("ranking page {page} returned {status}"),
            ));
        }

        let html = response.text().await?;
        debug!("Fetched ranking page {} ({} bytes)", page, html.len());
        parse_ranking_page(&html)
    }

    /// Fetch a player's stats; 404 means the player is not on the hiscores
    pub async fn fetch_stats(&self, username: &str) -> Result<FetchedStats> {
        let response = self
            .client
            .get(&self.stats_url)
            .query(&[("player", username)])
            .timeout(self.stats_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ScrapeError::UserNotFound(username.to_string()));
        }
        if !status.is_success() {
            return Err(ScrapeError::request_failed(
                Some(status.as_u16()),
                format!("stats for {username} returned {status}"),
            ));
        }

        let body = response.text().await?;
        let stats = parse_stats_payload(&body)?;
        Ok(FetchedStats { stats, ts: Utc::now().trunc_subsecs(3) })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScrapeError::ParsingFailed(format!("bad selector {css}: {e}")))
}

fn parse_number(cell: &str, what: &str) -> Result<u64> {
    cell.replace(',', "")
        .trim()
        .parse()
        .map_err(|_| ScrapeError::ParsingFailed(format!("{what} is not a number: {cell:?}")))
}

/// Parse the ranking table out of a leaderboard page
pub fn parse_ranking_page(html: &str) -> Result<Vec<PageEntry>> {
    let document = Html::parse_document(html);
    let row_selector = selector("tr.personal-hiscores__row")?;
    let cell_selector = selector("td")?;

    let cells: Vec<String> = document
        .select(&row_selector)
        .flat_map(|row| row.select(&cell_selector).map(|td| td.text().collect::<String>()))
        .map(|text| text.replace('\u{a0}', " ").trim().to_string())
        .collect();

    if cells.is_empty() {
        if html.contains(BLOCK_SENTINEL) {
            return Err(ScrapeError::IpAddressBlocked);
        }
        return Err(ScrapeError::ParsingFailed("ranking table not found".into()));
    }
    if cells.len() % 4 != 0 || cells.len() > 4 * PAGE_SIZE {
        return Err(ScrapeError::ParsingFailed(format!(
            "ranking table has {} cells, expected 4 per row",
            cells.len()
        )));
    }

    cells
        .chunks(4)
        .map(|row| {
            Ok(PageEntry {
                rank: parse_number(&row[0], "rank")?,
                username: row[1].clone(),
                total_level: parse_number(&row[2], "total level")?,
                total_xp: parse_number(&row[3], "total xp")?,
            })
        })
        .collect()
}

/// Parse the stats endpoint's text body: one `rank,level,xp` line per
/// skill (total first), followed by activity lines that are ignored
pub fn parse_stats_payload(body: &str) -> Result<Vec<i64>> {
    let lines: Vec<&str> = body.lines().map(str::trim).filter(|l| !l.is_empty()).take(NUM_SKILLS).collect();
    if lines.len() < NUM_SKILLS {
        if body.contains(BLOCK_SENTINEL) {
            return Err(ScrapeError::IpAddressBlocked);
        }
        return Err(ScrapeError::ParsingFailed(format!(
            "stats payload has {} skill lines, expected {}",
            lines.len(),
            NUM_SKILLS
        )));
    }

    let mut stats = Vec::with_capacity(NUM_SKILLS * 3);
    for (i, line) in lines.iter().enumerate() {
        let values: Vec<&str> = line.split(',').collect();
        if values.len() != 3 {
            return Err(ScrapeError::ParsingFailed(format!("skill line {i} is malformed: {line:?}")));
        }
        for value in values {
            let v: i64 = value
                .trim()
                .parse()
                .map_err(|_| ScrapeError::ParsingFailed(format!("skill line {i} is malformed: {line:?}")))?;
            stats.push(if v < 0 { MISSING } else { v });
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use player_stats::skills;

    fn ranking_row(rank: u64, username: &str, level: u64, xp: u64) -> String {
        format!(
            "<tr class=\"personal-hiscores__row\">\
             <td class=\"right\">{rank}</td>\
             <td class=\"left\"><a href=\"#\">{}</a></td>\
             <td class=\"right\">{level}</td>\
             <td class=\"right\">{xp}</td></tr>",
            username.replace(' ', "&#160;")
        )
    }

    #[test]
    fn test_parse_ranking_page() {
        let html = format!(
            "<html><body><table>{}{}</table></body></html>",
            ranking_row(1, "Lynx Titan", 2277, 4_600_000_000),
            ranking_row(2, "Zezima", 2277, 4_590_000_000),
        )
        .replace("4600000000", "4,600,000,000");

        let entries = parse_ranking_page(&html).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            PageEntry { rank: 1, username: "Lynx Titan".into(), total_level: 2277, total_xp: 4_600_000_000 }
        );
        assert_eq!(entries[1].username, "Zezima");
    }

    #[test]
    fn test_block_page_detected() {
        let html = "<html><body><p>Sorry, your IP has been temporarily blocked due to high traffic.</p></body></html>";
        assert!(matches!(parse_ranking_page(html), Err(ScrapeError::IpAddressBlocked)));
    }

    #[test]
    fn test_missing_table_is_parse_failure() {
        let html = "<html><body><p>maintenance</p></body></html>";
        assert!(matches!(parse_ranking_page(html), Err(ScrapeError::ParsingFailed(_))));
    }

    #[test]
    fn test_parse_stats_payload() {
        let mut body = String::from("1,2277,4600000000\n");
        for skill in 1..NUM_SKILLS {
            body.push_str(&format!("{skill},99,200000000\n"));
        }
        body.push_str("-1,-1\n-1,-1\n");
        let stats = parse_stats_payload(&body).unwrap();
        assert_eq!(stats.len(), 72);

        // Lynx Titan: rank 1, maxed total, 99 and 200M xp in every skill
        let at = |skill, field| stats[skills::stat_column(skill, field)];
        assert_eq!(at(skills::TOTAL, skills::RANK), 1);
        assert_eq!(at(skills::TOTAL, skills::LEVEL), 2277);
        assert_eq!(at(skills::TOTAL, skills::XP), 4_600_000_000);
        for skill in 1..NUM_SKILLS {
            assert_eq!(at(skill, skills::RANK), skill as i64, "{}", skills::SKILLS[skill]);
            assert_eq!(at(skill, skills::LEVEL), 99, "{}", skills::SKILLS[skill]);
            assert_eq!(at(skill, skills::XP), 200_000_000, "{}", skills::SKILLS[skill]);
        }
    }

    #[test]
    fn test_unranked_skill_is_missing() {
        let mut body = String::from("1000,1500,30000000\n-1,1,-1\n");
        for _ in 2..NUM_SKILLS {
            body.push_str("300,70,800000\n");
        }
        let stats = parse_stats_payload(&body).unwrap();
        assert_eq!(&stats[3..6], &[MISSING, 1, MISSING]);
    }

    #[test]
    fn test_short_stats_payload_rejected() {
        assert!(matches!(parse_stats_payload("1,2,3\n"), Err(ScrapeError::ParsingFailed(_))));
    }
}
