use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StatsError};
use crate::skills::{self, LEVEL, MISSING, NUM_SKILLS, NUM_STATS, TOTAL, XP};

/// Longest username the hiscores accept
pub const MAX_USERNAME_LEN: usize = 12;

/// One player's hiscores entry as scraped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Display name (case preserved)
    pub username: String,
    /// Position on the overall leaderboard at scrape time
    pub rank: u64,
    /// `(rank, level, xp)` for total and each skill, [`MISSING`] when unranked
    pub stats: Vec<i64>,
    /// When the stats were fetched; absent for cleaned rows
    pub ts: Option<DateTime<Utc>>,
}

/// A line of the raw scrape output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeRow {
    Player(PlayerRecord),
    /// The ranking page listed the user but the stats endpoint had no entry
    NotFound { username: String, rank: u64 },
}

impl ScrapeRow {
    pub fn rank(&self) -> u64 {
        match self {
            ScrapeRow::Player(p) => p.rank,
            ScrapeRow::NotFound { rank, .. } => *rank,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            ScrapeRow::Player(p) => &p.username,
            ScrapeRow::NotFound { username, .. } => username,
        }
    }
}

impl PlayerRecord {
    pub fn new(username: impl Into<String>, rank: u64, stats: Vec<i64>) -> Self {
        Self { username: username.into(), rank, stats, ts: None }
    }

    pub fn with_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = Some(ts);
        self
    }

    /// Lowercased username, the primary key in the document store
    pub fn id(&self) -> String {
        self.username.to_lowercase()
    }

    pub fn stat(&self, skill: usize, field: usize) -> i64 {
        self.stats.get(skills::stat_column(skill, field)).copied().unwrap_or(MISSING)
    }

    pub fn total_level(&self) -> i64 {
        self.stat(TOTAL, LEVEL)
    }

    pub fn total_xp(&self) -> i64 {
        self.stat(TOTAL, XP)
    }

    /// Level of `skill`, `None` when unranked
    pub fn level(&self, skill: usize) -> Option<i64> {
        let level = self.stat(skill, LEVEL);
        (level != MISSING).then_some(level)
    }

    /// Storage form of the levels: one u16 per skill, 0 when unranked
    pub fn levels(&self) -> [u16; NUM_SKILLS] {
        let mut out = [0u16; NUM_SKILLS];
        for (skill, slot) in out.iter_mut().enumerate() {
            if let Some(level) = self.level(skill) {
                *slot = u16::try_from(level).unwrap_or(u16::MAX);
            }
        }
        out
    }

    /// Canonical leaderboard order: total level desc, total xp desc, rank asc
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        other
            .total_level()
            .cmp(&self.total_level())
            .then_with(|| other.total_xp().cmp(&self.total_xp()))
            .then_with(|| self.rank.cmp(&other.rank))
    }

    /// Raw scrape line: `username,rank,ts,<72 stats>`
    pub fn to_raw_csv_line(&self) -> String {
        let ts = self.ts.map(format_ts).unwrap_or_default();
        format!("{},{},{},{}", self.username, self.rank, ts, join_stats(&self.stats))
    }

    /// Cleaned line: `username,rank,<72 stats>`
    pub fn to_cleaned_csv_line(&self) -> String {
        format!("{},{},{}", self.username, self.rank, join_stats(&self.stats))
    }

    /// Parse a cleaned stats line (1-based `line` for error messages)
    pub fn parse_cleaned_line(raw: &str, line: usize) -> Result<Self> {
        let cells: Vec<&str> = raw.trim_end_matches(['\r', '\n']).split(',').collect();
        if cells.len() != NUM_STATS + 2 {
            return Err(StatsError::parse(
                line,
                format!("expected {} cells, found {}", NUM_STATS + 2, cells.len()),
            ));
        }
        let rank = parse_rank(cells[1], line)?;
        let stats = parse_stats(&cells[2..], line)?;
        Ok(Self::new(cells[0], rank, stats))
    }
}

impl ScrapeRow {
    /// Raw scrape line for either row kind
    pub fn to_csv_line(&self) -> String {
        match self {
            ScrapeRow::Player(p) => p.to_raw_csv_line(),
            ScrapeRow::NotFound { username, rank } => format!("{username},{rank}"),
        }
    }

    /// Parse one line of the raw scrape output
    pub fn parse_line(raw: &str, line: usize) -> Result<Self> {
        let cells: Vec<&str> = raw.trim_end_matches(['\r', '\n']).split(',').collect();
        match cells.len() {
            2 => Ok(ScrapeRow::NotFound {
                username: cells[0].to_string(),
                rank: parse_rank(cells[1], line)?,
            }),
            n if n == NUM_STATS + 3 => {
                let rank = parse_rank(cells[1], line)?;
                let ts = if cells[2].is_empty() {
                    None
                } else {
                    let parsed = DateTime::parse_from_rfc3339(cells[2])
                        .map_err(|e| StatsError::parse(line, format!("bad timestamp: {e}")))?;
                    Some(parsed.with_timezone(&Utc))
                };
                let stats = parse_stats(&cells[3..], line)?;
                Ok(ScrapeRow::Player(PlayerRecord { username: cells[0].to_string(), rank, stats, ts }))
            }
            n => Err(StatsError::parse(line, format!("unexpected cell count {n}"))),
        }
    }
}

/// Header of the raw scrape output
pub fn raw_header() -> String {
    format!("username,rank,ts,{}", skills::stat_header_cells().join(","))
}

/// Header of the cleaned stats file
pub fn cleaned_header() -> String {
    format!("username,rank,{}", skills::stat_header_cells().join(","))
}

/// Millisecond-precision RFC 3339 timestamp
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Whether `name` fits the hiscores username rules
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_USERNAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-')
}

fn join_stats(stats: &[i64]) -> String {
    stats
        .iter()
        .map(|v| if *v == MISSING { String::new() } else { v.to_string() })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_rank(cell: &str, line: usize) -> Result<u64> {
    cell.trim().parse::<u64>().map_err(|e| StatsError::parse(line, format!("bad rank {cell:?}: {e}")))
}

fn parse_stats(cells: &[&str], line: usize) -> Result<Vec<i64>> {
    cells
        .iter()
        .map(|cell| {
            let cell = cell.trim();
            if cell.is_empty() {
                return Ok(MISSING);
            }
            let value = cell
                .parse::<i64>()
                .map_err(|e| StatsError::parse(line, format!("bad stat {cell:?}: {e}")))?;
            Ok(if value < 0 { MISSING } else { value })
        })
        .collect()
}
