//! # Stats table
//!
//! The cleaned, deduplicated and canonically ordered player table every
//! analytics stage reads, plus the feature-split extraction.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::config::Split;
use crate::error::{Result, StatsError};
use crate::matrix::Matrix;
use crate::record::{self, PlayerRecord, ScrapeRow};
use crate::skills::{LEVEL, NUM_SKILLS, TOTAL};
use crate::stage;

/// Cleaned player table; row order is the canonical leaderboard order and
/// `rank` equals the 1-based row number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsTable {
    records: Vec<PlayerRecord>,
}

impl StatsTable {
    /// Wrap records that are already clean
    pub fn from_records(records: Vec<PlayerRecord>) -> Self {
        Self { records }
    }

    /// Clean raw scrape rows: drop not-found sentinels and malformed
    /// usernames, keep the latest scrape per (case-insensitive) username,
    /// sort canonically and rewrite `rank` as the row number
    pub fn clean(rows: impl IntoIterator<Item = ScrapeRow>) -> Self {
        let mut latest: HashMap<String, usize> = HashMap::new();
        let mut records: Vec<PlayerRecord> = Vec::new();
        let mut dropped = 0usize;

        for row in rows {
            let ScrapeRow::Player(record) = row else {
                continue;
            };
            if !record::is_valid_username(&record.username) {
                warn!("Skipping rank {}: invalid username {:?}", record.rank, record.username);
                continue;
            }
            match latest.get(&record.id()) {
                Some(&at) => {
                    dropped += 1;
                    if record.ts >= records[at].ts {
                        records[at] = record;
                    }
                }
                None => {
                    latest.insert(record.id(), records.len());
                    records.push(record);
                }
            }
        }

        records.sort_by(PlayerRecord::canonical_cmp);
        for (i, record) in records.iter_mut().enumerate() {
            record.rank = i as u64 + 1;
            record.ts = None;
        }
        if dropped > 0 {
            info!("Dropped {} duplicate usernames while cleaning", dropped);
        }
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PlayerRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.records.iter()
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.username.as_str())
    }

    /// Highest-rank (last) player
    pub fn last(&self) -> Option<&PlayerRecord> {
        self.records.last()
    }

    /// Levels of `split`'s skills, one row per player, NaN where unranked.
    /// With `include_total` the total level is injected as column 0.
    pub fn split_dataset(&self, split: &Split, include_total: bool) -> Result<Matrix> {
        let mut columns = split.skill_indices()?;
        if include_total {
            columns.insert(0, TOTAL);
        }
        let mut matrix = Matrix::zeros(self.records.len(), columns.len());
        for (i, record) in self.records.iter().enumerate() {
            let row = matrix.row_mut(i);
            for (slot, &skill) in row.iter_mut().zip(&columns) {
                *slot = match record.level(skill) {
                    Some(level) if level > 0 => level as f64,
                    _ => f64::NAN,
                };
            }
        }
        Ok(matrix)
    }

    /// Levels of every skill (total first), NaN where unranked
    pub fn level_matrix(&self) -> Matrix {
        let mut matrix = Matrix::zeros(self.records.len(), NUM_SKILLS);
        for (i, record) in self.records.iter().enumerate() {
            for (slot, level) in matrix.row_mut(i).iter_mut().zip(record.levels()) {
                *slot = if level == 0 { f64::NAN } else { level as f64 };
            }
        }
        matrix
    }

    /// Clustering features of `split`: its skill levels without `total`
    pub fn feature_matrix(&self, split: &Split) -> Result<Matrix> {
        self.split_dataset(split, false)
    }

    /// Load a cleaned stats CSV
    pub fn load_cleaned(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        let expected = record::cleaned_header();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if i == 0 {
                if line.trim_end() != expected {
                    return Err(StatsError::Header(line));
                }
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            records.push(PlayerRecord::parse_cleaned_line(&line, i + 1)?);
        }
        info!("Loaded {} players from {}", records.len(), path.display());
        Ok(Self { records })
    }

    /// Write the cleaned stats CSV atomically
    pub fn write_cleaned(&self, path: &Path) -> Result<()> {
        stage::write_atomically(path, |w| {
            writeln!(w, "{}", record::cleaned_header())?;
            for record in &self.records {
                writeln!(w, "{}", record.to_cleaned_csv_line())?;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Number of ranked skills per player among `columns`, the basis of
    /// the k-means row weights
    pub fn ranked_counts(&self, columns: &[usize]) -> Vec<usize> {
        self.records
            .iter()
            .map(|r| columns.iter().filter(|&&c| r.stat(c, LEVEL) > 0).count())
            .collect()
    }
}

/// Read every row of a raw scrape file (header optional)
pub fn read_scrape_rows(path: &Path) -> Result<Vec<ScrapeRow>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || (i == 0 && line.starts_with("username,")) {
            continue;
        }
        rows.push(ScrapeRow::parse_line(&line, i + 1)?);
    }
    Ok(rows)
}
