//! # Exporter
//!
//! Single consumer of scraped rows. Rows arrive already in rank order
//! (the stats workers' ordering gate guarantees it) and are appended to
//! the output CSV, so the file is always a rank-ordered prefix of the
//! requested range and a crash loses at most the unflushed tail.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

use player_stats::record::{raw_header, ScrapeRow};
use tokio::fs::OpenOptions as AsyncOpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::Result;

/// How far back from the end of the file the resume scan looks
const TAIL_BYTES: u64 = 8 * 1024;

/// Totals for one exporter run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: u64,
    pub not_found: u64,
    pub last_rank: Option<u64>,
}

pub struct Exporter {
    path: PathBuf,
    writer: BufWriter<tokio::fs::File>,
    progress_every: u64,
}

impl Exporter {
    /// Open `path` for appending, writing the header if the file is new and
    /// cutting off a torn final line left by an interrupted run
    pub async fn open(path: &Path, progress_every: u64) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        repair_tail(path)?;

        let file = AsyncOpenOptions::new().create(true).append(true).open(path).await?;
        let is_new = file.metadata().await?.len() == 0;
        let mut writer = BufWriter::new(file);
        if is_new {
            writer.write_all(format!("{}\n", raw_header()).as_bytes()).await?;
            writer.flush().await?;
        }

        Ok(Self { path: path.to_path_buf(), writer, progress_every: progress_every.max(1) })
    }

    /// Append rows until every sender is dropped. The buffer is flushed
    /// whenever the channel runs dry.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ScrapeRow>) -> Result<ExportSummary> {
        let mut summary = ExportSummary::default();
        let started = Instant::now();

        while let Some(row) = rx.recv().await {
            if let ScrapeRow::NotFound { username, rank } = &row {
                warn!("Player {} at rank {} not found", username, rank);
                summary.not_found += 1;
            }
            self.writer.write_all(row.to_csv_line().as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
            summary.written += 1;
            summary.last_rank = Some(row.rank());

            if summary.written % self.progress_every == 0 {
                let rate = summary.written as f64 / started.elapsed().as_secs_f64().max(1e-3);
                info!("Exported {} rows (rank {}, {:.1} rows/s)", summary.written, row.rank(), rate);
            }
            if rx.is_empty() {
                self.writer.flush().await?;
            }
        }

        self.writer.flush().await?;
        info!(
            "Exporter finished: {} rows appended to {} ({} not found)",
            summary.written,
            self.path.display(),
            summary.not_found
        );
        Ok(summary)
    }
}

/// Truncate a final line that lacks its newline
fn repair_tail(path: &Path) -> Result<()> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let (offset, tail) = read_tail(&mut file, len)?;
    if tail.ends_with(b"\n") {
        return Ok(());
    }
    let keep = match tail.iter().rposition(|&b| b == b'\n') {
        Some(pos) => offset + pos as u64 + 1,
        None if offset == 0 => 0,
        // A single line longer than the scan window cannot be a scrape row
        None => return Ok(()),
    };
    warn!("Truncating torn line at the end of {} ({} bytes)", path.display(), len - keep);
    file.set_len(keep)?;
    Ok(())
}

fn read_tail(file: &mut File, len: u64) -> std::io::Result<(u64, Vec<u8>)> {
    let offset = len.saturating_sub(TAIL_BYTES);
    file.seek(SeekFrom::Start(offset))?;
    let mut tail = Vec::with_capacity((len - offset) as usize);
    file.read_to_end(&mut tail)?;
    Ok((offset, tail))
}

/// Highest rank already present in a scrape output file, if any
pub fn last_exported_rank(path: &Path) -> Result<Option<u64>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata()?.len();
    let (offset, tail) = read_tail(&mut file, len)?;
    let text = String::from_utf8_lossy(&tail);

    let mut lines: Vec<&str> = text.split('\n').collect();
    // The first line may be cut by the scan window, the last may be torn
    if offset > 0 && !lines.is_empty() {
        lines.remove(0);
    }
    if !text.ends_with('\n') {
        lines.pop();
    }

    Ok(lines
        .into_iter()
        .filter(|line| !line.trim().is_empty() && !line.starts_with("username,"))
        .filter_map(|line| ScrapeRow::parse_line(line, 0).ok())
        .map(|row| row.rank())
        .max())
}

#[cfg(test)]
mod tests {
    use super::*;
    use player_stats::{PlayerRecord, MISSING, NUM_STATS};

    fn player(rank: u64) -> ScrapeRow {
        ScrapeRow::Player(PlayerRecord::new(&format!("player{rank}"), rank, vec![MISSING; NUM_STATS]))
    }

    #[tokio::test]
    async fn test_exporter_writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");

        let (tx, rx) = mpsc::unbounded_channel();
        let exporter = Exporter::open(&path, 1000).await.unwrap();
        let handle = tokio::spawn(exporter.run(rx));
        tx.send(player(1)).unwrap();
        tx.send(ScrapeRow::NotFound { username: "ghost".into(), rank: 2 }).unwrap();
        tx.send(player(3)).unwrap();
        drop(tx);

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary, ExportSummary { written: 3, not_found: 1, last_rank: Some(3) });

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], raw_header());
        assert_eq!(lines[2], "ghost,2");
        assert_eq!(lines.len(), 4);
        assert_eq!(last_exported_rank(&path).unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_reopen_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        for rank in 1..=2 {
            let (tx, rx) = mpsc::unbounded_channel();
            let exporter = Exporter::open(&path, 1000).await.unwrap();
            tx.send(player(rank)).unwrap();
            drop(tx);
            exporter.run(rx).await.unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("username,rank").count(), 1);
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_torn_line_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let full = format!("{}\n{}\n", raw_header(), player(1).to_csv_line());
        std::fs::write(&path, format!("{full}player2,2,2024-01-0")).unwrap();

        assert_eq!(last_exported_rank(&path).unwrap(), Some(1));
        repair_tail(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), full);
    }

    #[test]
    fn test_missing_or_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        assert_eq!(last_exported_rank(&path).unwrap(), None);
        std::fs::write(&path, format!("{}\n", raw_header())).unwrap();
        assert_eq!(last_exported_rank(&path).unwrap(), None);
    }
}
