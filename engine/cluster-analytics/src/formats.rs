//! # CSV artifacts
//!
//! - **centroids**: `split,clusterid,<23 skills>`; cells of skills outside a
//!   split are empty, values carry 6 decimals
//! - **clusters**: `player,<split>...`, one row per player in stats-table order
//! - **xyz**: `split,clusterid,x,y,z`
//!
//! Every writer goes through [`stage::write_atomically`].

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use player_stats::skills::real_skills;
use player_stats::{stage, Matrix, Split};

use crate::error::{AnalyticsError, Result};
use crate::umap::N_COMPONENTS;

/// One split's centroid matrix, rows in cluster-id order
#[derive(Debug, Clone, PartialEq)]
pub struct SplitCentroids {
    pub split: Split,
    pub centroids: Matrix,
}

impl SplitCentroids {
    pub fn k(&self) -> usize {
        self.centroids.rows()
    }
}

/// One split's 3D centroid projection
#[derive(Debug, Clone, PartialEq)]
pub struct SplitProjection {
    pub split: String,
    pub xyz: Matrix,
}

pub fn centroids_header() -> String {
    let skills: Vec<&str> = real_skills().collect();
    format!("split,clusterid,{}", skills.join(","))
}

pub fn write_centroids(path: &Path, splits: &[SplitCentroids]) -> Result<()> {
    let header = centroids_header();
    let mut columns = Vec::with_capacity(splits.len());
    for s in splits {
        if s.centroids.cols() != s.split.len() {
            return Err(AnalyticsError::shape(format!(
                "split {} has {} skills but {} centroid columns",
                s.split.name,
                s.split.len(),
                s.centroids.cols()
            )));
        }
        // Position of each real skill within the split, if present
        let slots: Vec<Option<usize>> =
            real_skills().map(|skill| s.split.skills.iter().position(|x| x == skill)).collect();
        columns.push(slots);
    }

    stage::write_atomically(path, |w| {
        writeln!(w, "{header}")?;
        for (s, slots) in splits.iter().zip(&columns) {
            for (c, row) in s.centroids.iter_rows().enumerate() {
                write!(w, "{},{}", s.split.name, c)?;
                for slot in slots {
                    match slot {
                        Some(j) => write!(w, ",{:.6}", row[*j])?,
                        None => write!(w, ",")?,
                    }
                }
                writeln!(w)?;
            }
        }
        Ok(())
    })?;
    Ok(())
}

pub fn read_centroids(path: &Path) -> Result<Vec<SplitCentroids>> {
    let reader = BufReader::new(File::open(path)?);
    let skills: Vec<&str> = real_skills().collect();
    let mut out: Vec<(Split, Vec<Vec<f64>>)> = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = i + 1;
        if i == 0 {
            if line.trim_end() != centroids_header() {
                return Err(AnalyticsError::format(lineno, "unexpected centroids header"));
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() != skills.len() + 2 {
            return Err(AnalyticsError::format(lineno, format!("expected {} cells, got {}", skills.len() + 2, cells.len())));
        }
        let (name, clusterid) = (cells[0], parse_index(cells[1], lineno)?);

        let mut present = Vec::new();
        let mut values = Vec::new();
        for (skill, cell) in skills.iter().zip(&cells[2..]) {
            if cell.is_empty() {
                continue;
            }
            present.push(*skill);
            values.push(parse_float(cell, lineno)?);
        }

        match out.last_mut() {
            Some((split, rows)) if split.name == name => {
                if split.skills != present {
                    return Err(AnalyticsError::format(lineno, format!("split {name} changes its skill set")));
                }
                if clusterid != rows.len() {
                    return Err(AnalyticsError::format(lineno, format!("expected cluster {}, got {clusterid}", rows.len())));
                }
                rows.push(values);
            }
            _ => {
                if out.iter().any(|(s, _)| s.name == name) {
                    return Err(AnalyticsError::format(lineno, format!("split {name} is not contiguous")));
                }
                if clusterid != 0 || present.is_empty() {
                    return Err(AnalyticsError::format(lineno, format!("split {name} must start at cluster 0 with values")));
                }
                out.push((Split::new(name, &present), vec![values]));
            }
        }
    }

    Ok(out
        .into_iter()
        .map(|(split, rows)| SplitCentroids { split, centroids: Matrix::from_rows(&rows) })
        .collect())
}

/// Per-player cluster ids for every split, in stats-table row order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterAssignments {
    pub splits: Vec<String>,
    pub usernames: Vec<String>,
    /// `labels[s][row]`
    pub labels: Vec<Vec<u32>>,
}

impl ClusterAssignments {
    pub fn new(usernames: Vec<String>) -> Self {
        Self { usernames, ..Default::default() }
    }

    pub fn len(&self) -> usize {
        self.usernames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usernames.is_empty()
    }

    /// Add one split's labels; there must be one per player
    pub fn push_split(&mut self, name: impl Into<String>, labels: &[usize]) -> Result<()> {
        let name = name.into();
        if labels.len() != self.usernames.len() {
            return Err(AnalyticsError::shape(format!(
                "{} labels for split {name} but {} players",
                labels.len(),
                self.usernames.len()
            )));
        }
        let labels = labels
            .iter()
            .map(|&c| u32::try_from(c).map_err(|_| AnalyticsError::invalid_input(format!("cluster id {c} too large"))))
            .collect::<Result<Vec<_>>>()?;
        self.splits.push(name);
        self.labels.push(labels);
        Ok(())
    }

    pub fn split_labels(&self, name: &str) -> Option<Vec<usize>> {
        let s = self.splits.iter().position(|n| n == name)?;
        Some(self.labels[s].iter().map(|&c| c as usize).collect())
    }

    /// `(split, cluster id)` pairs of one player
    pub fn player_clusters(&self, row: usize) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.splits.iter().zip(&self.labels).map(move |(name, labels)| (name.as_str(), labels[row]))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        stage::write_atomically(path, |w| {
            writeln!(w, "player,{}", self.splits.join(","))?;
            for (row, username) in self.usernames.iter().enumerate() {
                write!(w, "{username}")?;
                for labels in &self.labels {
                    write!(w, ",{}", labels[row])?;
                }
                writeln!(w)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut out = Self::default();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let lineno = i + 1;
            if i == 0 {
                let mut cells = line.trim_end().split(',');
                if cells.next() != Some("player") {
                    return Err(AnalyticsError::format(lineno, "clusters header must start with `player`"));
                }
                out.splits = cells.map(str::to_string).collect();
                out.labels = vec![Vec::new(); out.splits.len()];
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split(',').collect();
            if cells.len() != out.splits.len() + 1 {
                return Err(AnalyticsError::format(lineno, format!("expected {} cells", out.splits.len() + 1)));
            }
            out.usernames.push(cells[0].to_string());
            for (labels, cell) in out.labels.iter_mut().zip(&cells[1..]) {
                labels.push(
                    cell.trim()
                        .parse()
                        .map_err(|e| AnalyticsError::format(lineno, format!("bad cluster id {cell:?}: {e}")))?,
                );
            }
        }
        Ok(out)
    }
}

pub fn write_xyz(path: &Path, projections: &[SplitProjection]) -> Result<()> {
    if let Some(p) = projections.iter().find(|p| p.xyz.cols() != N_COMPONENTS) {
        return Err(AnalyticsError::shape(format!("projection of {} has {} columns", p.split, p.xyz.cols())));
    }
    stage::write_atomically(path, |w| {
        writeln!(w, "split,clusterid,x,y,z")?;
        for p in projections {
            for (c, row) in p.xyz.iter_rows().enumerate() {
                writeln!(w, "{},{},{},{},{}", p.split, c, row[0], row[1], row[2])?;
            }
        }
        Ok(())
    })?;
    Ok(())
}

pub fn read_xyz(path: &Path) -> Result<Vec<SplitProjection>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out: Vec<(String, Vec<[f64; N_COMPONENTS]>)> = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = i + 1;
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() != 2 + N_COMPONENTS {
            return Err(AnalyticsError::format(lineno, format!("expected {} cells", 2 + N_COMPONENTS)));
        }
        let clusterid = parse_index(cells[1], lineno)?;
        let point = [parse_float(cells[2], lineno)?, parse_float(cells[3], lineno)?, parse_float(cells[4], lineno)?];

        match out.last_mut() {
            Some((name, rows)) if *name == cells[0] => {
                if clusterid != rows.len() {
                    return Err(AnalyticsError::format(lineno, format!("expected cluster {}", rows.len())));
                }
                rows.push(point);
            }
            _ => {
                if clusterid != 0 {
                    return Err(AnalyticsError::format(lineno, "a split must start at cluster 0"));
                }
                out.push((cells[0].to_string(), vec![point]));
            }
        }
    }
    Ok(out.into_iter().map(|(split, rows)| SplitProjection { split, xyz: Matrix::from_rows(&rows) }).collect())
}

fn parse_index(cell: &str, line: usize) -> Result<usize> {
    cell.trim().parse().map_err(|e| AnalyticsError::format(line, format!("bad cluster id {cell:?}: {e}")))
}

fn parse_float(cell: &str, line: usize) -> Result<f64> {
    cell.trim().parse().map_err(|e| AnalyticsError::format(line, format!("bad value {cell:?}: {e}")))
}
