//! # Cluster statistics
//!
//! Per-cluster five-number summaries of the reporting skills (total first)
//! and the size-based uniqueness score. Unranked values are NaN and are
//! ignored; a cluster with no ranked value for a skill reports NaN.

use player_stats::Matrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

/// Percentiles reported per cluster and skill: min, quartiles, max
pub const PERCENTILES: [f64; 5] = [0.0, 25.0, 50.0, 75.0, 100.0];

/// Linear-interpolation percentile of an ascending, NaN-free slice
pub fn percentile_linear(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

/// `{min, p25, median, p75, max}` over the non-NaN values
pub fn five_number_summary(values: &mut Vec<f64>) -> [f64; 5] {
    values.retain(|v| !v.is_nan());
    values.sort_by(|a, b| a.total_cmp(b));
    PERCENTILES.map(|p| percentile_linear(values, p))
}

/// Dense `(k, 5, n_skills)` array of per-cluster percentiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quartiles {
    k: usize,
    n_skills: usize,
    data: Vec<f64>,
}

impl Quartiles {
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.k, PERCENTILES.len(), self.n_skills)
    }

    /// Percentile `p` (index into [`PERCENTILES`]) of skill `s` in cluster `c`
    pub fn get(&self, c: usize, p: usize, s: usize) -> f64 {
        self.data[(c * PERCENTILES.len() + p) * self.n_skills + s]
    }

    /// The `5 × n_skills` block of cluster `c`, percentile-major
    pub fn cluster(&self, c: usize) -> &[f64] {
        let block = PERCENTILES.len() * self.n_skills;
        &self.data[c * block..(c + 1) * block]
    }
}

/// Five-number summaries of every column of `reporting` per cluster
pub fn cluster_quartiles(reporting: &Matrix, assignments: &[usize], k: usize) -> Result<Quartiles> {
    if assignments.len() != reporting.rows() {
        return Err(AnalyticsError::shape(format!(
            "{} assignments for {} rows",
            assignments.len(),
            reporting.rows()
        )));
    }
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (row, &c) in assignments.iter().enumerate() {
        members
            .get_mut(c)
            .ok_or_else(|| AnalyticsError::invalid_input(format!("cluster id {c} out of range for k={k}")))?
            .push(row);
    }

    let n_skills = reporting.cols();
    let blocks: Vec<Vec<f64>> = members
        .par_iter()
        .map(|rows| {
            let mut block = vec![0.0; PERCENTILES.len() * n_skills];
            let mut column = Vec::with_capacity(rows.len());
            for s in 0..n_skills {
                column.clear();
                column.extend(rows.iter().map(|&r| reporting.get(r, s)));
                for (p, value) in five_number_summary(&mut column).into_iter().enumerate() {
                    block[p * n_skills + s] = value;
                }
            }
            block
        })
        .collect();

    Ok(Quartiles { k, n_skills, data: blocks.concat() })
}

/// Fraction of players in clusters at least as large as each cluster.
/// Equal-size clusters share a value; with no players every cluster scores 1.
pub fn uniqueness(sizes: &[u64]) -> Vec<f64> {
    let total: u64 = sizes.iter().sum();
    if total == 0 {
        return vec![1.0; sizes.len()];
    }

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]).then(a.cmp(&b)));

    let mut scores = vec![0.0; sizes.len()];
    let mut covered = 0u64;
    let mut i = 0;
    while i < order.len() {
        let size = sizes[order[i]];
        let group_end = order[i..].iter().position(|&c| sizes[c] != size).map_or(order.len(), |n| i + n);
        covered += size * (group_end - i) as u64;
        for &c in &order[i..group_end] {
            scores[c] = covered as f64 / total as f64;
        }
        i = group_end;
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAN: f64 = f64::NAN;

    #[test]
    fn test_percentile_linear() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_linear(&sorted, 0.0), 1.0);
        assert_eq!(percentile_linear(&sorted, 25.0), 1.75);
        assert_eq!(percentile_linear(&sorted, 50.0), 2.5);
        assert_eq!(percentile_linear(&sorted, 100.0), 4.0);
        assert_eq!(percentile_linear(&[7.0], 75.0), 7.0);
        assert!(percentile_linear(&[], 50.0).is_nan());
    }

    #[test]
    fn test_summary_ignores_nan() {
        let mut values = vec![NAN, 10.0, 30.0, NAN, 20.0];
        assert_eq!(five_number_summary(&mut values), [10.0, 15.0, 20.0, 25.0, 30.0]);
    }

    #[test]
    fn test_all_missing_skill_is_nan() {
        // Cluster 1 has no ranked value in column 1 (agility, say)
        let reporting = Matrix::from_rows(&[[1500.0, 60.0], [1400.0, NAN], [1300.0, NAN], [1000.0, 40.0]]);
        let q = cluster_quartiles(&reporting, &[0, 1, 1, 0], 3).unwrap();
        assert_eq!(q.shape(), (3, 5, 2));

        assert_eq!(q.get(0, 0, 0), 1000.0);
        assert_eq!(q.get(0, 4, 1), 60.0);
        assert_eq!(q.get(1, 2, 0), 1350.0);
        assert!((0..5).all(|p| q.get(1, p, 1).is_nan()));
        // Empty cluster: everything NaN
        assert!(q.cluster(2).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_quartiles_are_ordered() {
        let rows: Vec<[f64; 1]> = (0..50).map(|i| [((i * 37) % 101) as f64]).collect();
        let reporting = Matrix::from_rows(&rows);
        let assignments: Vec<usize> = (0..50).map(|i| i % 4).collect();
        let q = cluster_quartiles(&reporting, &assignments, 4).unwrap();
        for c in 0..4 {
            assert!((0..4).all(|p| q.get(c, p, 0) <= q.get(c, p + 1, 0)));
        }
    }

    #[test]
    fn test_uniqueness() {
        let u = uniqueness(&[5, 1, 3, 1]);
        assert_eq!(u, vec![0.5, 1.0, 0.8, 1.0]);
        assert!(u.iter().all(|&v| v > 0.0 && v <= 1.0));
        assert_eq!(uniqueness(&[0, 0]), vec![1.0, 1.0]);
        assert_eq!(uniqueness(&[4, 4]), vec![1.0, 1.0]);
    }
}
