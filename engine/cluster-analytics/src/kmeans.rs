//! # Weighted k-means
//!
//! Lloyd iterations over squared Euclidean distance where every row carries
//! a weight (the fraction of its skills that are ranked). Each redo starts
//! from a weighted k-means++ seeding drawn from its own seeded RNG, and the
//! lowest-inertia redo wins, so a fit is reproducible bit for bit.
//! Centroids come out sorted by descending component sum.

use player_stats::matrix::squared_distance;
use player_stats::Matrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::assign::nearest;
use crate::error::{AnalyticsError, Result};

/// Seed every fit starts from; redo `r` uses `DEFAULT_SEED + r`
pub const DEFAULT_SEED: u64 = 0;

/// Stand-in for an unranked level: the smallest valid level
pub const MISSING_LEVEL_SURROGATE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    pub k: usize,
    pub n_redos: usize,
    pub max_iter: usize,
    /// Convergence threshold relative to the mean per-feature variance
    pub tol: f64,
    pub seed: u64,
}

impl KMeansParams {
    pub fn new(k: usize) -> Self {
        Self { k, n_redos: 10, max_iter: 100, tol: 1e-4, seed: DEFAULT_SEED }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansModel {
    /// k × d, sorted by descending row sum
    pub centroids: Matrix,
    /// Weighted sum of squared distances to the nearest centroid
    pub inertia: f64,
    pub n_iter: usize,
}

/// Row weights: ranked (non-NaN) features over feature count
pub fn row_weights(x: &Matrix) -> Vec<f64> {
    let d = x.cols().max(1) as f64;
    x.iter_rows().map(|row| row.iter().filter(|v| !v.is_nan()).count() as f64 / d).collect()
}

/// Replace unranked (NaN) levels with the lowest valid level
pub fn impute_missing(x: &Matrix) -> Matrix {
    x.fill_nan(MISSING_LEVEL_SURROGATE)
}

/// Fit `params.k` centroids to `x` under row weights `weights`
pub fn fit(x: &Matrix, weights: &[f64], params: &KMeansParams) -> Result<KMeansModel> {
    if weights.len() != x.rows() {
        return Err(AnalyticsError::shape(format!("{} weights for {} rows", weights.len(), x.rows())));
    }
    if params.k == 0 || params.n_redos == 0 {
        return Err(AnalyticsError::invalid_input("k and the number of redos must be positive"));
    }
    if x.as_slice().iter().any(|v| !v.is_finite()) {
        return Err(AnalyticsError::invalid_input("features must be finite; impute missing levels first"));
    }
    let weighted_rows = weights.iter().filter(|&&w| w > 0.0).count();
    if weighted_rows < params.k {
        return Err(AnalyticsError::invalid_input(format!(
            "{} rows carry weight but k={}",
            weighted_rows, params.k
        )));
    }

    let tol = params.tol * mean_variance(x, weights);
    let mut best: Option<KMeansModel> = None;
    for redo in 0..params.n_redos {
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(redo as u64));
        let init = init_plus_plus(x, weights, params.k, &mut rng);
        let model = lloyd(x, weights, init, params.max_iter, tol);
        debug!("k-means redo {}: inertia {:.3} after {} iterations", redo, model.inertia, model.n_iter);
        if best.as_ref().map_or(true, |b| model.inertia < b.inertia) {
            best = Some(model);
        }
    }

    let mut model = best.ok_or_else(|| AnalyticsError::invalid_input("no k-means redo ran"))?;
    model.centroids = sort_by_sum_desc(&model.centroids);
    Ok(model)
}

/// Weighted mean of the per-feature variances
fn mean_variance(x: &Matrix, weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || x.cols() == 0 {
        return 0.0;
    }
    let mut mean = vec![0.0; x.cols()];
    for (row, &w) in x.iter_rows().zip(weights) {
        for (m, v) in mean.iter_mut().zip(row) {
            *m += w * v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= total);
    let mut var = 0.0;
    for (row, &w) in x.iter_rows().zip(weights) {
        var += w * row.iter().zip(&mean).map(|(v, m)| (v - m) * (v - m)).sum::<f64>();
    }
    var / total / x.cols() as f64
}

/// Pick a row with probability proportional to `scores`
fn sample_index(scores: &[f64], rng: &mut ChaCha8Rng) -> Option<usize> {
    let total: f64 = scores.iter().sum();
    if total.is_nan() || total <= 0.0 {
        return None;
    }
    let target = rng.gen::<f64>() * total;
    let mut acc = 0.0;
    let mut last_positive = None;
    for (i, &s) in scores.iter().enumerate() {
        if s > 0.0 {
            acc += s;
            last_positive = Some(i);
            if acc > target {
                return Some(i);
            }
        }
    }
    last_positive
}

/// Weighted k-means++: the first center is drawn by weight, each further
/// one by weight times squared distance to the nearest chosen center
fn init_plus_plus(x: &Matrix, weights: &[f64], k: usize, rng: &mut ChaCha8Rng) -> Matrix {
    let mut centroids = Matrix::zeros(k, x.cols());
    let mut min_d2 = vec![f64::INFINITY; x.rows()];

    for c in 0..k {
        let scores: Vec<f64> = if c == 0 {
            weights.to_vec()
        } else {
            weights.iter().zip(&min_d2).map(|(w, d)| w * d).collect()
        };
        // Only duplicates are left when every weighted row sits on a center
        let pick = sample_index(&scores, rng).or_else(|| sample_index(weights, rng)).unwrap_or(0);
        centroids.row_mut(c).copy_from_slice(x.row(pick));

        let center = centroids.row(c).to_vec();
        min_d2.par_iter_mut().enumerate().for_each(|(i, d)| {
            let dist = squared_distance(x.row(i), &center);
            if dist < *d {
                *d = dist;
            }
        });
    }
    centroids
}

fn lloyd(x: &Matrix, weights: &[f64], mut centroids: Matrix, max_iter: usize, tol: f64) -> KMeansModel {
    let (k, d) = centroids.shape();
    let mut n_iter = 0;

    for iter in 0..max_iter {
        n_iter = iter + 1;
        let labels: Vec<(usize, f64)> = (0..x.rows()).into_par_iter().map(|i| nearest(x.row(i), &centroids)).collect();

        let mut sums = Matrix::zeros(k, d);
        let mut mass = vec![0.0; k];
        for (i, &(c, _)) in labels.iter().enumerate() {
            let w = weights[i];
            if w <= 0.0 {
                continue;
            }
            mass[c] += w;
            for (s, v) in sums.row_mut(c).iter_mut().zip(x.row(i)) {
                *s += w * v;
            }
        }

        // Empty clusters are reseeded with the rows that cost the most
        let mut far = if mass.iter().any(|&m| m <= 0.0) {
            costliest_rows(&labels, weights).into_iter()
        } else {
            Vec::new().into_iter()
        };

        let mut shift = 0.0;
        for c in 0..k {
            let new_center: Vec<f64> = if mass[c] > 0.0 {
                sums.row(c).iter().map(|s| s / mass[c]).collect()
            } else {
                match far.next() {
                    Some(i) => x.row(i).to_vec(),
                    None => centroids.row(c).to_vec(),
                }
            };
            shift += squared_distance(centroids.row(c), &new_center);
            centroids.row_mut(c).copy_from_slice(&new_center);
        }

        if shift <= tol {
            break;
        }
    }

    let inertia: f64 = (0..x.rows())
        .into_par_iter()
        .map(|i| weights[i] * nearest(x.row(i), &centroids).1)
        .collect::<Vec<f64>>()
        .iter()
        .sum();
    KMeansModel { centroids, inertia, n_iter }
}

/// Weighted rows ordered by descending cost to their nearest centroid
fn costliest_rows(labels: &[(usize, f64)], weights: &[f64]) -> Vec<usize> {
    let mut costs: Vec<(usize, f64)> = labels
        .iter()
        .enumerate()
        .map(|(i, &(_, dist))| (i, weights[i] * dist))
        .filter(|&(_, cost)| cost > 0.0)
        .collect();
    costs.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    costs.into_iter().map(|(i, _)| i).collect()
}

/// Reorder centroid rows by descending component sum
pub fn sort_by_sum_desc(centroids: &Matrix) -> Matrix {
    let sums: Vec<f64> = centroids.iter_rows().map(|r| r.iter().sum()).collect();
    let mut order: Vec<usize> = (0..centroids.rows()).collect();
    order.sort_by(|&a, &b| sums[b].total_cmp(&sums[a]).then(a.cmp(&b)));
    centroids.select_rows(&order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(seed: u64) -> Matrix {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let centers = [[90.0, 90.0], [50.0, 10.0], [10.0, 60.0]];
        let rows: Vec<[f64; 2]> = (0..300)
            .map(|i| {
                let c = centers[i % 3];
                [c[0] + rng.gen_range(-3.0..3.0), c[1] + rng.gen_range(-3.0..3.0)]
            })
            .collect();
        Matrix::from_rows(&rows)
    }

    #[test]
    fn test_recovers_separated_blobs() {
        let x = blobs(7);
        let weights = vec![1.0; x.rows()];
        let model = fit(&x, &weights, &KMeansParams::new(3)).unwrap();
        assert_eq!(model.centroids.shape(), (3, 2));

        let sums: Vec<f64> = model.centroids.iter_rows().map(|r| r.iter().sum()).collect();
        assert!(sums.windows(2).all(|w| w[0] >= w[1]));
        assert!((model.centroids.get(0, 0) - 90.0).abs() < 2.0);
        assert!((model.centroids.get(1, 1) - 60.0).abs() < 2.0);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let x = blobs(11);
        let weights = row_weights(&x);
        let a = fit(&x, &weights, &KMeansParams::new(5)).unwrap();
        let b = fit(&x, &weights, &KMeansParams::new(5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_weight_rows_do_not_move_centroids() {
        let x = Matrix::from_rows(&[[0.0], [0.0], [10.0], [10.0], [1000.0]]);
        let weights = [1.0, 1.0, 1.0, 1.0, 0.0];
        let model = fit(&x, &weights, &KMeansParams::new(2)).unwrap();
        assert_eq!(model.centroids.row(0), &[10.0]);
        assert_eq!(model.centroids.row(1), &[0.0]);
    }

    #[test]
    fn test_weights_and_imputation() {
        let x = Matrix::from_rows(&[[f64::NAN, 50.0], [f64::NAN, f64::NAN], [20.0, 30.0]]);
        assert_eq!(row_weights(&x), vec![0.5, 0.0, 1.0]);
        assert_eq!(impute_missing(&x).row(1), &[1.0, 1.0]);
    }

    #[test]
    fn test_rejects_unusable_inputs() {
        let x = Matrix::from_rows(&[[1.0], [2.0]]);
        assert!(fit(&x, &[1.0, 1.0], &KMeansParams::new(3)).is_err());
        assert!(fit(&x, &[1.0], &KMeansParams::new(1)).is_err());
        let nan = Matrix::from_rows(&[[f64::NAN], [2.0]]);
        assert!(fit(&nan, &[1.0, 1.0], &KMeansParams::new(1)).is_err());
    }
}
