//! # UMAP projection
//!
//! Projects a (small) centroid matrix to three dimensions:
//!
//! 1. exact k-nearest-neighbour graph under Euclidean distance
//! 2. per-row smooth kNN distances (`rho`, `sigma`) and fuzzy memberships
//! 3. fuzzy union of the directed graph into a symmetric one
//! 4. seeded uniform layout refined by single-threaded SGD with negative sampling
//!
//! Everything that draws randomness uses one `ChaCha8Rng` and edges are
//! visited in a fixed order, so the layout is bit-reproducible.

use std::collections::BTreeMap;

use player_stats::matrix::squared_distance;
use player_stats::{Matrix, UmapParams};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{AnalyticsError, Result};

/// Output dimensionality
pub const N_COMPONENTS: usize = 3;

/// Seed of every projection
pub const DEFAULT_SEED: u64 = 42;

/// Stand-in for NaN centroid entries
const NAN_SURROGATE: f64 = 1.0;

const SMOOTH_K_ITERATIONS: usize = 64;
const SMOOTH_K_TOLERANCE: f64 = 1e-5;
const MIN_K_DIST_SCALE: f64 = 1e-3;
const GRADIENT_CLIP: f64 = 4.0;
const INIT_SCALE: f64 = 10.0;

/// Projection settings; `params` comes from the pipeline config
#[derive(Debug, Clone, PartialEq)]
pub struct UmapProjector {
    pub n_neighbors: usize,
    pub min_dist: f64,
    pub spread: f64,
    pub n_epochs: usize,
    pub learning_rate: f64,
    pub negative_sample_rate: usize,
    pub repulsion_strength: f64,
    pub seed: u64,
}

impl UmapProjector {
    pub fn new(params: UmapParams) -> Self {
        Self {
            n_neighbors: params.n_neighbors,
            min_dist: params.min_dist,
            spread: 1.0,
            n_epochs: 500,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            repulsion_strength: 1.0,
            seed: DEFAULT_SEED,
        }
    }

    /// Embed the rows of `x` into `N_COMPONENTS` dimensions
    pub fn project(&self, x: &Matrix) -> Result<Matrix> {
        if self.n_neighbors < 2 {
            return Err(AnalyticsError::invalid_input(format!("n_neighbors must be >= 2, got {}", self.n_neighbors)));
        }
        if self.min_dist < 0.0 || self.min_dist > self.spread {
            return Err(AnalyticsError::invalid_input(format!(
                "min_dist {} outside [0, spread={}]",
                self.min_dist, self.spread
            )));
        }
        let x = x.fill_nan(NAN_SURROGATE);
        if x.as_slice().iter().any(|v| !v.is_finite()) {
            return Err(AnalyticsError::invalid_input("UMAP input must be finite"));
        }

        let n = x.rows();
        if n < 2 {
            return Ok(Matrix::zeros(n, N_COMPONENTS));
        }

        let n_knn = self.n_neighbors.min(n) - 1;
        let knn = nearest_neighbors(&x, n_knn);
        let graph = fuzzy_simplicial_set(&knn, n_knn);
        let (a, b) = find_ab_params(self.spread, self.min_dist);
        debug!("UMAP: {} points, {} neighbours, {} edges, a={:.4} b={:.4}", n, n_knn, graph.len(), a, b);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let init: Vec<f64> = (0..n * N_COMPONENTS).map(|_| rng.gen_range(-INIT_SCALE..INIT_SCALE)).collect();
        let mut embedding = Matrix::from_vec(n, N_COMPONENTS, init);

        self.optimize_layout(&mut embedding, &graph, a, b, &mut rng);
        Ok(embedding)
    }

    fn optimize_layout(
        &self,
        embedding: &mut Matrix,
        graph: &BTreeMap<(usize, usize), f64>,
        a: f64,
        b: f64,
        rng: &mut ChaCha8Rng,
    ) {
        let n = embedding.rows();
        let n_epochs = self.n_epochs as f64;
        let max_weight = graph.values().copied().fold(0.0, f64::max);
        if max_weight <= 0.0 {
            return;
        }

        // Both directions of every edge, dropping those too weak to be sampled
        let edges: Vec<(usize, usize, f64)> = graph
            .iter()
            .filter(|&(_, &w)| w >= max_weight / n_epochs)
            .flat_map(|(&(i, j), &w)| [(i, j, w), (j, i, w)])
            .collect();
        let epochs_per_sample: Vec<f64> = edges.iter().map(|&(_, _, w)| max_weight / w).collect();
        let neg_rate = self.negative_sample_rate as f64;
        let epochs_per_negative: Vec<f64> = epochs_per_sample.iter().map(|e| e / neg_rate).collect();
        let mut next_sample = epochs_per_sample.clone();
        let mut next_negative = epochs_per_negative.clone();

        let mut current = [0.0; N_COMPONENTS];
        let mut other = [0.0; N_COMPONENTS];
        for epoch in 0..self.n_epochs {
            let epoch_f = epoch as f64;
            let alpha = self.learning_rate * (1.0 - epoch_f / n_epochs);

            for (e, &(head, tail, _)) in edges.iter().enumerate() {
                if next_sample[e] > epoch_f {
                    continue;
                }

                current.copy_from_slice(embedding.row(head));
                other.copy_from_slice(embedding.row(tail));
                let dist_sq = squared_distance(&current, &other);
                let coeff = if dist_sq > 0.0 {
                    -2.0 * a * b * dist_sq.powf(b - 1.0) / (a * dist_sq.powf(b) + 1.0)
                } else {
                    0.0
                };
                for d in 0..N_COMPONENTS {
                    let grad = clip(coeff * (current[d] - other[d])) * alpha;
                    current[d] += grad;
                    other[d] -= grad;
                }
                embedding.row_mut(head).copy_from_slice(&current);
                embedding.row_mut(tail).copy_from_slice(&other);
                next_sample[e] += epochs_per_sample[e];

                let n_neg = ((epoch_f - next_negative[e]) / epochs_per_negative[e]).max(0.0) as usize;
                for _ in 0..n_neg {
                    let k = rng.gen_range(0..n);
                    if k == head {
                        continue;
                    }
                    other.copy_from_slice(embedding.row(k));
                    let dist_sq = squared_distance(&current, &other);
                    let coeff = if dist_sq > 0.0 {
                        2.0 * self.repulsion_strength * b / ((0.001 + dist_sq) * (a * dist_sq.powf(b) + 1.0))
                    } else {
                        0.0
                    };
                    for d in 0..N_COMPONENTS {
                        let grad = if coeff > 0.0 { clip(coeff * (current[d] - other[d])) } else { GRADIENT_CLIP };
                        current[d] += grad * alpha;
                    }
                }
                embedding.row_mut(head).copy_from_slice(&current);
                next_negative[e] += n_neg as f64 * epochs_per_negative[e];
            }
        }
    }
}

fn clip(v: f64) -> f64 {
    v.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

/// Per-coordinate `[min, max]` over the rows of a k × 3 projection
pub fn axis_limits(xyz: &Matrix) -> [[f64; 2]; N_COMPONENTS] {
    let mut limits = [[f64::INFINITY, f64::NEG_INFINITY]; N_COMPONENTS];
    for row in xyz.iter_rows() {
        for (lim, &v) in limits.iter_mut().zip(row) {
            lim[0] = lim[0].min(v);
            lim[1] = lim[1].max(v);
        }
    }
    if xyz.rows() == 0 {
        return [[0.0, 0.0]; N_COMPONENTS];
    }
    limits
}

/// The `k` nearest other rows of each row, ascending by (distance, index)
fn nearest_neighbors(x: &Matrix, k: usize) -> Vec<Vec<(usize, f64)>> {
    (0..x.rows())
        .into_par_iter()
        .map(|i| {
            let mut dists: Vec<(usize, f64)> = (0..x.rows())
                .filter(|&j| j != i)
                .map(|j| (j, squared_distance(x.row(i), x.row(j)).sqrt()))
                .collect();
            dists.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            dists.truncate(k);
            dists
        })
        .collect()
}

/// Local connectivity `rho` and bandwidth `sigma` of one row's neighbour
/// distances, chosen so the memberships sum to `log2(k + 1)`
fn smooth_knn_dist(dists: &[f64], k: usize, mean_all: f64) -> (f64, f64) {
    let target = ((k + 1) as f64).log2();
    let rho = dists.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);

    let (mut lo, mut hi, mut mid) = (0.0, f64::INFINITY, 1.0);
    for _ in 0..SMOOTH_K_ITERATIONS {
        let psum: f64 = dists.iter().map(|&d| membership(d, rho, mid)).sum();
        if (psum - target).abs() < SMOOTH_K_TOLERANCE {
            break;
        }
        if psum > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
        }
    }

    let floor = if rho > 0.0 {
        MIN_K_DIST_SCALE * dists.iter().sum::<f64>() / dists.len().max(1) as f64
    } else {
        MIN_K_DIST_SCALE * mean_all
    };
    (rho, mid.max(floor))
}

fn membership(d: f64, rho: f64, sigma: f64) -> f64 {
    let gap = d - rho;
    if gap <= 0.0 {
        1.0
    } else {
        (-gap / sigma).exp()
    }
}

/// Symmetric fuzzy graph keyed by `(i, j)` with `i < j`
fn fuzzy_simplicial_set(knn: &[Vec<(usize, f64)>], k: usize) -> BTreeMap<(usize, usize), f64> {
    let total: f64 = knn.iter().flatten().map(|&(_, d)| d).sum();
    let count = knn.iter().map(Vec::len).sum::<usize>().max(1);
    let mean_all = total / count as f64;

    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (i, neighbours) in knn.iter().enumerate() {
        let dists: Vec<f64> = neighbours.iter().map(|&(_, d)| d).collect();
        let (rho, sigma) = smooth_knn_dist(&dists, k, mean_all);
        for &(j, d) in neighbours {
            directed.insert((i, j), membership(d, rho, sigma));
        }
    }

    // Fuzzy union: w(i,j) + w(j,i) - w(i,j) * w(j,i)
    let mut graph = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let key = (i.min(j), i.max(j));
        if graph.contains_key(&key) {
            continue;
        }
        let back = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let union = w + back - w * back;
        if union > 0.0 {
            graph.insert(key, union);
        }
    }
    graph
}

/// Fit `a`, `b` of `1 / (1 + a x^(2b))` to the offset exponential target
/// curve by damped Gauss-Newton (Levenberg-Marquardt)
pub fn find_ab_params(spread: f64, min_dist: f64) -> (f64, f64) {
    let xs: Vec<f64> = (0..300).map(|i| 3.0 * spread * i as f64 / 299.0).collect();
    let ys: Vec<f64> =
        xs.iter().map(|&x| if x < min_dist { 1.0 } else { (-(x - min_dist) / spread).exp() }).collect();

    let cost = |a: f64, b: f64| -> f64 {
        xs.iter().zip(&ys).map(|(&x, &y)| (curve(x, a, b) - y).powi(2)).sum()
    };

    let (mut a, mut b) = (1.0, 1.0);
    let mut lambda = 1e-3;
    let mut current = cost(a, b);
    for _ in 0..200 {
        let (mut jtj, mut jtr) = ([[0.0; 2]; 2], [0.0; 2]);
        for (&x, &y) in xs.iter().zip(&ys) {
            if x <= 0.0 {
                continue;
            }
            let x2b = x.powf(2.0 * b);
            let denom = (1.0 + a * x2b).powi(2);
            let ja = -x2b / denom;
            let jb = -2.0 * a * x2b * x.ln() / denom;
            let r = curve(x, a, b) - y;
            jtj[0][0] += ja * ja;
            jtj[0][1] += ja * jb;
            jtj[1][1] += jb * jb;
            jtr[0] += ja * r;
            jtr[1] += jb * r;
        }
        jtj[1][0] = jtj[0][1];

        let m00 = jtj[0][0] * (1.0 + lambda);
        let m11 = jtj[1][1] * (1.0 + lambda);
        let det = m00 * m11 - jtj[0][1] * jtj[1][0];
        if det.abs() < f64::EPSILON {
            break;
        }
        let da = -(m11 * jtr[0] - jtj[0][1] * jtr[1]) / det;
        let db = -(m00 * jtr[1] - jtj[1][0] * jtr[0]) / det;

        let (na, nb) = (a + da, b + db);
        let next = if na > 0.0 && nb > 0.0 { cost(na, nb) } else { f64::INFINITY };
        if next < current {
            let improvement = current - next;
            a = na;
            b = nb;
            current = next;
            lambda = (lambda / 10.0).max(1e-12);
            if improvement < 1e-14 {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
        }
    }
    (a, b)
}

fn curve(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    1.0 / (1.0 + a * x.powf(2.0 * b))
}
