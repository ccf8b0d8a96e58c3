//! Nearest-centroid assignment and cluster sizes.

use player_stats::matrix::squared_distance;
use player_stats::Matrix;
use rayon::prelude::*;

use crate::error::{AnalyticsError, Result};

/// Index of the centroid nearest to `row` and its squared distance; ties go
/// to the lowest index
pub fn nearest(row: &[f64], centroids: &Matrix) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.iter_rows().enumerate() {
        let d = squared_distance(row, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// Nearest centroid for every row of `x`
pub fn assign(x: &Matrix, centroids: &Matrix) -> Result<Vec<usize>> {
    if centroids.rows() == 0 {
        return Err(AnalyticsError::invalid_input("no centroids to assign to"));
    }
    if x.cols() != centroids.cols() {
        return Err(AnalyticsError::shape(format!(
            "features have {} columns but centroids have {}",
            x.cols(),
            centroids.cols()
        )));
    }
    Ok((0..x.rows()).into_par_iter().map(|i| nearest(x.row(i), centroids).0).collect())
}

/// Members per cluster; always `k` long, zeros for empty clusters
pub fn cluster_sizes(assignments: &[usize], k: usize) -> Result<Vec<u64>> {
    let mut sizes = vec![0u64; k];
    for &c in assignments {
        match sizes.get_mut(c) {
            Some(size) => *size += 1,
            None => return Err(AnalyticsError::invalid_input(format!("cluster id {c} out of range for k={k}"))),
        }
    }
    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_nearest() {
        let centroids = Matrix::from_rows(&[[10.0, 10.0], [0.0, 0.0]]);
        let x = Matrix::from_rows(&[[1.0, 1.0], [9.0, 8.0], [6.0, 6.0]]);
        assert_eq!(assign(&x, &centroids).unwrap(), vec![1, 0, 0]);
    }

    #[test]
    fn test_ties_go_to_lowest_index() {
        let centroids = Matrix::from_rows(&[[2.0], [0.0], [2.0]]);
        let x = Matrix::from_rows(&[[1.0], [2.0]]);
        assert_eq!(assign(&x, &centroids).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let centroids = Matrix::from_rows(&[[1.0, 2.0]]);
        let x = Matrix::from_rows(&[[1.0]]);
        assert!(matches!(assign(&x, &centroids), Err(AnalyticsError::Shape(_))));
    }

    #[test]
    fn test_sizes_include_empty_clusters() {
        let sizes = cluster_sizes(&[0, 2, 2, 0, 2], 4).unwrap();
        assert_eq!(sizes, vec![2, 0, 3, 0]);
        assert_eq!(sizes.iter().sum::<u64>(), 5);
        assert!(cluster_sizes(&[4], 4).is_err());
    }
}
