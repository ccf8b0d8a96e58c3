//! # Cluster Analytics
//!
//! Turns the cleaned stats table into per-split player clusters and the
//! statistics the front end renders.
//!
//! ## Architecture
//!
//! - **kmeans**: weighted k-means with seeded k-means++ redos; centroids sorted by descending sum
//! - **assign**: nearest-centroid assignment and cluster sizes
//! - **quartiles**: NaN-tolerant five-number summaries and the uniqueness score
//! - **umap**: seeded 3D projection of each split's centroids
//! - **formats**: centroids, player-clusters and xyz CSV files
//! - **artifact**: the binary cluster-analytics file and the app bundle
//! - **cli**: argument structs and handlers for the stage binaries

pub mod artifact;
pub mod assign;
pub mod cli;
pub mod error;
pub mod formats;
pub mod kmeans;
pub mod quartiles;
pub mod umap;

pub use artifact::{AppBundle, ClusterAnalytics, SplitAnalytics, SplitBundle};
pub use error::{AnalyticsError, Result};
pub use formats::{ClusterAssignments, SplitCentroids, SplitProjection};
pub use kmeans::{KMeansModel, KMeansParams};
pub use quartiles::Quartiles;
pub use umap::UmapProjector;
