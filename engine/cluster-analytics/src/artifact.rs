//! # Binary artifacts
//!
//! The cluster analytics file (compute-quartiles output) and the app bundle
//! (build-appdata output) share one container: an 8-byte magic, a
//! little-endian `u32` format version, then the gzip-compressed bincode
//! body. NaN values survive the round trip.

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use player_stats::{stage, Matrix, Split};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AnalyticsError, Result};
use crate::formats::{SplitCentroids, SplitProjection};
use crate::quartiles::Quartiles;
use crate::umap::{axis_limits, N_COMPONENTS};

/// Container format version
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 12;

fn write_artifact<T: Serialize>(path: &Path, magic: &[u8; 8], value: &T) -> Result<()> {
    let body = bincode::serialize(value)?;
    stage::write_atomically(path, |w| {
        w.write_all(magic)?;
        w.write_all(&FORMAT_VERSION.to_le_bytes())?;
        let mut encoder = GzEncoder::new(&mut *w, Compression::default());
        encoder.write_all(&body)?;
        encoder.finish()?;
        Ok(())
    })?;
    Ok(())
}

fn read_artifact<T: DeserializeOwned>(path: &Path, magic: &[u8; 8]) -> Result<T> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < HEADER_LEN || &bytes[..8] != magic {
        return Err(AnalyticsError::corruption(format!("{} is not a {} artifact", path.display(), describe(magic))));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[8..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(AnalyticsError::corruption(format!(
            "{} has format version {version}, expected {FORMAT_VERSION}",
            path.display()
        )));
    }

    let mut body = Vec::new();
    GzDecoder::new(&bytes[HEADER_LEN..])
        .read_to_end(&mut body)
        .map_err(|e| AnalyticsError::corruption(format!("{}: {e}", path.display())))?;
    Ok(bincode::deserialize(&body)?)
}

fn describe(magic: &[u8; 8]) -> String {
    String::from_utf8_lossy(magic).into_owned()
}

/// Statistics of one split's clusters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitAnalytics {
    pub split: Split,
    pub sizes: Vec<u64>,
    /// `(k, 5, 1 + split.len())`, `total` first
    pub quartiles: Quartiles,
    pub uniqueness: Vec<f64>,
}

impl SplitAnalytics {
    pub fn k(&self) -> usize {
        self.sizes.len()
    }

    pub fn n_players(&self) -> u64 {
        self.sizes.iter().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterAnalytics {
    pub splits: Vec<SplitAnalytics>,
}

impl ClusterAnalytics {
    const MAGIC: &'static [u8; 8] = b"HSQUARTS";

    pub fn split(&self, name: &str) -> Option<&SplitAnalytics> {
        self.splits.iter().find(|s| s.split.name == name)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_artifact(path, Self::MAGIC, self)
    }

    pub fn read(path: &Path) -> Result<Self> {
        read_artifact(path, Self::MAGIC)
    }
}

/// Everything the front end needs for one split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitBundle {
    pub name: String,
    /// Clustering skills; quartiles additionally lead with `total`
    pub skills: Vec<String>,
    pub centroids: Matrix,
    pub quartiles: Quartiles,
    pub sizes: Vec<u64>,
    pub uniqueness: Vec<f64>,
    pub xyz: Matrix,
    pub axis_limits: [[f64; 2]; N_COMPONENTS],
}

/// Split name → bundle, in pipeline split order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppBundle {
    pub splits: Vec<SplitBundle>,
}

impl AppBundle {
    const MAGIC: &'static [u8; 8] = b"HSAPPBND";

    /// Join the per-split outputs of the earlier stages, checking that
    /// every piece agrees on the split's skills and cluster count
    pub fn assemble(
        centroids: Vec<SplitCentroids>,
        analytics: ClusterAnalytics,
        projections: Vec<SplitProjection>,
    ) -> Result<Self> {
        let mut splits = Vec::with_capacity(centroids.len());
        for SplitCentroids { split, centroids } in centroids {
            let name = split.name.clone();
            let stats = analytics
                .split(&name)
                .ok_or_else(|| AnalyticsError::invalid_input(format!("no quartiles for split {name}")))?;
            let projection = projections
                .iter()
                .find(|p| p.split == name)
                .ok_or_else(|| AnalyticsError::invalid_input(format!("no projection for split {name}")))?;

            if stats.split.skills != split.skills {
                return Err(AnalyticsError::shape(format!("split {name}: quartile skills differ from centroid skills")));
            }
            let k = centroids.rows();
            let (qk, _, qs) = stats.quartiles.shape();
            if stats.k() != k || stats.uniqueness.len() != k || qk != k || projection.xyz.rows() != k {
                return Err(AnalyticsError::shape(format!(
                    "split {name}: {k} centroids, {} sizes, {qk} quartile blocks, {} projected points",
                    stats.k(),
                    projection.xyz.rows()
                )));
            }
            if qs != split.len() + 1 {
                return Err(AnalyticsError::shape(format!("split {name}: {qs} quartile columns for {} skills", split.len())));
            }

            splits.push(SplitBundle {
                name,
                skills: split.skills,
                centroids,
                quartiles: stats.quartiles.clone(),
                sizes: stats.sizes.clone(),
                uniqueness: stats.uniqueness.clone(),
                axis_limits: axis_limits(&projection.xyz),
                xyz: projection.xyz.clone(),
            });
        }
        info!("Assembled app bundle with {} splits", splits.len());
        Ok(Self { splits })
    }

    pub fn split(&self, name: &str) -> Option<&SplitBundle> {
        self.splits.iter().find(|s| s.name == name)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_artifact(path, Self::MAGIC, self)
    }

    pub fn read(path: &Path) -> Result<Self> {
        read_artifact(path, Self::MAGIC)
    }
}
