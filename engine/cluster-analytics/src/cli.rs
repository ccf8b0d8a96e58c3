//! # Command Line Interface
//!
//! Argument structs and handlers for the five analytics stages. Each binary
//! parses its args, installs tracing and hands the handler's result to
//! [`stage::finish`]. A handler returns `NothingToDo` when its output is
//! newer than every input, unless `--force` is given.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use player_stats::stage::{self, StageOutcome};
use player_stats::{PipelineConfig, StatsTable};
use tracing::info;

use crate::artifact::{AppBundle, ClusterAnalytics, SplitAnalytics};
use crate::assign::{assign, cluster_sizes};
use crate::formats::{read_centroids, read_xyz, write_centroids, write_xyz, ClusterAssignments, SplitCentroids, SplitProjection};
use crate::kmeans::{self, KMeansParams};
use crate::quartiles::{cluster_quartiles, uniqueness};
use crate::umap::UmapProjector;

/// Fit weighted k-means centroids for every configured split
#[derive(Parser, Debug, Clone)]
#[command(name = "fit-clusters")]
pub struct FitArgs {
    /// Cleaned stats CSV
    #[arg(long)]
    pub stats_file: PathBuf,

    /// Centroids CSV to write
    #[arg(long)]
    pub out_file: PathBuf,

    /// Pipeline config (splits, kmeans_params, umap_params)
    #[arg(long)]
    pub params_file: Option<PathBuf>,

    /// Rebuild even when the output is up to date
    #[arg(long)]
    pub force: bool,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Assign every player to the nearest centroid of each split
#[derive(Parser, Debug, Clone)]
#[command(name = "assign-clusters")]
pub struct AssignArgs {
    #[arg(long)]
    pub stats_file: PathBuf,

    /// Centroids CSV written by `fit-clusters`
    #[arg(long)]
    pub centroids_file: PathBuf,

    /// Player-clusters CSV to write
    #[arg(long)]
    pub out_file: PathBuf,

    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Cluster sizes, quartiles and uniqueness per split
#[derive(Parser, Debug, Clone)]
#[command(name = "compute-quartiles")]
pub struct QuartilesArgs {
    #[arg(long)]
    pub stats_file: PathBuf,

    /// Player-clusters CSV written by `assign-clusters`
    #[arg(long)]
    pub clusters_file: PathBuf,

    /// Cluster analytics artifact to write
    #[arg(long)]
    pub out_file: PathBuf,

    #[arg(long)]
    pub params_file: Option<PathBuf>,

    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Project each split's centroids to 3D with UMAP
#[derive(Parser, Debug, Clone)]
#[command(name = "dim-reduce")]
pub struct DimReduceArgs {
    #[arg(long)]
    pub centroids_file: PathBuf,

    /// XYZ CSV to write
    #[arg(long)]
    pub out_file: PathBuf,

    #[arg(long)]
    pub params_file: Option<PathBuf>,

    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Bundle centroids, quartiles and projections for the front end
#[derive(Parser, Debug, Clone)]
#[command(name = "build-appdata")]
pub struct AppDataArgs {
    /// Centroids CSV
    #[arg(long)]
    pub centroids: PathBuf,

    /// Cluster analytics artifact
    #[arg(long)]
    pub quartiles: PathBuf,

    /// XYZ CSV
    #[arg(long)]
    pub xyz: PathBuf,

    /// App bundle to write
    #[arg(long)]
    pub out_file: PathBuf,

    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

fn is_fresh(force: bool, output: &Path, inputs: &[&Path], params: Option<&Path>) -> bool {
    let mut all: Vec<&Path> = inputs.to_vec();
    all.extend(params);
    !force && stage::is_up_to_date(output, &all)
}

fn load_config(params_file: Option<&Path>) -> Result<PipelineConfig> {
    PipelineConfig::load_or_default(params_file).with_context(|| match params_file {
        Some(path) => format!("load pipeline config {}", path.display()),
        None => "load default pipeline config".to_string(),
    })
}

fn load_table(path: &Path) -> Result<StatsTable> {
    StatsTable::load_cleaned(path).with_context(|| format!("load stats table {}", path.display()))
}

pub fn fit_clusters(args: &FitArgs) -> Result<StageOutcome> {
    if is_fresh(args.force, &args.out_file, &[&args.stats_file], args.params_file.as_deref()) {
        return Ok(StageOutcome::NothingToDo);
    }
    let config = load_config(args.params_file.as_deref())?;
    let table = load_table(&args.stats_file)?;

    let mut models = Vec::with_capacity(config.splits.len());
    for split in &config.splits {
        let k = config.k_for(&split.name)?;
        let features = table.feature_matrix(split)?;
        let weights = kmeans::row_weights(&features);
        let x = kmeans::impute_missing(&features);

        let model = kmeans::fit(&x, &weights, &KMeansParams::new(k))
            .with_context(|| format!("fit k-means for split {}", split.name))?;
        info!(
            "Split {}: {} centroids over {} skills, inertia {:.1}",
            split.name,
            k,
            split.len(),
            model.inertia
        );
        models.push(SplitCentroids { split: split.clone(), centroids: model.centroids });
    }

    write_centroids(&args.out_file, &models).with_context(|| format!("write {}", args.out_file.display()))?;
    info!("Wrote centroids for {} splits to {}", models.len(), args.out_file.display());
    Ok(StageOutcome::Completed)
}

pub fn assign_clusters(args: &AssignArgs) -> Result<StageOutcome> {
    if is_fresh(args.force, &args.out_file, &[&args.stats_file, &args.centroids_file], None) {
        return Ok(StageOutcome::NothingToDo);
    }
    let models = read_centroids(&args.centroids_file)
        .with_context(|| format!("read centroids {}", args.centroids_file.display()))?;
    let table = load_table(&args.stats_file)?;

    let mut assignments = ClusterAssignments::new(table.usernames().map(str::to_string).collect());
    for model in &models {
        let x = kmeans::impute_missing(&table.feature_matrix(&model.split)?);
        let labels = assign(&x, &model.centroids).with_context(|| format!("assign split {}", model.split.name))?;
        assignments.push_split(model.split.name.clone(), &labels)?;
        info!("Split {}: assigned {} players to {} clusters", model.split.name, labels.len(), model.k());
    }

    assignments.write(&args.out_file).with_context(|| format!("write {}", args.out_file.display()))?;
    Ok(StageOutcome::Completed)
}

pub fn compute_quartiles(args: &QuartilesArgs) -> Result<StageOutcome> {
    if is_fresh(
        args.force,
        &args.out_file,
        &[&args.stats_file, &args.clusters_file],
        args.params_file.as_deref(),
    ) {
        return Ok(StageOutcome::NothingToDo);
    }
    let config = load_config(args.params_file.as_deref())?;
    let table = load_table(&args.stats_file)?;
    let assignments = ClusterAssignments::read(&args.clusters_file)
        .with_context(|| format!("read clusters {}", args.clusters_file.display()))?;
    ensure!(
        assignments.usernames.iter().map(String::as_str).eq(table.usernames()),
        "{} does not list the players of {} in order",
        args.clusters_file.display(),
        args.stats_file.display()
    );

    let mut analytics = ClusterAnalytics::default();
    for split in &config.splits {
        let k = config.k_for(&split.name)?;
        let labels = assignments
            .split_labels(&split.name)
            .with_context(|| format!("{} has no column for split {}", args.clusters_file.display(), split.name))?;
        let reporting = table.split_dataset(split, true)?;
        let sizes = cluster_sizes(&labels, k)?;
        let quartiles = cluster_quartiles(&reporting, &labels, k)?;
        ensure!(sizes.iter().sum::<u64>() == table.len() as u64, "split {}: sizes do not cover every player", split.name);

        info!(
            "Split {}: {} clusters, largest {}, {} empty",
            split.name,
            k,
            sizes.iter().max().copied().unwrap_or(0),
            sizes.iter().filter(|&&s| s == 0).count()
        );
        analytics.splits.push(SplitAnalytics {
            split: split.clone(),
            uniqueness: uniqueness(&sizes),
            sizes,
            quartiles,
        });
    }

    analytics.write(&args.out_file).with_context(|| format!("write {}", args.out_file.display()))?;
    Ok(StageOutcome::Completed)
}

pub fn dim_reduce(args: &DimReduceArgs) -> Result<StageOutcome> {
    if is_fresh(args.force, &args.out_file, &[&args.centroids_file], args.params_file.as_deref()) {
        return Ok(StageOutcome::NothingToDo);
    }
    let config = load_config(args.params_file.as_deref())?;
    let models = read_centroids(&args.centroids_file)
        .with_context(|| format!("read centroids {}", args.centroids_file.display()))?;

    let mut projections = Vec::with_capacity(models.len());
    for model in &models {
        let params = config.umap_for(&model.split.name);
        let xyz = UmapProjector::new(params)
            .project(&model.centroids)
            .with_context(|| format!("project split {}", model.split.name))?;
        info!(
            "Split {}: projected {} centroids (n_neighbors={}, min_dist={})",
            model.split.name,
            xyz.rows(),
            params.n_neighbors,
            params.min_dist
        );
        projections.push(SplitProjection { split: model.split.name.clone(), xyz });
    }

    write_xyz(&args.out_file, &projections).with_context(|| format!("write {}", args.out_file.display()))?;
    Ok(StageOutcome::Completed)
}

pub fn build_appdata(args: &AppDataArgs) -> Result<StageOutcome> {
    if is_fresh(args.force, &args.out_file, &[&args.centroids, &args.quartiles, &args.xyz], None) {
        return Ok(StageOutcome::NothingToDo);
    }
    let centroids =
        read_centroids(&args.centroids).with_context(|| format!("read centroids {}", args.centroids.display()))?;
    let analytics = ClusterAnalytics::read(&args.quartiles)
        .with_context(|| format!("read cluster analytics {}", args.quartiles.display()))?;
    let projections = read_xyz(&args.xyz).with_context(|| format!("read projections {}", args.xyz.display()))?;

    let bundle = AppBundle::assemble(centroids, analytics, projections)?;
    bundle.write(&args.out_file).with_context(|| format!("write {}", args.out_file.display()))?;
    info!("Wrote app bundle to {}", args.out_file.display());
    Ok(StageOutcome::Completed)
}
