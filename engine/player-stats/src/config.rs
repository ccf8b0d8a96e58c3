//! # Pipeline configuration
//!
//! Splits, k-means cluster counts and UMAP parameters, loaded from a single
//! JSON document. Every section is optional and falls back to the defaults
//! below.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatsError};
use crate::skills::{self, TOTAL};

/// A named subset of skills used as the feature space for one clustering run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub name: String,
    /// Real skill names (never `total`), in canonical order
    pub skills: Vec<String>,
}

impl Split {
    pub fn new(name: impl Into<String>, skills: &[&str]) -> Self {
        Self { name: name.into(), skills: skills.iter().map(|s| s.to_string()).collect() }
    }

    /// Reorder the skills canonically; unknown names sort last
    pub fn canonicalize(&mut self) {
        self.skills.sort_by_key(|s| skills::skill_index(s).unwrap_or(usize::MAX));
    }

    /// Number of clustering features
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Positions of the split's skills in [`skills::SKILLS`]
    pub fn skill_indices(&self) -> Result<Vec<usize>> {
        self.skills
            .iter()
            .map(|s| skills::skill_index(s).ok_or_else(|| StatsError::UnknownSkill(s.clone())))
            .collect()
    }

    /// Whether the split contains `skill`
    pub fn contains(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s == skill)
    }
}

/// The three canonical splits: `all`, `cb` (combat) and `noncb`
pub fn canonical_splits() -> Vec<Split> {
    let all: Vec<&str> = skills::real_skills().collect();
    let cb: Vec<&str> = skills::real_skills().filter(|s| skills::is_combat(s)).collect();
    let noncb: Vec<&str> = skills::real_skills().filter(|s| !skills::is_combat(s)).collect();
    vec![Split::new("all", &all), Split::new("cb", &cb), Split::new("noncb", &noncb)]
}

/// UMAP hyper-parameters for one split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UmapParams {
    pub n_neighbors: usize,
    pub min_dist: f64,
}

impl Default for UmapParams {
    fn default() -> Self {
        Self { n_neighbors: 5, min_dist: 0.25 }
    }
}

/// Configuration shared by the analytics stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ordered split definitions
    pub splits: Vec<Split>,
    /// Split name -> number of clusters
    pub kmeans_params: BTreeMap<String, usize>,
    /// Split name -> UMAP parameters
    pub umap_params: BTreeMap<String, UmapParams>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let kmeans_params =
            [("all", 2000usize), ("cb", 500), ("noncb", 2000)].map(|(n, k)| (n.to_string(), k)).into();
        let umap_params = ["all", "cb", "noncb"]
            .map(|n| (n.to_string(), UmapParams::default()))
            .into();
        Self { splits: canonical_splits(), kmeans_params, umap_params }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: PipelineConfig = serde_json::from_str(&raw)?;
        for split in &mut config.splits {
            split.canonicalize();
        }
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, otherwise the built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.splits.is_empty() {
            return Err(StatsError::config("at least one split is required"));
        }

        let mut names = HashSet::new();
        for split in &self.splits {
            if !names.insert(split.name.as_str()) {
                return Err(StatsError::config(format!("duplicate split name {:?}", split.name)));
            }
            if split.is_empty() {
                return Err(StatsError::config(format!("split {:?} has no skills", split.name)));
            }
            if split.contains(skills::SKILLS[TOTAL]) {
                return Err(StatsError::config(format!(
                    "split {:?} lists total as a feature; total is reporting-only",
                    split.name
                )));
            }
            let indices = split.skill_indices()?;
            let unique: HashSet<_> = indices.iter().collect();
            if unique.len() != indices.len() {
                return Err(StatsError::config(format!("split {:?} repeats a skill", split.name)));
            }
            match self.kmeans_params.get(&split.name) {
                Some(0) => {
                    return Err(StatsError::config(format!("k for split {:?} must be > 0", split.name)))
                }
                Some(_) => {}
                None => {
                    return Err(StatsError::config(format!("no kmeans_params entry for {:?}", split.name)))
                }
            }
            let umap = self.umap_for(&split.name);
            if umap.n_neighbors < 2 || umap.min_dist < 0.0 {
                return Err(StatsError::config(format!("bad umap_params for {:?}", split.name)));
            }
        }
        Ok(())
    }

    pub fn split(&self, name: &str) -> Option<&Split> {
        self.splits.iter().find(|s| s.name == name)
    }

    /// Number of clusters configured for `split`
    pub fn k_for(&self, split: &str) -> Result<usize> {
        self.kmeans_params
            .get(split)
            .copied()
            .ok_or_else(|| StatsError::config(format!("no kmeans_params entry for {split:?}")))
    }

    /// UMAP parameters for `split`, defaults when the section omits it
    pub fn umap_for(&self, split: &str) -> UmapParams {
        self.umap_params.get(split).copied().unwrap_or_default()
    }
}
