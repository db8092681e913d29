//! Configuration management and validation.
//!
//! Settings are layered: built-in defaults, then an optional YAML file,
//! then `RADAR_COMPOSITOR_*` environment variables, and finally command-line
//! flags applied by the CLI.

use crate::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CENTER_ID, DEFAULT_QC_WORKERS, DEFAULT_THRESHOLD_DBZ,
};
use crate::io::ObjectStoreConfig;
use crate::quality::DetectorSelection;
use crate::tiling::{PrestageMode, TilingOptions};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variables read by [`CompositorConfig::apply_env`]
pub mod env {
    pub const TILE_WORKERS: &str = "RADAR_COMPOSITOR_TILE_WORKERS";
    pub const QC_WORKERS: &str = "RADAR_COMPOSITOR_QC_WORKERS";
    pub const SCRATCH_DIR: &str = "RADAR_COMPOSITOR_SCRATCH_DIR";
    pub const REGISTRY: &str = "RADAR_COMPOSITOR_REGISTRY";
}

/// System profiling information for sizing worker pools
#[derive(Debug, Clone)]
pub struct SystemProfile {
    /// Number of logical CPU cores available
    pub cpu_cores: usize,
    /// Physical cores
    pub performance_cores: usize,
}

impl SystemProfile {
    /// Auto-detect system capabilities
    pub fn detect() -> Self {
        Self {
            cpu_cores: num_cpus::get(),
            performance_cores: num_cpus::get_physical(),
        }
    }
}

/// Process-wide settings of the compositor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Upper bound on tile workers; unset leaves only the core count
    pub tile_workers: Option<usize>,

    /// Upper bound on quality-control pre-stage workers
    pub qc_workers: usize,

    /// Quality control inputs before tiling
    pub preprocess_qc: bool,

    /// Spread the pre-stage over a worker pool
    pub mp_process_qc: bool,

    /// Give each pre-stage worker an even slice of the inputs
    pub mp_process_qc_split_evenly: bool,

    /// Root under which per-request scratch directories are created
    pub scratch_dir: Option<PathBuf>,

    /// Area registry file (YAML)
    pub registry: Option<PathBuf>,

    /// Originating centre written into composite sources
    pub center_id: String,

    /// Threshold of the built-in threshold detector (dBZ)
    pub detector_threshold: f64,

    /// Capacity of the per-task object cache, 0 reads straight from disk
    pub cache_capacity: usize,

    /// Per-radar detectors for configured quality control runs
    pub detector_selection: DetectorSelection,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            tile_workers: None,
            qc_workers: DEFAULT_QC_WORKERS,
            preprocess_qc: false,
            mp_process_qc: false,
            mp_process_qc_split_evenly: false,
            scratch_dir: None,
            registry: None,
            center_id: DEFAULT_CENTER_ID.to_string(),
            detector_threshold: DEFAULT_THRESHOLD_DBZ,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            detector_selection: DetectorSelection::default(),
        }
    }
}

impl CompositorConfig {
    /// Default location of the configuration file
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("radar-compositor").join("config.yaml"))
            .ok_or_else(|| Error::configuration("Could not determine user config directory"))
    }

    /// Read a configuration file; unspecified keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("Failed to read config {}", path.display()), e))?;
        let config: Self = serde_yaml::from_str(&contents).map_err(|source| Error::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Defaults, then `config_file` (or the default file when present), then
    /// the environment
    pub fn load_layered(config_file: Option<&Path>) -> Result<Self> {
        let default_path = Self::default_config_path().ok();
        let path = match config_file {
            Some(path) => Some(path),
            None => default_path.as_deref().filter(|p| p.exists()),
        };

        let mut config = match path {
            Some(path) => {
                info!("Using config file: {}", path.display());
                Self::load(path)?
            }
            None => {
                info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RADAR_COMPOSITOR_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(env::TILE_WORKERS) {
            self.tile_workers = Some(parse_count(env::TILE_WORKERS, &value)?);
        }
        if let Some(value) = lookup(env::QC_WORKERS) {
            self.qc_workers = parse_count(env::QC_WORKERS, &value)?;
        }
        if let Some(value) = lookup(env::SCRATCH_DIR).filter(|v| !v.trim().is_empty()) {
            self.scratch_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(env::REGISTRY).filter(|v| !v.trim().is_empty()) {
            self.registry = Some(PathBuf::from(value));
        }
        Ok(())
    }

    pub fn with_tile_workers(mut self, workers: usize) -> Self {
        self.tile_workers = Some(workers);
        self
    }

    pub fn with_qc_workers(mut self, workers: usize) -> Self {
        self.qc_workers = workers;
        self
    }

    /// Enable the quality-control pre-stage, pooled or in the coordinator
    pub fn with_prestage(mut self, pooled: bool, split_evenly: bool) -> Self {
        self.preprocess_qc = true;
        self.mp_process_qc = pooled;
        self.mp_process_qc_split_evenly = split_evenly;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_registry(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry = Some(path.into());
        self
    }

    pub fn with_detector_selection(mut self, selection: DetectorSelection) -> Self {
        self.detector_selection = selection;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_workers == Some(0) {
            return Err(Error::configuration("tile_workers must be > 0"));
        }
        if self.qc_workers == 0 {
            return Err(Error::configuration("qc_workers must be > 0"));
        }
        if self.center_id.trim().is_empty() {
            return Err(Error::configuration("center_id must not be empty"));
        }
        Ok(())
    }

    pub fn prestage_mode(&self) -> PrestageMode {
        PrestageMode::from_flags(
            self.preprocess_qc,
            self.mp_process_qc,
            self.qc_workers,
            self.mp_process_qc_split_evenly,
        )
    }

    pub fn object_store(&self) -> ObjectStoreConfig {
        match self.cache_capacity {
            0 => ObjectStoreConfig::Direct,
            capacity => ObjectStoreConfig::Cached { capacity },
        }
    }

    /// Tiling options for a machine described by `profile`
    pub fn tiling_options(&self, profile: &SystemProfile) -> TilingOptions {
        let mut options = TilingOptions::default()
            .with_prestage(self.prestage_mode())
            .with_cores(profile.cpu_cores);
        if let Some(workers) = self.tile_workers {
            options = options.with_tile_workers(workers);
        }
        if let Some(dir) = &self.scratch_dir {
            options = options.with_scratch_root(dir);
        }
        options
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::configuration(format!("{} must be a positive integer, got '{}'", key, value)))
}
