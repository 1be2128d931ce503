//! Configuration management for corpus preparation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use clap::Parser;
use serde::{Deserialize, Serialize};
use crate::error::{FeatNormError, Result};
use crate::processing::{BuilderConfig, NamingConvention, NormalizationMode, SegmentationConfig};
use crate::storage::RetryPolicy;

const MAX_PAD_FRAMES: usize = 10_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub manifest_path: PathBuf,
    pub output_path: PathBuf,
    /// Where a training run left its statistics; defaults to the output store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics_path: Option<PathBuf>,
    pub segmentation: SegmentConfig,
    pub normalization: NormalizeConfig,
    pub io: IoConfig,
    pub cohorts: CohortConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub pad_frames: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    pub mode: NormalizationMode,
    pub training: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_dim: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub workers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CohortStrategy {
    /// Labels listed per speaker in the manifest
    Manifest,
    /// Label read from a fixed character of the speaker name
    NamingConvention,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortConfig {
    pub strategy: CohortStrategy,
    /// Character index used by the naming convention
    pub position: usize,
    /// Character → cohort label, e.g. `M = "male"`
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("manifest.toml"),
            output_path: PathBuf::from("output"),
            statistics_path: None,
            segmentation: SegmentConfig::default(),
            normalization: NormalizeConfig::default(),
            io: IoConfig::default(),
            cohorts: CohortConfig::default(),
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self { pad_frames: 0 }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            mode: NormalizationMode::Global,
            training: false,
            feature_dim: None,
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 100,
            workers: utils::recommended_workers(),
        }
    }
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            strategy: CohortStrategy::Manifest,
            position: 3,
            labels: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn pad_frames(&self) -> usize {
        self.segmentation.pad_frames
    }

    pub fn mode(&self) -> NormalizationMode {
        self.normalization.mode
    }

    pub fn training(&self) -> bool {
        self.normalization.training
    }

    pub fn workers(&self) -> usize {
        self.io.workers
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.io.max_retries, self.io.retry_delay_ms)
    }

    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            mode: self.mode(),
            training: self.training(),
            segmentation: SegmentationConfig { pad_frames: self.pad_frames() },
            feature_dim: self.normalization.feature_dim,
            retry: self.retry_policy(),
            workers: self.workers(),
        }
    }

    /// Naming-convention resolver, when that strategy is configured
    pub fn naming_convention(&self) -> Result<Option<NamingConvention>> {
        if self.cohorts.strategy != CohortStrategy::NamingConvention {
            return Ok(None);
        }
        let mut labels = BTreeMap::new();
        for (key, label) in &self.cohorts.labels {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => {
                    labels.insert(c, label.clone());
                }
                _ => return Err(FeatNormError::config(format!(
                    "Cohort label key must be a single character: {:?}", key
                ))),
            }
        }
        Ok(Some(NamingConvention::new(self.cohorts.position, labels)))
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "featnorm", about = "Utterance segmentation and feature normalization", version, author)]
pub struct Args {
    #[arg(short = 'm', long = "manifest", help = "Corpus manifest (TOML)")]
    pub manifest: Option<PathBuf>,

    #[arg(short = 'o', long = "output", help = "Output directory")]
    pub output: Option<PathBuf>,

    #[arg(short = 's', long = "statistics", help = "Directory holding training statistics")]
    pub statistics: Option<PathBuf>,

    #[arg(short = 'n', long = "mode", value_enum, help = "Normalization scope")]
    pub mode: Option<NormalizationMode>,

    #[arg(short = 't', long = "training", help = "Compute and persist cohort statistics")]
    pub training: bool,

    #[arg(short = 'p', long = "pad-frames", help = "Frames of padding on each side of an utterance")]
    pub pad_frames: Option<usize>,

    #[arg(long = "feature-dim", help = "Expected feature dimension")]
    pub feature_dim: Option<usize>,

    #[arg(short = 'w', long = "workers", help = "Worker thread count")]
    pub workers: Option<usize>,

    #[arg(long = "max-retries", help = "Retry count for transient I/O failures")]
    pub max_retries: Option<u32>,

    #[arg(short = 'c', long = "config", help = "Config file path (TOML format)")]
    pub config_file: Option<PathBuf>,

    #[arg(long = "write-default-config", help = "Write a default config file and exit")]
    pub write_default_config: Option<PathBuf>,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose output mode")]
    pub verbose: bool,
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args() -> Result<Self> {
        let args = Args::parse();
        Self::from_args_and_config(args)
    }

    /// Create config from command line arguments and config file
    pub fn from_args_and_config(args: Args) -> Result<Self> {
        let mut config = if let Some(config_path) = &args.config_file {
            Self::from_file(config_path)?
        } else {
            Self::default()
        };

        // Command line arguments override config file settings
        if let Some(manifest) = args.manifest {
            config.manifest_path = manifest;
        }
        if let Some(output) = args.output {
            config.output_path = output;
        }
        if args.statistics.is_some() {
            config.statistics_path = args.statistics;
        }
        if let Some(mode) = args.mode {
            config.normalization.mode = mode;
        }
        if args.training {
            config.normalization.training = true;
        }
        if let Some(pad_frames) = args.pad_frames {
            config.segmentation.pad_frames = pad_frames;
        }
        if args.feature_dim.is_some() {
            config.normalization.feature_dim = args.feature_dim;
        }
        if let Some(workers) = args.workers {
            config.io.workers = workers;
        }
        if let Some(max_retries) = args.max_retries {
            config.io.max_retries = max_retries;
        }

        config.validate()?;

        Ok(config)
    }

    /// Load config from TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FeatNormError::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| FeatNormError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Validate configuration parameter validity
    pub fn validate(&self) -> Result<()> {
        if self.segmentation.pad_frames > MAX_PAD_FRAMES {
            return Err(FeatNormError::config(format!("Padding cannot exceed {} frames", MAX_PAD_FRAMES)));
        }

        if self.normalization.feature_dim == Some(0) {
            return Err(FeatNormError::config("Feature dimension must be greater than 0"));
        }

        if self.io.max_retries > 10 {
            return Err(FeatNormError::config("Max retries cannot exceed 10"));
        }

        if self.io.workers == 0 {
            return Err(FeatNormError::config("Worker count must be greater than 0"));
        }
        if self.io.workers > num_cpus::get() * 2 {
            return Err(FeatNormError::config("Worker count cannot exceed 2x logical CPU cores"));
        }

        if self.cohorts.strategy == CohortStrategy::NamingConvention && self.cohorts.labels.is_empty() {
            return Err(FeatNormError::config("Naming-convention cohorts need at least one label"));
        }
        self.naming_convention()?;

        Ok(())
    }

    /// Save config to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FeatNormError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| FeatNormError::config(format!("Failed to write config file: {}", e)))
    }

    /// Create default config file
    pub fn create_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let default_config = Self::default();
        default_config.save_to_file(path)
    }
}

pub mod utils {
    pub fn cpu_count() -> usize {
        num_cpus::get()
    }

    pub fn recommended_workers() -> usize {
        cpu_count().clamp(1, 4)
    }
}
