//! Configuration module for netexp-rs
//!
//! This module handles experiment configuration including:
//! - Experiment files (`.toml`) describing the board, timing and traffic
//! - Driver settings controlling the completion-polling protocol
//!
//! # Experiment File
//!
//! Every table and every key is optional; missing values take the defaults
//! below.
//!
//! ```toml
//! [experiment]
//! tick_period = 0.001     # seconds
//! warmup = 1.0            # seconds
//! duration = 1.0          # seconds
//! router_timeout = 512    # cycles, must be exactly representable
//!
//! [board]
//! width = 2
//! height = 2
//! cores_per_chip = 16
//!
//! [traffic]
//! pattern = "all_to_all"
//! probability = 0.1
//!
//! [driver]
//! poll_interval_ms = 100
//! poll_retries = 50
//! grace_period_ms = 2000
//! seed = 1234             # omit for fresh entropy every run
//! app_image = "app/netexp.aplx"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{NetExpError, Result};
use crate::experiment::{NetworkExperiment, TrafficPattern};
use crate::routing::DimensionOrderRouter;
use crate::topology::Topology;
use crate::traffic::Generator;
use crate::types::MAX_CORE_ID;

/// Experiment file extension
pub const EXPERIMENT_FILE_EXTENSION: &str = "toml";

/// Default pause between completion polls in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default number of polls before a running core is declared timed out
pub const DEFAULT_POLL_RETRIES: u32 = 50;

/// Default extra wait after warmup + duration in milliseconds
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2000;

// ==================== Driver Config ====================

/// Settings for the load/run/poll/collect protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Pause between completion polls of a running core
    pub poll_interval_ms: u64,

    /// Polls of a running core before it is declared timed out
    pub poll_retries: u32,

    /// Extra wait after warmup + duration before polling starts
    pub grace_period_ms: u64,

    /// Seed for the per-core generator seeds; `None` draws from entropy
    pub seed: Option<u64>,

    /// Executable image to load onto every chip
    pub app_image: Option<PathBuf>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_retries: DEFAULT_POLL_RETRIES,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            seed: None,
            app_image: None,
        }
    }
}

impl DriverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Use a fixed seed so runs are reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_poll(mut self, interval_ms: u64, retries: u32) -> Self {
        self.poll_interval_ms = interval_ms;
        self.poll_retries = retries;
        self
    }

    /// Read the configured executable image, or an empty image if none is set
    pub fn load_app_image(&self) -> Result<Vec<u8>> {
        match &self.app_image {
            Some(path) => std::fs::read(path).map_err(|e| {
                NetExpError::Config(format!("Failed to read app image {:?}: {}", path, e))
            }),
            None => Ok(Vec::new()),
        }
    }
}

// ==================== Experiment File ====================

/// Timing section of an experiment file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Tick length in seconds
    pub tick_period: f64,
    /// Warmup in seconds
    pub warmup: f64,
    /// Measured duration in seconds
    pub duration: f64,
    /// Router wait timeout in cycles
    pub router_timeout: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            tick_period: 0.001,
            warmup: 1.0,
            duration: 1.0,
            router_timeout: 512,
        }
    }
}

/// Board section of an experiment file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSettings {
    pub width: u32,
    pub height: u32,
    /// Application cores per chip, not counting the monitor
    pub cores_per_chip: u8,
}

impl BoardSettings {
    /// Reject boards whose cores could not all be addressed
    pub fn validate(&self) -> Result<()> {
        if self.cores_per_chip > MAX_CORE_ID {
            return Err(NetExpError::InvalidParameter(format!(
                "cores_per_chip {} is above the highest addressable core {}",
                self.cores_per_chip, MAX_CORE_ID
            )));
        }
        Ok(())
    }
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            width: 2,
            height: 2,
            cores_per_chip: 16,
        }
    }
}

/// Traffic section of an experiment file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficSettings {
    pub pattern: TrafficPattern,
    /// Bernoulli packet probability per tick for every source
    pub probability: f32,
}

impl Default for TrafficSettings {
    fn default() -> Self {
        Self {
            pattern: TrafficPattern::AllToAll,
            probability: 0.1,
        }
    }
}

/// A complete experiment description loaded from TOML
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentFile {
    pub experiment: TimingSettings,
    pub board: BoardSettings,
    pub traffic: TrafficSettings,
    pub driver: DriverConfig,
}

impl ExperimentFile {
    /// Parse an experiment from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| NetExpError::Config(format!("Failed to parse experiment: {}", e)))
    }

    /// Load an experiment file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            NetExpError::Config(format!("Failed to read experiment file {:?}: {}", path, e))
        })?;

        Self::from_toml(&content).map_err(|e| e.with_context(format!("{:?}", path)))
    }

    /// Save the experiment file to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                NetExpError::Config(format!("Failed to create experiment directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| NetExpError::Config(format!("Failed to serialize experiment: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            NetExpError::Config(format!("Failed to write experiment file {:?}: {}", path, e))
        })
    }

    /// Build the topology, apply the timing and compose the traffic pattern
    pub fn build(&self) -> Result<NetworkExperiment> {
        let board = &self.board;
        board.validate()?;
        let topology = Topology::rectangular(board.width, board.height, board.cores_per_chip);
        let mut experiment = NetworkExperiment::new(topology);

        let timing = &self.experiment;
        experiment.set_tick_period(timing.tick_period)?;
        experiment.set_warmup(timing.warmup)?;
        experiment.set_duration(timing.duration)?;
        experiment.set_router_timeout(timing.router_timeout)?;

        let generator = Generator::bernoulli(self.traffic.probability)?;
        experiment.add_pattern(self.traffic.pattern, generator, &[&DimensionOrderRouter])?;
        Ok(experiment)
    }
}
