//! Configuration of the replay memory.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of prioritized sampling.
///
/// Sampling probability of slot `i` is `p_i^alpha / sum_j p_j^alpha`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerConfig {
    /// Exponent applied to priorities. `0` gives uniform sampling.
    pub alpha: f32,

    /// Lower bound of a priority written by
    /// [`ReplayMemory::update_priorities`](super::ReplayMemory::update_priorities).
    pub floor: f32,

    /// Priority of the first inserted transition. Later insertions take the
    /// current maximum priority.
    pub default_priority: f32,
}

impl Default for PerConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            floor: 1e-6,
            default_priority: 1.0,
        }
    }
}

impl PerConfig {
    /// Sets the priority exponent.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the priority floor.
    pub fn floor(mut self, floor: f32) -> Self {
        self.floor = floor;
        self
    }

    /// Sets the priority given to transitions inserted into an empty memory.
    pub fn default_priority(mut self, default_priority: f32) -> Self {
        self.default_priority = default_priority;
        self
    }
}

/// Configuration of [`ReplayMemory`](super::ReplayMemory).
///
/// ```rust
/// use rlroute_core::replay_buffer::{PerConfig, ReplayMemoryConfig};
///
/// let config = ReplayMemoryConfig::default()
///     .capacity(10000)
///     .seed(42)
///     .per_config(Some(PerConfig::default()));
/// assert_eq!(config.capacity, 10000);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ReplayMemoryConfig {
    /// Maximum number of stored transitions.
    pub capacity: usize,

    /// Seed of the sampling RNG.
    pub seed: u64,

    /// Prioritized sampling, uniform when `None`.
    #[serde(default)]
    pub per_config: Option<PerConfig>,
}

impl Default for ReplayMemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            seed: 42,
            per_config: None,
        }
    }
}

impl ReplayMemoryConfig {
    /// Sets the capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the seed of the sampling RNG.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the configuration of prioritized sampling.
    pub fn per_config(mut self, per_config: Option<PerConfig>) -> Self {
        self.per_config = per_config;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let config = serde_yaml::from_reader(rdr)?;
        Ok(config)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
