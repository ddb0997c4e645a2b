//! Configuration of DQN agent.
use super::{explorer::EpsilonGreedy, DqnModelConfig};
use crate::{model::ModelDims, opt::OptimizerConfig};
use anyhow::Result;
use rlroute_core::{replay_buffer::ReplayMemoryConfig, Device};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Dqn`](super::Dqn) agent.
///
/// `Q` is the configuration type of the action-value network.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DqnConfig<Q> {
    pub model_config: DqnModelConfig<Q>,
    #[serde(default)]
    pub memory_config: ReplayMemoryConfig,
    pub batch_size: usize,
    pub discount_factor: f64,

    /// Number of optimization steps between hard updates of the target network.
    pub target_update_interval: usize,
    pub double_dqn: bool,

    /// Maximum global gradient norm.
    #[serde(default)]
    pub grad_clip: Option<f64>,
    pub explorer: EpsilonGreedy,

    /// Seed of the exploration RNG.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub device: Device,
}

fn default_seed() -> u64 {
    42
}

impl<Q> Default for DqnConfig<Q> {
    fn default() -> Self {
        Self {
            model_config: DqnModelConfig::default(),
            memory_config: ReplayMemoryConfig::default(),
            batch_size: 64,
            discount_factor: 0.99,
            target_update_interval: 100,
            double_dqn: false,
            grad_clip: None,
            explorer: EpsilonGreedy::default(),
            seed: default_seed(),
            device: Device::Cpu,
        }
    }
}

impl<Q> DqnConfig<Q>
where
    Q: DeserializeOwned + Serialize + ModelDims,
{
    /// Sets the configuration of the action-value network.
    pub fn q_config(mut self, v: Q) -> Self {
        self.model_config = self.model_config.q_config(v);
        self
    }

    /// Sets the input and output dimensions of the action-value network.
    pub fn dims(mut self, in_dim: usize, out_dim: usize) -> Self {
        self.model_config = self.model_config.dims(in_dim, out_dim);
        self
    }

    /// Sets the optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.model_config = self.model_config.opt_config(v);
        self
    }

    /// Sets the replay memory configuration.
    pub fn memory_config(mut self, v: ReplayMemoryConfig) -> Self {
        self.memory_config = v;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.discount_factor = v;
        self
    }

    /// Sets the interval of hard updates of the target network.
    pub fn target_update_interval(mut self, v: usize) -> Self {
        self.target_update_interval = v;
        self
    }

    /// Enables double DQN.
    pub fn double_dqn(mut self, v: bool) -> Self {
        self.double_dqn = v;
        self
    }

    /// Sets the maximum gradient norm.
    pub fn grad_clip(mut self, v: Option<f64>) -> Self {
        self.grad_clip = v;
        self
    }

    /// Sets the explorer.
    pub fn explorer(mut self, v: EpsilonGreedy) -> Self {
        self.explorer = v;
        self
    }

    /// Sets the seed of the exploration RNG.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Loads [`DqnConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DqnConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::MlpConfig;
    use tempdir::TempDir;

    #[test]
    fn test_serde_dqn_config() -> Result<()> {
        let config = DqnConfig::default()
            .q_config(MlpConfig::default())
            .dims(20, 5)
            .double_dqn(true)
            .grad_clip(Some(10.0))
            .explorer(EpsilonGreedy::with_final_step(1000));

        let dir = TempDir::new("dqn_config")?;
        let path = dir.path().join("dqn_config.yaml");
        config.save(&path)?;
        let config_ = DqnConfig::<MlpConfig>::load(&path)?;
        assert_eq!(config_, config);
        Ok(())
    }
}
