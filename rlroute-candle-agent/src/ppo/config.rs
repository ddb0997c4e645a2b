//! Configuration of PPO agent.
use crate::{model::ModelDims, opt::OptimizerConfig};
use anyhow::Result;
use rlroute_core::Device;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// How advantages are computed from a rollout.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum AdvantageEstimator {
    /// Generalized advantage estimation; the value target is `advantage + value`.
    Gae { lambda: f32 },

    /// Discounted return minus the value at collection time; the value target is the return.
    MonteCarlo,
}

impl Default for AdvantageEstimator {
    fn default() -> Self {
        Self::Gae { lambda: 0.95 }
    }
}

/// Configuration of [`Ppo`](super::Ppo) agent.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PpoConfig<Q> {
    pub actor_config: Option<Q>,
    pub critic_config: Option<Q>,
    pub opt_config: OptimizerConfig,
    pub gamma: f32,

    /// Number of passes over the rollout per update.
    pub k_epochs: usize,
    pub eps_clip: f64,

    /// Weight of the value loss.
    pub c1: f64,

    /// Weight of the entropy bonus.
    pub c2: f64,

    /// Number of collected steps triggering an update.
    pub n_steps: usize,
    #[serde(default)]
    pub advantage: AdvantageEstimator,
    #[serde(default)]
    pub normalize_advantage: bool,

    /// Also update when an episode ends, whatever the rollout length.
    #[serde(default)]
    pub update_on_episode_end: bool,
    #[serde(default)]
    pub grad_clip: Option<f64>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub device: Device,
}

fn default_seed() -> u64 {
    42
}

impl<Q> Default for PpoConfig<Q> {
    fn default() -> Self {
        Self {
            actor_config: None,
            critic_config: None,
            opt_config: OptimizerConfig::Adam { lr: 0.001 },
            gamma: 0.99,
            k_epochs: 20,
            eps_clip: 0.2,
            c1: 0.5,
            c2: 0.01,
            n_steps: 32,
            advantage: AdvantageEstimator::default(),
            normalize_advantage: false,
            update_on_episode_end: false,
            grad_clip: None,
            seed: default_seed(),
            device: Device::Cpu,
        }
    }
}

impl<Q> PpoConfig<Q>
where
    Q: DeserializeOwned + Serialize + ModelDims + Clone,
{
    /// Uses `v` for both the actor and the critic; the critic outputs one value.
    pub fn model_config(mut self, v: Q) -> Self {
        let mut critic_config = v.clone();
        critic_config.set_out_dim(1);
        self.actor_config = Some(v);
        self.critic_config = Some(critic_config);
        self
    }

    pub fn actor_config(mut self, v: Q) -> Self {
        self.actor_config = Some(v);
        self
    }

    pub fn critic_config(mut self, v: Q) -> Self {
        self.critic_config = Some(v);
        self
    }

    /// Sets the input dimension of both models and the number of actions.
    pub fn dims(mut self, in_dim: usize, n_actions: usize) -> Self {
        if let Some(config) = &mut self.actor_config {
            config.set_in_dim(in_dim);
            config.set_out_dim(n_actions);
        }
        if let Some(config) = &mut self.critic_config {
            config.set_in_dim(in_dim);
            config.set_out_dim(1);
        }
        self
    }

    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    pub fn gamma(mut self, v: f32) -> Self {
        self.gamma = v;
        self
    }

    pub fn k_epochs(mut self, v: usize) -> Self {
        self.k_epochs = v;
        self
    }

    pub fn eps_clip(mut self, v: f64) -> Self {
        self.eps_clip = v;
        self
    }

    pub fn c1(mut self, v: f64) -> Self {
        self.c1 = v;
        self
    }

    pub fn c2(mut self, v: f64) -> Self {
        self.c2 = v;
        self
    }

    pub fn n_steps(mut self, v: usize) -> Self {
        self.n_steps = v;
        self
    }

    pub fn advantage(mut self, v: AdvantageEstimator) -> Self {
        self.advantage = v;
        self
    }

    pub fn normalize_advantage(mut self, v: bool) -> Self {
        self.normalize_advantage = v;
        self
    }

    pub fn update_on_episode_end(mut self, v: bool) -> Self {
        self.update_on_episode_end = v;
        self
    }

    pub fn grad_clip(mut self, v: Option<f64>) -> Self {
        self.grad_clip = v;
        self
    }

    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Loads [`PpoConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PpoConfig`].
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
    use crate::model::ModelDims;

    #[test]
    fn test_dims_set_critic_output_to_one() {
        let config = PpoConfig::default()
            .model_config(MlpConfig::default())
            .dims(30, 7);
        let actor = config.actor_config.as_ref().unwrap();
        let critic = config.critic_config.as_ref().unwrap();
        assert_eq!((actor.get_in_dim(), actor.get_out_dim()), (30, 7));
        assert_eq!((critic.get_in_dim(), critic.get_out_dim()), (30, 1));
    }

    #[test]
    fn test_advantage_from_yaml() {
        let config: PpoConfig<MlpConfig> = serde_yaml::from_str(
            "
actor_config: null
critic_config: null
opt_config:
  Adam:
    lr: 0.001
gamma: 0.9
k_epochs: 4
eps_clip: 0.2
c1: 0.5
c2: 0.01
n_steps: 16
advantage: MonteCarlo
",
        )
        .unwrap();
        assert_eq!(config.advantage, AdvantageEstimator::MonteCarlo);
        assert_eq!(config.seed, 42);
        assert!(!config.normalize_advantage);
    }
}
