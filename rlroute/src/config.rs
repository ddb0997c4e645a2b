//! Configuration of [`Runner`](crate::Runner).
use anyhow::Result;
use rlroute_candle_agent::{dqn::DqnConfig, mlp::MlpConfig, ppo::PpoConfig};
use rlroute_core::Device;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// Default TCP port of the socket transport.
pub const DEFAULT_PORT: u16 = 5000;

/// How the runner reaches the optimization engine.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum TransportConfig {
    /// TCP on the loopback interface.
    Socket { port: u16 },

    /// Two named pipes, `input` from the engine and `output` to it.
    Pipe { input: PathBuf, output: PathBuf },
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Socket { port: DEFAULT_PORT }
    }
}

/// Learning algorithm and its hyperparameters.
///
/// Input and output dimensions of the models are set from the problem received
/// at the beginning of each session.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum AlgoConfig {
    Dqn(DqnConfig<MlpConfig>),
    Ppo(PpoConfig<MlpConfig>),
}

impl Default for AlgoConfig {
    fn default() -> Self {
        Self::Dqn(DqnConfig::default().q_config(MlpConfig::default()))
    }
}

impl AlgoConfig {
    /// DQN with default hyperparameters.
    pub fn dqn() -> Self {
        Self::default()
    }

    /// PPO with default hyperparameters.
    pub fn ppo() -> Self {
        Self::Ppo(PpoConfig::default().model_config(MlpConfig::default()))
    }

    /// Overrides the learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::Dqn(config) => {
                let opt_config = config.model_config.opt_config.clone().learning_rate(lr);
                Self::Dqn(config.opt_config(opt_config))
            }
            Self::Ppo(config) => {
                let opt_config = config.opt_config.clone().learning_rate(lr);
                Self::Ppo(config.opt_config(opt_config))
            }
        }
    }

    /// Overrides the seed of the algorithm's RNGs.
    pub fn seed(self, seed: u64) -> Self {
        match self {
            Self::Dqn(config) => {
                let memory_config = config.memory_config.clone().seed(seed);
                Self::Dqn(config.seed(seed).memory_config(memory_config))
            }
            Self::Ppo(config) => Self::Ppo(config.seed(seed)),
        }
    }

    /// Overrides the gradient clipping threshold.
    pub fn grad_clip(self, v: f64) -> Self {
        match self {
            Self::Dqn(config) => Self::Dqn(config.grad_clip(Some(v))),
            Self::Ppo(config) => Self::Ppo(config.grad_clip(Some(v))),
        }
    }

    /// Algorithm name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dqn(_) => "dqn",
            Self::Ppo(_) => "ppo",
        }
    }
}

/// Where training metrics are written.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum RecorderKind {
    /// `metrics.csv` in the log directory.
    Csv,

    /// TFRecord files in the log directory.
    Tensorboard,

    /// Both `metrics.csv` and TFRecord files in the log directory.
    All,

    /// Metrics are discarded.
    None,
}

impl Default for RecorderKind {
    fn default() -> Self {
        Self::Csv
    }
}

/// Configuration of [`Runner`](crate::Runner).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct RunnerConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub algo: AlgoConfig,

    /// Device the parameters are moved to once the algorithm is built.
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub recorder: RecorderKind,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Serve peers one after another instead of stopping after the first one.
    ///
    /// Each peer gets a new algorithm, resumed from `model_dir` when set.
    #[serde(default)]
    pub keep_alive: bool,

    /// Directory where the parameters are saved at the end of every session and
    /// loaded from at the start of the next one.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            algo: AlgoConfig::default(),
            device: Device::Cpu,
            recorder: RecorderKind::default(),
            log_dir: default_log_dir(),
            keep_alive: false,
            model_dir: None,
        }
    }
}

impl RunnerConfig {
    /// Sets the transport.
    pub fn transport(mut self, v: TransportConfig) -> Self {
        self.transport = v;
        self
    }

    /// Sets the algorithm.
    pub fn algo(mut self, v: AlgoConfig) -> Self {
        self.algo = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Sets the recorder.
    pub fn recorder(mut self, v: RecorderKind) -> Self {
        self.recorder = v;
        self
    }

    /// Sets the log directory.
    pub fn log_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.log_dir = v.into();
        self
    }

    /// Serve sequential peers.
    pub fn keep_alive(mut self, v: bool) -> Self {
        self.keep_alive = v;
        self
    }

    /// Sets the directory of saved parameters.
    pub fn model_dir(mut self, v: Option<PathBuf>) -> Self {
        self.model_dir = v;
        self
    }

    /// Constructs [`RunnerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        log::info!("Load config of runner from {}", path_.to_str().unwrap_or("?"));
        Ok(b)
    }

    /// Saves [`RunnerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        log::info!("Save config of runner into {}", path_.to_str().unwrap_or("?"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_runner_config() -> Result<()> {
        let config = RunnerConfig::default()
            .transport(TransportConfig::Pipe {
                input: "/tmp/rlroute_in".into(),
                output: "/tmp/rlroute_out".into(),
            })
            .algo(AlgoConfig::ppo().learning_rate(3e-4).seed(7))
            .recorder(RecorderKind::Tensorboard)
            .keep_alive(true)
            .model_dir(Some("model".into()));

        let dir = TempDir::new("runner_config")?;
        let path = dir.path().join("runner.yaml");
        config.save(&path)?;
        let config_ = RunnerConfig::load(&path)?;
        assert_eq!(config_, config);
        Ok(())
    }

    #[test]
    fn test_overrides() {
        match AlgoConfig::dqn().learning_rate(0.01).grad_clip(1.0).seed(3) {
            AlgoConfig::Dqn(config) => {
                assert_eq!(config.model_config.opt_config.get_learning_rate(), 0.01);
                assert_eq!(config.grad_clip, Some(1.0));
                assert_eq!(config.seed, 3);
                assert_eq!(config.memory_config.seed, 3);
            }
            _ => panic!("DQN expected"),
        }
    }

    #[test]
    fn test_minimal_yaml() {
        let config: RunnerConfig = serde_yaml::from_str("keep_alive: true").unwrap();
        assert!(config.keep_alive);
        assert_eq!(config.transport, TransportConfig::Socket { port: 5000 });
        assert_eq!(config.algo.name(), "dqn");
    }
}
