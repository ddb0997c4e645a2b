//! Training of routing agents in lock-step with an external optimization engine.
//!
//! The engine connects over a TCP socket or a pair of named pipes, sends the
//! problem, then drives episodes by asking for actions and sending rewards.
//! A [`Runner`] answers with the actions of a learning algorithm, DQN or PPO,
//! which learns from every transition.
//!
//! ```no_run
//! use rlroute::{create_recorder, Runner, RunnerConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = RunnerConfig::default().keep_alive(true);
//! let recorder = create_recorder(config.recorder, &config.log_dir)?;
//! let mut runner = Runner::new(config, recorder);
//! runner.run()?;
//! # Ok(())
//! # }
//! ```
mod config;
mod runner;
use anyhow::Result;
pub use config::{AlgoConfig, RecorderKind, RunnerConfig, TransportConfig, DEFAULT_PORT};
use rlroute_core::record::{CompositeRecorder, CsvRecorder, NullRecorder, Recorder};
use rlroute_tensorboard::TensorboardRecorder;
pub use runner::{build_algo, is_connection_closed, retrieve_problem, Runner};
use std::path::Path;

/// Creates the recorder of the given kind writing into `log_dir`.
pub fn create_recorder(kind: RecorderKind, log_dir: &Path) -> Result<Box<dyn Recorder>> {
    match kind {
        RecorderKind::Csv => Ok(Box::new(CsvRecorder::new(log_dir.join("metrics.csv"))?)),
        RecorderKind::Tensorboard => {
            std::fs::create_dir_all(log_dir)?;
            Ok(Box::new(TensorboardRecorder::new(log_dir)))
        }
        RecorderKind::All => Ok(Box::new(
            CompositeRecorder::new()
                .with(create_recorder(RecorderKind::Csv, log_dir)?)
                .with(create_recorder(RecorderKind::Tensorboard, log_dir)?),
        )),
        RecorderKind::None => Ok(Box::new(NullRecorder::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlroute_core::record::Record;
    use tempdir::TempDir;

    #[test]
    fn test_all_writes_csv_and_tensorboard() -> Result<()> {
        let dir = TempDir::new("recorders")?;
        let mut recorder = create_recorder(RecorderKind::All, dir.path())?;
        recorder.write(1, Record::from_scalar("reward", 0.5))?;
        recorder.close()?;

        let csv = std::fs::read_to_string(dir.path().join("metrics.csv"))?;
        assert!(csv.contains("reward,0.5"));
        // metrics.csv and the event file
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 2);
        Ok(())
    }
}
