use anyhow::Result;
use log::warn;
use rlroute_core::record::{Record, RecordValue, Recorder};
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Write records to TFRecord.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    ignore_unsupported_value: bool,
    closed: bool,
}

impl TensorboardRecorder {
    /// Construct a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            ignore_unsupported_value: true,
            closed: false,
        }
    }

    /// Construct a [`TensorboardRecorder`] rejecting records with string values.
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new_with_check_unsupported_value<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            ignore_unsupported_value: false,
            closed: false,
        }
    }
}

impl Recorder for TensorboardRecorder {
    /// Write a given [Record] into a TFRecord.
    ///
    /// [RecordValue::Scalar] is written as is and [RecordValue::Array1] as one
    /// scalar per element, tagged `key-i`. [RecordValue::DateTime] is discarded.
    fn write(&mut self, step: usize, record: Record) -> Result<()> {
        if self.closed {
            warn!("Record for step {} written after close, discarded", step);
            return Ok(());
        }

        for (k, v) in record.iter() {
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                RecordValue::Array1(vs) => {
                    for (i, v) in vs.iter().enumerate() {
                        self.writer.add_scalar(&format!("{}-{}", k, i), *v, step);
                    }
                }
                RecordValue::DateTime(_) => {}
                RecordValue::String(_) => {
                    if !self.ignore_unsupported_value {
                        anyhow::bail!("Unsupported value: {:?}", (k, v));
                    }
                }
            };
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.writer.flush();
            self.closed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_write_events() -> Result<()> {
        let dir = TempDir::new("tensorboard")?;
        let mut recorder = TensorboardRecorder::new(dir.path());
        let mut record = Record::from_scalar("reward", 1.0);
        record.insert("q", RecordValue::Array1(vec![0.1, 0.2]));
        record.insert("name", RecordValue::String("dqn".into()));
        recorder.write(0, record)?;
        recorder.close()?;

        let n_files = std::fs::read_dir(dir.path())?.count();
        assert!(n_files > 0);
        Ok(())
    }

    #[test]
    fn test_reject_string_values() -> Result<()> {
        let dir = TempDir::new("tensorboard")?;
        let mut recorder = TensorboardRecorder::new_with_check_unsupported_value(dir.path());
        let record = Record::from_slice(&[("algo", RecordValue::String("ppo".into()))]);
        assert!(recorder.write(0, record).is_err());
        Ok(())
    }
}
