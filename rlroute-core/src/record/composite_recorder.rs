use super::{Record, Recorder};
use anyhow::Result;

/// Forwards every record to a list of recorders.
#[derive(Default)]
pub struct CompositeRecorder {
    recorders: Vec<Box<dyn Recorder>>,
}

impl CompositeRecorder {
    /// Constructs an empty composite recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a recorder.
    pub fn with(mut self, recorder: Box<dyn Recorder>) -> Self {
        self.recorders.push(recorder);
        self
    }

    /// Number of wrapped recorders.
    pub fn len(&self) -> usize {
        self.recorders.len()
    }

    /// Returns `true` if no recorder is wrapped.
    pub fn is_empty(&self) -> bool {
        self.recorders.is_empty()
    }
}

impl Recorder for CompositeRecorder {
    fn write(&mut self, step: usize, record: Record) -> Result<()> {
        if let Some((last, rest)) = self.recorders.split_last_mut() {
            for recorder in rest.iter_mut() {
                recorder.write(step, record.clone())?;
            }
            last.write(step, record)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for recorder in self.recorders.iter_mut() {
            recorder.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        for recorder in self.recorders.iter_mut() {
            recorder.close()?;
        }
        Ok(())
    }
}
