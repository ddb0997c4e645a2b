use super::{Record, Recorder};
use anyhow::Result;

/// Buffered recorder.
///
/// Keeps every `(step, record)` pair in memory. Mostly useful for inspecting
/// what a runner logged.
#[derive(Debug, Default)]
pub struct BufferedRecorder {
    buf: Vec<(usize, Record)>,
    closed: bool,
}

impl BufferedRecorder {
    /// Construct the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the records.
    pub fn iter(&self) -> std::slice::Iter<(usize, Record)> {
        self.buf.iter()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no record has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns `true` once [`Recorder::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, step: usize, record: Record) -> Result<()> {
        self.buf.push((step, record));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
