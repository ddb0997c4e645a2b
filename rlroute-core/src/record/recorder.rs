use super::Record;
use anyhow::Result;

/// Writes records to an output destination.
///
/// The lifecycle is open (construction) → [`write`](Recorder::write) →
/// [`close`](Recorder::close). Writing after closing is a logic error
/// of the caller; implementations may ignore or reject such records.
pub trait Recorder {
    /// Writes a record associated with the given step.
    fn write(&mut self, step: usize, record: Record) -> Result<()>;

    /// Flushes buffered output, if any.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Flushes and releases the underlying sink.
    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

impl<R: Recorder + ?Sized> Recorder for Box<R> {
    fn write(&mut self, step: usize, record: Record) -> Result<()> {
        (**self).write(step, record)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
