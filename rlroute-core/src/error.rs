//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// Tried to sample from a buffer holding no transition.
    #[error("Cannot sample {0} transitions from an empty buffer")]
    EmptyBuffer(usize),

    /// Priorities were updated without a preceding sample.
    #[error("No sampled indices to update priorities for")]
    NoSampledIndices,

    /// The number of TD errors does not match the last sample.
    #[error("Expected {expected} TD errors, got {actual}")]
    PriorityLengthMismatch {
        /// Size of the last sample.
        expected: usize,
        /// Number of TD errors given.
        actual: usize,
    },
}
