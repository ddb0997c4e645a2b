//! Types and traits for recording training metrics.
//!
//! A [`Record`] is a set of named values produced by one training step, one
//! learning update or one episode. A [`Recorder`] is an explicitly owned sink
//! for records; the runner receives one at construction and owns its lifecycle:
//! construction opens the sink, [`Recorder::write`] logs a record for a step,
//! [`Recorder::close`] flushes and releases it.
//!
//! # Basic Usage
//!
//! ```rust
//! use rlroute_core::record::{Record, RecordValue};
//!
//! let action = 3;
//! let reward = -1f32;
//! let qvalues = vec![0.1f32, 0.2, 0.3, 0.4];
//!
//! let mut record = Record::empty();
//! record.insert("action", RecordValue::Scalar(action as f32));
//! record.insert("reward", RecordValue::Scalar(reward));
//! record.insert("qvalues", RecordValue::Array1(qvalues));
//! ```
mod base;
mod buffered_recorder;
mod composite_recorder;
mod csv_recorder;
mod null_recorder;
mod recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use composite_recorder::CompositeRecorder;
pub use csv_recorder::CsvRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
