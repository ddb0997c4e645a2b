#![warn(missing_docs)]
//! Core abstractions for training routing agents against an external optimization engine.
//!
//! This crate knows nothing about tensors or sockets. It provides
//!
//! * [`Algo`] - the capability every learning algorithm exposes to the runner,
//! * [`Obs`] - the view of an observation an algorithm needs,
//! * [`record`] - metrics records and the [`Recorder`](record::Recorder) sinks,
//! * [`replay_buffer`] - the fixed-capacity transition memory used by off-policy algorithms,
//! * [`rollout_buffer`] - the append-only buffer and return estimators used by on-policy algorithms.
pub mod error;
pub mod record;
pub mod replay_buffer;
pub mod rollout_buffer;

mod base;
pub use base::{Algo, Device, Obs};
pub use error::CoreError;
