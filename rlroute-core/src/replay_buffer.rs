//! Fixed-capacity replay memory for off-policy algorithms.
//!
//! [`ReplayMemory`] is a ring of [`Transition`]s: once `capacity` transitions
//! are stored, every new one evicts the oldest. Episode boundaries are recorded
//! by [`ReplayMemory::end_episode`], which flips the `done` flag of the most
//! recently appended transition instead of adding an entry.
//!
//! Sampling draws indices independently **with replacement**, either uniformly
//! or, when [`PerConfig`] is given, proportionally to per-slot priorities.
mod base;
mod batch;
mod config;
pub use base::{ReplayMemory, Transition};
pub use batch::Batch;
pub use config::{PerConfig, ReplayMemoryConfig};
