//! DQN agent.
mod base;
mod config;
mod explorer;
mod model;
pub use base::{next_state_values, Dqn};
pub use config::DqnConfig;
pub use explorer::EpsilonGreedy;
pub use model::{DqnModel, DqnModelConfig};
