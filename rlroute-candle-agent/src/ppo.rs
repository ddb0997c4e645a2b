//! PPO agent.
mod base;
mod config;
mod model;
pub use base::Ppo;
pub use config::{AdvantageEstimator, PpoConfig};
pub use model::ActorCritic;
