//! Learning algorithms for routing agents implemented with [candle](https://crates.io/crates/candle-core).
//!
//! * [`dqn`] - off-policy, value-based: online and target networks, double-Q,
//!   replay memory with optional prioritized sampling.
//! * [`ppo`] - on-policy, actor-critic: rollout buffer, GAE or Monte-Carlo
//!   advantages, clipped surrogate objective.
//!
//! Both implement [`Algo`](rlroute_core::Algo) for any observation type
//! implementing [`Obs`](rlroute_core::Obs).
pub mod dqn;
mod error;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod ppo;
pub mod util;
use anyhow::Result;
pub use error::AgentError;
use rlroute_core::Device;

/// Converts a serializable [`Device`] into a candle device.
///
/// Fails for CUDA devices when candle was built without the `cuda` feature.
pub fn candle_device(device: Device) -> Result<candle_core::Device> {
    match device {
        Device::Cpu => Ok(candle_core::Device::Cpu),
        Device::Cuda(n) => Ok(candle_core::Device::new_cuda(n)?),
    }
}
