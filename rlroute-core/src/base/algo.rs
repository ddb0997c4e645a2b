//! Learning algorithm.
use super::{Device, Obs};
use crate::record::Record;
use anyhow::Result;
use std::path::Path;

/// Capability shared by all learning algorithms driven by the runner.
///
/// The runner calls the methods in a fixed order per environment step:
/// [`select_action`](Algo::select_action), then, once the reward and the next
/// observation have been received, [`learn`](Algo::learn). When the peer
/// signals the end of an episode, [`notify_episode_end`](Algo::notify_episode_end)
/// is called exactly once.
pub trait Algo<O: Obs> {
    /// Selects an action for the given observation.
    ///
    /// Returns the action index and diagnostic values, the action values for
    /// value-based algorithms or the masked policy logits for policy-gradient ones.
    fn select_action(&mut self, obs: &O) -> Result<(usize, Vec<f32>)>;

    /// Consumes a transition `(o_t, a_t, r_t, o_t+1)` and performs a learning update
    /// when the algorithm is ready to.
    ///
    /// `step` is the global environment step counter. `done` flags a transition that
    /// closes the episode; it is stored as terminal before any update runs, and
    /// `next_obs` is then not bootstrapped. The returned record is empty when no
    /// update was performed.
    fn learn(
        &mut self,
        step: usize,
        obs: O,
        action: usize,
        reward: f32,
        next_obs: O,
        done: bool,
    ) -> Result<Record>;

    /// Marks the end of the current episode.
    ///
    /// Algorithms that update on episode boundaries return their logs here.
    fn notify_episode_end(&mut self) -> Result<Record>;

    /// Moves the parameters of the algorithm to the given device.
    fn move_to_device(&mut self, device: Device) -> Result<()>;

    /// Saves the parameters of the algorithm in the given directory.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Loads the parameters of the algorithm from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
