/// Transitions gathered by one call of
/// [`ReplayMemory::sample`](super::ReplayMemory::sample).
///
/// Row `k` of every field comes from the stored transition at physical index
/// `ixs[k]`; the order of `ixs` is the order the indices were drawn in.
#[derive(Debug, Clone)]
pub struct Batch<O> {
    /// Observations.
    pub obs: Vec<O>,

    /// Action indices.
    pub actions: Vec<usize>,

    /// Rewards.
    pub rewards: Vec<f32>,

    /// Next observations.
    pub next_obs: Vec<O>,

    /// Episode-end flags.
    pub dones: Vec<bool>,

    /// Physical indices of the sampled slots.
    pub ixs: Vec<usize>,
}

impl<O> Batch<O> {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if the batch has no row.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Done flags as `0.0`/`1.0`.
    pub fn dones_f32(&self) -> Vec<f32> {
        self.dones.iter().map(|&d| if d { 1f32 } else { 0f32 }).collect()
    }
}
