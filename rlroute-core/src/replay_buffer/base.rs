//! Ring-buffer implementation of the replay memory.
mod sum_tree;
use super::{Batch, PerConfig, ReplayMemoryConfig};
use crate::error::CoreError;
use rand::{rngs::StdRng, Rng, SeedableRng};
use sum_tree::SumTree;

/// One `(obs, action, reward, next_obs, done)` tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<O> {
    /// Observation the action was taken in.
    pub obs: O,

    /// Index of the taken action.
    pub action: usize,

    /// Reward received for the action.
    pub reward: f32,

    /// Observation after the action.
    pub next_obs: O,

    /// Set when the transition closes an episode.
    pub done: bool,
}

struct PerState {
    sum_tree: SumTree,
    floor: f32,
    default_priority: f32,
}

impl PerState {
    fn new(capacity: usize, per_config: &PerConfig) -> Self {
        Self {
            sum_tree: SumTree::new(capacity, per_config.alpha),
            floor: per_config.floor,
            default_priority: per_config.default_priority,
        }
    }
}

/// Fixed-capacity circular memory of transitions.
///
/// # Examples
///
/// ```rust
/// use rlroute_core::replay_buffer::{ReplayMemory, ReplayMemoryConfig};
///
/// let mut memory = ReplayMemory::<u8>::build(&ReplayMemoryConfig::default().capacity(2));
/// memory.add(0, 1, 0.5, 1);
/// memory.add(1, 0, 1.0, 2);
/// memory.add(2, 1, 0.0, 3);
/// memory.end_episode();
///
/// assert_eq!(memory.len(), 2);
/// let obs = memory.iter().map(|t| t.obs).collect::<Vec<_>>();
/// assert_eq!(obs, vec![1, 2]);
/// assert!(memory.iter().last().unwrap().done);
/// ```
pub struct ReplayMemory<O> {
    /// Maximum number of transitions.
    capacity: usize,

    /// Physical index the next transition is written to.
    i: usize,

    /// Number of stored transitions.
    size: usize,

    buf: Vec<Transition<O>>,

    rng: StdRng,

    per_state: Option<PerState>,

    /// Indices drawn by the last call of `sample()`.
    last_ixs: Option<Vec<usize>>,
}

impl<O: Clone> ReplayMemory<O> {
    /// Constructs an empty memory.
    ///
    /// A capacity of zero is raised to one.
    pub fn build(config: &ReplayMemoryConfig) -> Self {
        let capacity = config.capacity.max(1);
        let per_state = config
            .per_config
            .as_ref()
            .map(|per_config| PerState::new(capacity, per_config));

        Self {
            capacity,
            i: 0,
            size: 0,
            buf: Vec::with_capacity(capacity),
            rng: StdRng::seed_from_u64(config.seed),
            per_state,
            last_ixs: None,
        }
    }

    /// Appends a transition with `done = false`, evicting the oldest one when full.
    pub fn add(&mut self, obs: O, action: usize, reward: f32, next_obs: O) {
        let tr = Transition {
            obs,
            action,
            reward,
            next_obs,
            done: false,
        };

        if self.buf.len() < self.capacity {
            self.buf.push(tr);
        } else {
            self.buf[self.i] = tr;
        }

        if let Some(per_state) = self.per_state.as_mut() {
            let p = match per_state.sum_tree.max() {
                p if p > 0f32 => p,
                _ => per_state.default_priority,
            };
            per_state.sum_tree.update(self.i, p);
        }

        self.i = (self.i + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
    }

    /// Physical index of the most recently appended transition.
    fn last_index(&self) -> Option<usize> {
        match self.size {
            0 => None,
            _ => Some((self.i + self.capacity - 1) % self.capacity),
        }
    }

    /// Marks the most recently appended transition as the end of an episode.
    ///
    /// Does nothing on an empty memory.
    pub fn end_episode(&mut self) {
        if let Some(ix) = self.last_index() {
            self.buf[ix].done = true;
        }
    }

    /// Returns `true` if at least `n` transitions are stored.
    pub fn can_sample(&self, n: usize) -> bool {
        self.size >= n
    }

    /// Draws `n` transitions with replacement.
    ///
    /// Indices are uniform over the stored transitions, or proportional to
    /// `priority^alpha` for a prioritized memory. The drawn indices are kept
    /// for [`update_priorities`](Self::update_priorities).
    pub fn sample(&mut self, n: usize) -> Result<Batch<O>, CoreError> {
        if self.size == 0 {
            return Err(CoreError::EmptyBuffer(n));
        }

        let ixs = match &self.per_state {
            Some(per_state) => per_state
                .sum_tree
                .sample(n, &mut self.rng)
                .into_iter()
                .map(|ix| ix.min(self.size - 1))
                .collect::<Vec<_>>(),
            None => (0..n)
                .map(|_| self.rng.gen_range(0..self.size))
                .collect::<Vec<_>>(),
        };

        let mut batch = Batch {
            obs: Vec::with_capacity(n),
            actions: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            next_obs: Vec::with_capacity(n),
            dones: Vec::with_capacity(n),
            ixs: ixs.clone(),
        };
        for &ix in ixs.iter() {
            let tr = &self.buf[ix];
            batch.obs.push(tr.obs.clone());
            batch.actions.push(tr.action);
            batch.rewards.push(tr.reward);
            batch.next_obs.push(tr.next_obs.clone());
            batch.dones.push(tr.done);
        }
        self.last_ixs = Some(ixs);

        Ok(batch)
    }

    /// Rewrites the priorities of the last sampled indices to `max(|td|, floor)`.
    ///
    /// Does nothing for a uniform memory.
    pub fn update_priorities(&mut self, td_errs: &[f32]) -> Result<(), CoreError> {
        let per_state = match self.per_state.as_mut() {
            Some(per_state) => per_state,
            None => return Ok(()),
        };
        let ixs = self.last_ixs.as_ref().ok_or(CoreError::NoSampledIndices)?;
        if ixs.len() != td_errs.len() {
            return Err(CoreError::PriorityLengthMismatch {
                expected: ixs.len(),
                actual: td_errs.len(),
            });
        }

        for (&ix, &td_err) in ixs.iter().zip(td_errs.iter()) {
            let p = td_err.abs().max(per_state.floor);
            per_state.sum_tree.update(ix, p);
        }
        Ok(())
    }

    /// Removes every transition.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.i = 0;
        self.size = 0;
        self.last_ixs = None;
        if let Some(per_state) = self.per_state.as_mut() {
            per_state.sum_tree.clear();
        }
    }

    /// Returns `true` if the memory holds `capacity` transitions.
    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    /// Number of stored transitions.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if no transition is stored.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Maximum number of transitions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if sampling is prioritized.
    pub fn is_prioritized(&self) -> bool {
        self.per_state.is_some()
    }

    /// Priority of the slot at physical index `ix`, if prioritized.
    pub fn priority(&self, ix: usize) -> Option<f32> {
        self.per_state
            .as_ref()
            .map(|per_state| per_state.sum_tree.priority(ix))
    }

    /// Iterates over the stored transitions from the oldest to the newest.
    pub fn iter(&self) -> impl Iterator<Item = &Transition<O>> {
        let (newer, older) = if self.size < self.capacity {
            self.buf.split_at(0)
        } else {
            self.buf.split_at(self.i)
        };
        older.iter().chain(newer.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(capacity: usize) -> ReplayMemory<usize> {
        ReplayMemory::build(&ReplayMemoryConfig::default().capacity(capacity).seed(0))
    }

    #[test]
    fn test_eviction_keeps_last_in_order() {
        let mut memory = memory(5);
        for k in 0..13 {
            memory.add(k, k % 3, k as f32, k + 1);
        }
        assert_eq!(memory.len(), 5);
        assert!(memory.is_full());
        let obs = memory.iter().map(|tr| tr.obs).collect::<Vec<_>>();
        assert_eq!(obs, vec![8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_end_episode_touches_last_only() {
        let mut memory = memory(3);
        memory.end_episode(); // no-op on empty memory
        for k in 0..4 {
            memory.add(k, 0, 0.0, k + 1);
        }
        memory.end_episode();
        let dones = memory.iter().map(|tr| tr.done).collect::<Vec<_>>();
        assert_eq!(dones, vec![false, false, true]);

        memory.add(4, 0, 0.0, 5);
        memory.end_episode();
        let dones = memory.iter().map(|tr| tr.done).collect::<Vec<_>>();
        assert_eq!(dones, vec![false, true, true]);
    }

    #[test]
    fn test_sample_with_replacement() -> Result<(), CoreError> {
        let mut memory = memory(4);
        assert!(matches!(memory.sample(2), Err(CoreError::EmptyBuffer(2))));
        for k in 0..3 {
            memory.add(k, k, k as f32, k + 10);
        }
        assert!(memory.can_sample(3));
        assert!(!memory.can_sample(4));

        let batch = memory.sample(32)?;
        assert_eq!(batch.len(), 32);
        for k in 0..batch.len() {
            let obs = batch.obs[k];
            assert!(obs < 3);
            assert_eq!(batch.actions[k], obs);
            assert_eq!(batch.next_obs[k], obs + 10);
            assert_eq!(batch.ixs[k], obs);
        }
        Ok(())
    }

    #[test]
    fn test_sample_single_transition() -> Result<(), CoreError> {
        let mut memory = memory(1);
        memory.add(7, 1, 2.0, 8);
        let batch = memory.sample(5)?;
        assert_eq!(batch.obs, vec![7; 5]);
        assert_eq!(batch.rewards, vec![2.0; 5]);
        Ok(())
    }

    #[test]
    fn test_clear() {
        let mut memory = memory(2);
        memory.add(0, 0, 0.0, 1);
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.iter().count(), 0);
    }

    #[test]
    fn test_prioritized_sampling() -> Result<(), CoreError> {
        let config = ReplayMemoryConfig::default()
            .capacity(4)
            .seed(3)
            .per_config(Some(PerConfig::default().floor(0.01)));
        let mut memory = ReplayMemory::<usize>::build(&config);
        assert!(matches!(
            memory.update_priorities(&[1.0]),
            Err(CoreError::NoSampledIndices)
        ));

        memory.add(0, 0, 0.0, 1);
        memory.add(1, 0, 0.0, 2);
        assert_eq!(memory.priority(0), Some(1.0));
        assert_eq!(memory.priority(1), Some(1.0));

        let batch = memory.sample(2)?;
        assert!(matches!(
            memory.update_priorities(&[1.0]),
            Err(CoreError::PriorityLengthMismatch { expected: 2, actual: 1 })
        ));

        // drive priorities of both slots to known values
        let td = batch
            .ixs
            .iter()
            .map(|&ix| if ix == 0 { 0.0 } else { -3.0 })
            .collect::<Vec<_>>();
        memory.update_priorities(&td)?;
        let batch = memory.sample(1)?;
        let td = vec![if batch.ixs[0] == 0 { 0.0 } else { -3.0 }];
        memory.update_priorities(&td)?;
        for ix in 0..2 {
            if let Some(p) = memory.priority(ix) {
                assert!(p == 1.0 || p == 0.01 || p == 3.0);
            }
        }

        // a new slot gets the current maximum priority
        memory.add(2, 0, 0.0, 3);
        let max = (0..2).filter_map(|ix| memory.priority(ix)).fold(0f32, f32::max);
        assert_eq!(memory.priority(2), Some(max));
        Ok(())
    }

    #[test]
    fn test_prioritized_sampling_is_proportional() -> Result<(), CoreError> {
        let config = ReplayMemoryConfig::default()
            .capacity(2)
            .seed(5)
            .per_config(Some(PerConfig::default()));
        let mut memory = ReplayMemory::<usize>::build(&config);
        memory.add(0, 0, 0.0, 1);
        memory.add(1, 0, 0.0, 2);

        // assign priority 1 to slot 0 and 3 to slot 1
        let batch = memory.sample(64)?;
        let td = batch
            .ixs
            .iter()
            .map(|&ix| if ix == 0 { 1.0 } else { 3.0 })
            .collect::<Vec<_>>();
        assert!(batch.ixs.contains(&0) && batch.ixs.contains(&1));
        memory.update_priorities(&td)?;
        assert_eq!(memory.priority(0), Some(1.0));
        assert_eq!(memory.priority(1), Some(3.0));

        let batch = memory.sample(8000)?;
        let n1 = batch.ixs.iter().filter(|&&ix| ix == 1).count() as f32 / 8000.0;
        assert!((n1 - 0.75).abs() < 0.03, "{}", n1);
        Ok(())
    }
}
