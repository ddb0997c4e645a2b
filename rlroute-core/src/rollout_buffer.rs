//! Rollout buffer and return estimators for on-policy algorithms.
//!
//! A [`RolloutBuffer`] only grows until an update consumes it and calls
//! [`RolloutBuffer::clear`]; it never evicts.

/// One collected step of an on-policy rollout.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutEntry<O> {
    /// Observation the action was sampled in.
    pub obs: O,

    /// Sampled action.
    pub action: usize,

    /// Log-probability of `action` under the policy at collection time.
    pub log_prob: f32,

    /// State value estimated by the critic at collection time.
    pub value: f32,

    /// Reward received for the action, `0` until one arrives.
    pub reward: f32,

    /// Set when the step closes an episode.
    pub done: bool,
}

/// Append-only buffer of rollout steps.
#[derive(Debug, Clone)]
pub struct RolloutBuffer<O> {
    entries: Vec<RolloutEntry<O>>,
}

impl<O> Default for RolloutBuffer<O> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<O> RolloutBuffer<O> {
    /// Constructs an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step with `reward = 0` and `done = false`.
    pub fn push(&mut self, obs: O, action: usize, log_prob: f32, value: f32) {
        self.entries.push(RolloutEntry {
            obs,
            action,
            log_prob,
            value,
            reward: 0f32,
            done: false,
        });
    }

    /// Sets the reward of the latest step. Returns `false` on an empty buffer.
    pub fn set_last_reward(&mut self, reward: f32) -> bool {
        match self.entries.last_mut() {
            Some(entry) => {
                entry.reward = reward;
                true
            }
            None => false,
        }
    }

    /// Marks the latest step as the end of an episode. Returns `false` on an empty buffer.
    pub fn mark_done(&mut self) -> bool {
        match self.entries.last_mut() {
            Some(entry) => {
                entry.done = true;
                true
            }
            None => false,
        }
    }

    /// Returns `true` if the latest step closes an episode.
    pub fn last_done(&self) -> bool {
        self.entries.last().map(|e| e.done).unwrap_or(false)
    }

    /// Collected steps in insertion order.
    pub fn entries(&self) -> &[RolloutEntry<O>] {
        &self.entries
    }

    /// Rewards of all steps.
    pub fn rewards(&self) -> Vec<f32> {
        self.entries.iter().map(|e| e.reward).collect()
    }

    /// Critic values of all steps.
    pub fn values(&self) -> Vec<f32> {
        self.entries.iter().map(|e| e.value).collect()
    }

    /// Done flags of all steps.
    pub fn dones(&self) -> Vec<bool> {
        self.entries.iter().map(|e| e.done).collect()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no step is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every step.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Monte-Carlo discounted returns.
///
/// Iterates in reverse with `G = reward + gamma * G`, resetting `G` to zero
/// at every step flagged `done` before accumulating it.
pub fn discounted_returns(rewards: &[f32], dones: &[bool], gamma: f32) -> Vec<f32> {
    let mut returns = vec![0f32; rewards.len()];
    let mut g = 0f32;
    for i in (0..rewards.len()).rev() {
        if dones[i] {
            g = 0f32;
        }
        g = rewards[i] + gamma * g;
        returns[i] = g;
    }
    returns
}

/// Generalized advantage estimation.
///
/// `delta_t = r_t + gamma * V_{t+1} * (1 - done_t) - V_t` and
/// `A_t = delta_t + gamma * lambda * (1 - done_t) * A_{t+1}`.
/// `next_value` bootstraps the last step when it does not close an episode.
pub fn gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    next_value: f32,
    gamma: f32,
    lambda: f32,
) -> Vec<f32> {
    let n = rewards.len();
    let mut advantages = vec![0f32; n];
    let mut acc = 0f32;
    for i in (0..n).rev() {
        let not_done = if dones[i] { 0f32 } else { 1f32 };
        let v_next = if i + 1 == n { next_value } else { values[i + 1] };
        let delta = rewards[i] + gamma * v_next * not_done - values[i];
        acc = delta + gamma * lambda * not_done * acc;
        advantages[i] = acc;
    }
    advantages
}

/// Standardizes `xs` to zero mean and unit variance.
pub fn normalize(xs: &[f32]) -> Vec<f32> {
    if xs.is_empty() {
        return vec![];
    }
    let n = xs.len() as f32;
    let mean = xs.iter().sum::<f32>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
    let std = var.sqrt() + 1e-7;
    xs.iter().map(|x| (x - mean) / std).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_buffer_ops() {
        let mut buffer = RolloutBuffer::<u8>::new();
        assert!(!buffer.set_last_reward(1.0));
        assert!(!buffer.mark_done());

        buffer.push(0, 1, -0.5, 0.2);
        buffer.push(1, 0, -0.7, 0.3);
        assert!(buffer.set_last_reward(2.0));
        assert!(buffer.mark_done());
        assert_eq!(buffer.rewards(), vec![0.0, 2.0]);
        assert_eq!(buffer.dones(), vec![false, true]);
        assert!(buffer.last_done());

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_discounted_returns_reset_at_done() {
        let rewards = [1.0, 1.0, 1.0, 1.0];
        let dones = [false, true, false, true];
        let returns = discounted_returns(&rewards, &dones, 0.5);
        assert_close(&returns, &[1.5, 1.0, 1.5, 1.0]);
    }

    #[test]
    fn test_gae_lambda_one_equals_mc_minus_baseline() {
        let rewards = [0.5, -1.0, 2.0, 1.0, 0.0, 3.0];
        let values = [0.1, 0.4, -0.2, 0.7, 0.3, 0.0];
        let dones = [false, false, true, false, false, true];
        let gamma = 0.9;

        let adv = gae(&rewards, &values, &dones, 0.0, gamma, 1.0);
        let returns = discounted_returns(&rewards, &dones, gamma);
        let expected = returns
            .iter()
            .zip(values.iter())
            .map(|(g, v)| g - v)
            .collect::<Vec<_>>();
        assert_close(&adv, &expected);
    }

    #[test]
    fn test_gae_lambda_zero_is_td_residual() {
        let rewards = [1.0, 2.0];
        let values = [0.5, 0.25];
        let dones = [false, false];
        let adv = gae(&rewards, &values, &dones, 1.0, 0.5, 0.0);
        assert_close(&adv, &[1.0 + 0.5 * 0.25 - 0.5, 2.0 + 0.5 * 1.0 - 0.25]);
    }

    #[test]
    fn test_normalize() {
        let xs = normalize(&[1.0, 2.0, 3.0]);
        assert!(xs.iter().sum::<f32>().abs() < 1e-5);
        assert!(xs[0] < 0.0 && xs[2] > 0.0);
        assert!(normalize(&[]).is_empty());
    }
}
