//! Exploration strategy of DQN.
use crate::{util::argmax_available, AgentError};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

/// Epsilon-greedy explorer for DQN.
///
/// Epsilon decays linearly from `eps_start` to `eps_final` over `final_step`
/// action selections, then stays at `eps_final`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EpsilonGreedy {
    /// Number of actions selected so far.
    #[serde(default)]
    pub n_steps: usize,

    /// Epsilon of the first selection.
    pub eps_start: f64,

    /// Epsilon after `final_step` selections.
    pub eps_final: f64,

    /// Number of selections of the linear decay.
    pub final_step: usize,
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self::constant(0.1)
    }
}

impl EpsilonGreedy {
    /// Constructs an explorer with a fixed epsilon.
    pub fn constant(eps: f64) -> Self {
        Self {
            n_steps: 0,
            eps_start: eps,
            eps_final: eps,
            final_step: 0,
        }
    }

    /// Constructs an explorer decaying from 1.0 to 0.02 over `final_step` selections.
    pub fn with_final_step(final_step: usize) -> Self {
        Self {
            n_steps: 0,
            eps_start: 1.0,
            eps_final: 0.02,
            final_step,
        }
    }

    /// Current epsilon.
    pub fn eps(&self) -> f64 {
        if self.n_steps >= self.final_step {
            self.eps_final
        } else {
            let d = (self.eps_start - self.eps_final) / self.final_step as f64;
            self.eps_start - d * self.n_steps as f64
        }
    }

    /// Takes an action among `available` indices given action values.
    ///
    /// With probability epsilon the action is uniform over `available`, otherwise
    /// it is the first available action of maximal value.
    pub fn action(
        &mut self,
        values: &[f32],
        available: &[usize],
        rng: &mut impl Rng,
    ) -> Result<usize, AgentError> {
        let is_random = rng.gen::<f64>() < self.eps();
        self.n_steps += 1;

        let a = if is_random {
            available.choose(rng).copied()
        } else {
            argmax_available(values, available)
        };
        a.ok_or(AgentError::NoAvailableAction)
    }

    /// Set the epsilon value at the final step.
    pub fn eps_final(mut self, v: f64) -> Self {
        self.eps_final = v;
        self
    }

    /// Set the epsilon value at the start.
    pub fn eps_start(mut self, v: f64) -> Self {
        self.eps_start = v;
        self
    }

    /// Set the number of selections of the decay.
    pub fn final_step(mut self, v: usize) -> Self {
        self.final_step = v;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_linear_decay() {
        let mut explorer = EpsilonGreedy::with_final_step(10);
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(explorer.eps(), 1.0);
        for _ in 0..5 {
            explorer.action(&[0.0, 1.0], &[0, 1], &mut rng).unwrap();
        }
        assert!((explorer.eps() - 0.51).abs() < 1e-9);
        for _ in 0..10 {
            explorer.action(&[0.0, 1.0], &[0, 1], &mut rng).unwrap();
        }
        assert_eq!(explorer.eps(), 0.02);
    }

    #[test]
    fn test_greedy_and_random_stay_available() {
        let mut rng = SmallRng::seed_from_u64(1);
        let values = [9.0, 1.0, 2.0, 2.0];

        let mut greedy = EpsilonGreedy::constant(0.0);
        assert_eq!(greedy.action(&values, &[1, 2, 3], &mut rng).unwrap(), 2);

        let mut random = EpsilonGreedy::constant(1.0);
        for _ in 0..100 {
            let a = random.action(&values, &[1, 3], &mut rng).unwrap();
            assert!(a == 1 || a == 3);
        }
        assert!(matches!(
            random.action(&values, &[], &mut rng),
            Err(AgentError::NoAvailableAction)
        ));
    }
}
