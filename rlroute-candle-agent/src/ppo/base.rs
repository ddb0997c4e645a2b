//! PPO agent implemented with candle.
use super::{
    config::{AdvantageEstimator, PpoConfig},
    model::ActorCritic,
};
use crate::{
    candle_device,
    model::{ModelDims, SubModel1},
    util::{
        action_tensor, gather_rows, is_finite_scalar, mask_tensor, mask_values, masked_fill,
        obs_tensor, vec_tensor,
    },
    AgentError,
};
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use candle_nn::{loss::mse, ops::log_softmax};
use log::{trace, warn};
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::SmallRng,
    SeedableRng,
};
use rlroute_core::{
    record::{Record, RecordValue},
    rollout_buffer::{discounted_returns, gae, normalize, RolloutBuffer},
    Algo, Obs,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, path::Path};

/// PPO agent implemented with candle.
///
/// Steps are collected into a [`RolloutBuffer`] by [`Algo::select_action`] and
/// [`Algo::learn`]. Once the buffer holds `n_steps` entries, the clipped
/// surrogate objective is optimized for `k_epochs` full-batch steps and the
/// buffer is cleared.
pub struct Ppo<Q, O>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + ModelDims + Clone,
    O: Obs,
{
    model: ActorCritic<Q>,
    buffer: RolloutBuffer<O>,
    gamma: f32,
    k_epochs: usize,
    eps_clip: f64,
    c1: f64,
    c2: f64,
    n_steps: usize,
    advantage: AdvantageEstimator,
    normalize_advantage: bool,
    update_on_episode_end: bool,
    grad_clip: Option<f64>,
    device: Device,
    n_opts: usize,
    rng: SmallRng,
}

/// Policy probabilities and the log-probability of `action` from masked logits.
fn categorical(logits: &[f32]) -> (Vec<f32>, f32) {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let weights = logits.iter().map(|l| (l - max).exp()).collect::<Vec<_>>();
    let sum = weights.iter().sum::<f32>();
    let probs = weights.iter().map(|w| w / sum).collect();
    (probs, max + sum.ln())
}

impl<Q, O> Ppo<Q, O>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + ModelDims + Clone,
    O: Obs,
{
    /// Constructs PPO agent.
    pub fn build(config: PpoConfig<Q::Config>) -> Result<Self> {
        let device = candle_device(config.device)?;
        let model = ActorCritic::build(
            config.actor_config,
            config.critic_config,
            config.opt_config,
            device.clone(),
        )?;

        Ok(Self {
            model,
            buffer: RolloutBuffer::new(),
            gamma: config.gamma,
            k_epochs: config.k_epochs,
            eps_clip: config.eps_clip,
            c1: config.c1,
            c2: config.c2,
            n_steps: config.n_steps.max(1),
            advantage: config.advantage,
            normalize_advantage: config.normalize_advantage,
            update_on_episode_end: config.update_on_episode_end,
            grad_clip: config.grad_clip,
            device,
            n_opts: 0,
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }

    /// Collected steps not consumed by an update yet.
    pub fn buffer(&self) -> &RolloutBuffer<O> {
        &self.buffer
    }

    /// Number of optimization steps done so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Action probabilities of the current policy, zero at unavailable actions.
    pub fn action_probs(&self, obs: &O) -> Result<Vec<f32>> {
        let (logits, _) = self.forward_one(obs)?;
        let (probs, _) = categorical(&mask_values(&logits, obs.available_actions()));
        Ok(probs)
    }

    fn forward_one(&self, obs: &O) -> Result<(Vec<f32>, f32)> {
        let x = obs_tensor(std::slice::from_ref(obs), &self.device)?;
        let (logits, value) = self.model.forward(&x)?;
        let logits = logits.squeeze(0)?.to_vec1::<f32>()?;
        let value = value.to_vec1::<f32>()?.first().copied().unwrap_or(0f32);
        Ok((logits, value))
    }

    fn value_of(&self, obs: &O) -> Result<f32> {
        let x = obs_tensor(std::slice::from_ref(obs), &self.device)?;
        let value = self.model.value(&x)?.to_vec1::<f32>()?;
        Ok(value.first().copied().unwrap_or(0f32))
    }

    /// Value of the state following the rollout, zero when the rollout ends an episode.
    fn bootstrap_value(&self, next_obs: &O) -> Result<f32> {
        match self.buffer.last_done() {
            true => Ok(0f32),
            false => self.value_of(next_obs),
        }
    }

    /// Advantages and value targets of the collected rollout.
    fn advantages(&self, next_value: f32) -> (Vec<f32>, Vec<f32>) {
        let rewards = self.buffer.rewards();
        let values = self.buffer.values();
        let dones = self.buffer.dones();

        let (advantages, targets) = match self.advantage {
            AdvantageEstimator::MonteCarlo => {
                let returns = discounted_returns(&rewards, &dones, self.gamma);
                let advantages = returns.iter().zip(values.iter()).map(|(g, v)| g - v).collect();
                (advantages, returns)
            }
            AdvantageEstimator::Gae { lambda } => {
                let advantages = gae(&rewards, &values, &dones, next_value, self.gamma, lambda);
                let targets = advantages.iter().zip(values.iter()).map(|(a, v)| a + v).collect();
                (advantages, targets)
            }
        };

        match self.normalize_advantage && advantages.len() > 1 {
            true => (normalize(&advantages), targets),
            false => (advantages, targets),
        }
    }

    fn update(&mut self, next_value: f32) -> Result<Record> {
        trace!("PPO update on {} steps", self.buffer.len());
        let (advantages, targets) = self.advantages(next_value);

        let entries = self.buffer.entries();
        let obs = entries.iter().map(|e| e.obs.clone()).collect::<Vec<_>>();
        let actions = entries.iter().map(|e| e.action).collect::<Vec<_>>();
        let old_log_probs = entries.iter().map(|e| e.log_prob).collect::<Vec<_>>();

        let mask = mask_tensor(&obs, &self.device)?;
        let obs = obs_tensor(&obs, &self.device)?;
        let actions = action_tensor(&actions, &self.device)?;
        let old_log_probs = vec_tensor(&old_log_probs, &self.device)?;
        let advantages = vec_tensor(&advantages, &self.device)?;
        let targets = vec_tensor(&targets, &self.device)?;

        let mut sum_loss = 0f32;
        let mut sum_policy_loss = 0f32;
        let mut sum_value_loss = 0f32;
        let mut sum_entropy = 0f32;
        let mut grad_norm = None;

        for _ in 0..self.k_epochs {
            let (logits, values) = self.model.forward(&obs)?;
            let log_probs = log_softmax(&masked_fill(&logits, &mask)?, D::Minus1)?;
            let new_log_probs = gather_rows(&log_probs, &actions)?;
            let entropy = (log_probs.exp()? * &log_probs)?.sum(D::Minus1)?.neg()?;

            let ratio = (&new_log_probs - &old_log_probs)?.exp()?;
            let surr1 = (&ratio * &advantages)?;
            let surr2 = (ratio.clamp(1.0 - self.eps_clip, 1.0 + self.eps_clip)? * &advantages)?;
            let policy_loss = surr1.minimum(&surr2)?.mean_all()?.neg()?;
            let value_loss = mse(&values, &targets)?;
            let entropy = entropy.mean_all()?;

            let loss = ((&policy_loss + value_loss.affine(self.c1, 0.0)?)?
                - entropy.affine(self.c2, 0.0)?)?;
            let (is_finite, loss_value) = is_finite_scalar(&loss)?;
            if !is_finite {
                self.buffer.clear();
                return Err(AgentError::NonFiniteLoss(loss_value, self.n_opts).into());
            }

            grad_norm = self.model.backward_step(&loss, self.grad_clip)?;
            self.n_opts += 1;

            sum_loss += loss_value;
            sum_policy_loss += policy_loss.to_scalar::<f32>()?;
            sum_value_loss += value_loss.to_scalar::<f32>()?;
            sum_entropy += entropy.to_scalar::<f32>()?;
        }

        self.buffer.clear();

        let k = self.k_epochs.max(1) as f32;
        let mut record = Record::from_slice(&[
            ("avg-loss", RecordValue::Scalar(sum_loss / k)),
            ("policy_loss", RecordValue::Scalar(sum_policy_loss / k)),
            ("value_loss", RecordValue::Scalar(sum_value_loss / k)),
            ("entropy", RecordValue::Scalar(sum_entropy / k)),
        ]);
        if let Some(grad_norm) = grad_norm {
            record.insert("grad_norm", RecordValue::Scalar(grad_norm));
        }
        Ok(record)
    }
}

impl<Q, O> Algo<O> for Ppo<Q, O>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + ModelDims + Clone,
    O: Obs,
{
    /// Samples an action from the masked policy and records it in the rollout.
    ///
    /// Returns the logits with unavailable actions set to negative infinity.
    fn select_action(&mut self, obs: &O) -> Result<(usize, Vec<f32>)> {
        let (logits, value) = self.forward_one(obs)?;
        let logits = mask_values(&logits, obs.available_actions());
        if !logits.iter().any(|l| l.is_finite()) {
            return Err(AgentError::NoAvailableAction.into());
        }

        let (probs, log_z) = categorical(&logits);
        let act = WeightedIndex::new(&probs)?.sample(&mut self.rng);
        let log_prob = logits[act] - log_z;

        self.buffer.push(obs.clone(), act, log_prob, value);
        Ok((act, logits))
    }

    fn learn(
        &mut self,
        _step: usize,
        _obs: O,
        _action: usize,
        reward: f32,
        next_obs: O,
        done: bool,
    ) -> Result<Record> {
        if !self.buffer.set_last_reward(reward) {
            warn!("Reward {} received without a collected step", reward);
            return Ok(Record::empty());
        }
        if done {
            self.buffer.mark_done();
        }
        if self.buffer.len() < self.n_steps {
            return Ok(Record::empty());
        }

        let next_value = self.bootstrap_value(&next_obs)?;
        self.update(next_value)
    }

    fn notify_episode_end(&mut self) -> Result<Record> {
        if !self.buffer.mark_done() {
            return Ok(Record::empty());
        }
        match self.update_on_episode_end {
            true => self.update(0f32),
            false => Ok(Record::empty()),
        }
    }

    fn move_to_device(&mut self, device: rlroute_core::Device) -> Result<()> {
        let device = candle_device(device)?;
        self.model.to_device(&device)?;
        self.device = device;
        Ok(())
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.model.save(path.join("actor_critic.safetensors"))
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.model.load(path.join("actor_critic.safetensors"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mlp::{Mlp, MlpConfig},
        opt::OptimizerConfig,
    };
    use tempdir::TempDir;

    #[derive(Debug, Clone)]
    struct TestObs(Vec<f32>, Vec<bool>);

    impl Obs for TestObs {
        fn features(&self) -> &[f32] {
            &self.0
        }

        fn available_actions(&self) -> &[bool] {
            &self.1
        }
    }

    fn obs(available: &[bool]) -> TestObs {
        TestObs(vec![1.0, 0.5], available.to_vec())
    }

    fn config(n_steps: usize) -> PpoConfig<MlpConfig> {
        PpoConfig::default()
            .model_config(MlpConfig::new(2, vec![16], 3, false))
            .n_steps(n_steps)
            .k_epochs(4)
            .seed(0)
    }

    #[test]
    fn test_categorical() {
        let (probs, log_z) = categorical(&[0.0, f32::NEG_INFINITY, 0.0]);
        assert_eq!(probs, vec![0.5, 0.0, 0.5]);
        assert!((0.0 - log_z - 0.5f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_select_action_records_step() -> Result<()> {
        let mut ppo = Ppo::<Mlp, TestObs>::build(config(8))?;
        for i in 0..20 {
            let (a, logits) = ppo.select_action(&obs(&[true, false, true]))?;
            assert!(a == 0 || a == 2);
            assert_eq!(logits[1], f32::NEG_INFINITY);
            assert_eq!(ppo.buffer().len(), i + 1);
        }
        let entry = &ppo.buffer().entries()[0];
        assert!(entry.log_prob <= 0.0 && entry.log_prob.is_finite());
        assert!(!entry.done);

        let probs = ppo.action_probs(&obs(&[true, false, true]))?;
        assert_eq!(probs[1], 0.0);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_no_available_action() -> Result<()> {
        let mut ppo = Ppo::<Mlp, TestObs>::build(config(8))?;
        assert!(ppo.select_action(&obs(&[false, false, false])).is_err());
        assert!(ppo.buffer().is_empty());
        Ok(())
    }

    #[test]
    fn test_update_when_rollout_is_full() -> Result<()> {
        let mut ppo = Ppo::<Mlp, TestObs>::build(config(3).grad_clip(Some(0.5)))?;
        let available = [true, true, true];

        for i in 0..2 {
            let (a, _) = ppo.select_action(&obs(&available))?;
            let record = ppo.learn(i, obs(&available), a, 1.0, obs(&available), false)?;
            assert!(record.is_empty());
        }
        let (a, _) = ppo.select_action(&obs(&available))?;
        let record = ppo.learn(2, obs(&available), a, 1.0, obs(&available), false)?;

        assert!(record.get_scalar("avg-loss")?.is_finite());
        assert!(record.get_scalar("entropy")? > 0.0);
        assert!(record.get_scalar("grad_norm").is_ok());
        assert!(ppo.buffer().is_empty());
        assert_eq!(ppo.n_opts(), 4);
        Ok(())
    }

    #[test]
    fn test_episode_end_marks_done_and_optionally_updates() -> Result<()> {
        let available = [true, true, true];

        let mut ppo = Ppo::<Mlp, TestObs>::build(config(10))?;
        let (a, _) = ppo.select_action(&obs(&available))?;
        ppo.learn(0, obs(&available), a, 1.0, obs(&available), false)?;
        assert!(ppo.notify_episode_end()?.is_empty());
        assert!(ppo.buffer().last_done());

        let mut ppo = Ppo::<Mlp, TestObs>::build(config(10).update_on_episode_end(true))?;
        let (a, _) = ppo.select_action(&obs(&available))?;
        ppo.learn(0, obs(&available), a, 1.0, obs(&available), false)?;
        let record = ppo.notify_episode_end()?;
        assert!(record.get_scalar("avg-loss").is_ok());
        assert!(ppo.buffer().is_empty());

        // Nothing collected, nothing to mark
        assert!(ppo.notify_episode_end()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_terminal_step_is_not_bootstrapped() -> Result<()> {
        let available = [true, true, true];

        let mut ppo = Ppo::<Mlp, TestObs>::build(config(2))?;
        let (a, _) = ppo.select_action(&obs(&available))?;
        assert!(ppo.learn(0, obs(&available), a, 1.0, obs(&available), true)?.is_empty());
        assert!(ppo.buffer().last_done());
        assert_eq!(ppo.bootstrap_value(&obs(&available))?, 0.0);
        let (_, targets) = ppo.advantages(ppo.bootstrap_value(&obs(&available))?);
        assert!((targets[0] - 1.0).abs() < 1e-5, "{:?}", targets);

        // Episode end coinciding with a full rollout
        let mut ppo = Ppo::<Mlp, TestObs>::build(config(1))?;
        let (a, _) = ppo.select_action(&obs(&available))?;
        let record = ppo.learn(0, obs(&available), a, 1.0, obs(&available), true)?;
        assert!(record.get_scalar("value_loss")?.is_finite());
        assert!(ppo.buffer().is_empty());
        assert!(ppo.notify_episode_end()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_policy_improves_on_bandit() -> Result<()> {
        let config = config(8)
            .opt_config(OptimizerConfig::Adam { lr: 1e-2 })
            .advantage(AdvantageEstimator::MonteCarlo)
            .normalize_advantage(true);
        let mut ppo = Ppo::<Mlp, TestObs>::build(config)?;
        let available = [true, true, true];
        let p_before = ppo.action_probs(&obs(&available))?[2];

        for i in 0..240 {
            let (a, _) = ppo.select_action(&obs(&available))?;
            let reward = if a == 2 { 1.0 } else { 0.0 };
            ppo.learn(i, obs(&available), a, reward, obs(&available), true)?;
            ppo.notify_episode_end()?;
        }

        let p_after = ppo.action_probs(&obs(&available))?[2];
        assert!(p_after > p_before, "{} -> {}", p_before, p_after);
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = TempDir::new("ppo")?;
        let o = obs(&[true, true, true]);
        let ppo = Ppo::<Mlp, TestObs>::build(config(4))?;
        ppo.save_params(dir.path())?;

        let mut ppo_ = Ppo::<Mlp, TestObs>::build(config(4))?;
        ppo_.load_params(dir.path())?;
        assert_eq!(ppo.action_probs(&o)?, ppo_.action_probs(&o)?);
        Ok(())
    }
}
