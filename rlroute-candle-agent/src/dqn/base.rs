//! DQN agent implemented with candle.
use super::{config::DqnConfig, explorer::EpsilonGreedy, model::DqnModel};
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
use log::trace;
use rand::{rngs::SmallRng, SeedableRng};
use rlroute_core::{
    record::{Record, RecordValue},
    replay_buffer::ReplayMemory,
    Algo, Obs,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, path::Path};

/// Values of next states used in the TD target.
///
/// * `online_next` - action values of the online network for double DQN, `None` otherwise.
/// * `target_next` - action values of the target network, `[n, n_actions]`.
/// * `mask` - availability of actions in the next states, `u8` of `[n, n_actions]`.
///
/// With double DQN, the action is the argmax of the masked online values and its
/// value is read from the target network. Otherwise the value is the maximum of
/// the masked target values.
pub fn next_state_values(
    online_next: Option<&Tensor>,
    target_next: &Tensor,
    mask: &Tensor,
) -> Result<Tensor> {
    let target_next = masked_fill(target_next, mask)?;
    match online_next {
        Some(online_next) => {
            let ixs = masked_fill(online_next, mask)?.argmax_keepdim(D::Minus1)?;
            gather_rows(&target_next, &ixs)
        }
        None => Ok(target_next.max(D::Minus1)?),
    }
}

#[allow(clippy::upper_case_acronyms)]
/// DQN agent implemented with candle.
///
/// Transitions are stored in an owned [`ReplayMemory`]; an update runs on every
/// call of [`Algo::learn`] once the memory holds a full batch.
pub struct Dqn<Q, O>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + ModelDims + Clone,
    O: Obs,
{
    pub(in crate::dqn) qnet: DqnModel<Q>,
    pub(in crate::dqn) qnet_tgt: DqnModel<Q>,
    pub(in crate::dqn) memory: ReplayMemory<O>,
    pub(in crate::dqn) batch_size: usize,
    pub(in crate::dqn) discount_factor: f64,
    pub(in crate::dqn) target_update_interval: usize,
    pub(in crate::dqn) double_dqn: bool,
    pub(in crate::dqn) grad_clip: Option<f64>,
    pub(in crate::dqn) explorer: EpsilonGreedy,
    pub(in crate::dqn) device: Device,
    pub(in crate::dqn) n_opts: usize,
    rng: SmallRng,
}

impl<Q, O> Dqn<Q, O>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + ModelDims + Clone,
    O: Obs,
{
    /// Constructs DQN agent.
    ///
    /// The target network starts as a copy of the online network.
    pub fn build(config: DqnConfig<Q::Config>) -> Result<Self> {
        let device = candle_device(config.device)?;
        let qnet = DqnModel::build(config.model_config.clone(), device.clone())?;
        let mut qnet_tgt = DqnModel::build(config.model_config, device.clone())?;
        qnet_tgt.copy_from(&qnet)?;

        Ok(Dqn {
            qnet,
            qnet_tgt,
            memory: ReplayMemory::build(&config.memory_config),
            batch_size: config.batch_size.max(1),
            discount_factor: config.discount_factor,
            target_update_interval: config.target_update_interval.max(1),
            double_dqn: config.double_dqn,
            grad_clip: config.grad_clip,
            explorer: config.explorer,
            device,
            n_opts: 0,
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }

    /// Replay memory of the agent.
    pub fn memory(&self) -> &ReplayMemory<O> {
        &self.memory
    }

    /// Number of optimization steps done so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Action values of the online network for one observation.
    pub fn action_values(&self, obs: &O) -> Result<Vec<f32>> {
        let x = obs_tensor(std::slice::from_ref(obs), &self.device)?;
        Ok(self.qnet.forward(&x)?.squeeze(0)?.to_vec1::<f32>()?)
    }

    fn update(&mut self) -> Result<Record> {
        let batch = self.memory.sample(self.batch_size)?;
        let obs = obs_tensor(&batch.obs, &self.device)?;
        let actions = action_tensor(&batch.actions, &self.device)?;
        let rewards = vec_tensor(&batch.rewards, &self.device)?;
        let is_not_done = {
            let is_not_done = batch.dones.iter().map(|&d| if d { 0f32 } else { 1f32 });
            vec_tensor(&is_not_done.collect::<Vec<_>>(), &self.device)?
        };

        let pred = gather_rows(&self.qnet.forward(&obs)?, &actions)?;

        let tgt = {
            let next_obs = obs_tensor(&batch.next_obs, &self.device)?;
            let mask = mask_tensor(&batch.next_obs, &self.device)?;
            let online_next = match self.double_dqn {
                true => Some(self.qnet.forward(&next_obs)?),
                false => None,
            };
            let target_next = self.qnet_tgt.forward(&next_obs)?;
            let q = next_state_values(online_next.as_ref(), &target_next, &mask)?;
            (&rewards + (&is_not_done * &q)?.affine(self.discount_factor, 0.0)?)?.detach()
        };

        let td_errs = (&pred - &tgt)?;
        let loss = td_errs.sqr()?.mean_all()?;
        let (is_finite, loss_value) = is_finite_scalar(&loss)?;
        if !is_finite {
            return Err(AgentError::NonFiniteLoss(loss_value, self.n_opts).into());
        }

        let grad_norm = self.qnet.backward_step(&loss, self.grad_clip)?;
        self.n_opts += 1;

        if self.n_opts % self.target_update_interval == 0 {
            trace!("Hard update of the target network at {}", self.n_opts);
            self.qnet_tgt.copy_from(&self.qnet)?;
        }

        if self.memory.is_prioritized() {
            let td_errs = td_errs.abs()?.to_vec1::<f32>()?;
            self.memory.update_priorities(&td_errs)?;
        }

        let mut record = Record::from_slice(&[
            ("loss", RecordValue::Scalar(loss_value)),
            ("epsilon", RecordValue::Scalar(self.explorer.eps() as f32)),
        ]);
        if let Some(grad_norm) = grad_norm {
            record.insert("grad_norm", RecordValue::Scalar(grad_norm));
        }
        Ok(record)
    }
}

impl<Q, O> Algo<O> for Dqn<Q, O>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + ModelDims + Clone,
    O: Obs,
{
    /// Returns the action values with unavailable actions set to negative infinity.
    fn select_action(&mut self, obs: &O) -> Result<(usize, Vec<f32>)> {
        let values = mask_values(&self.action_values(obs)?, obs.available_actions());
        let act = self
            .explorer
            .action(&values, &obs.available_indices(), &mut self.rng)?;
        Ok((act, values))
    }

    fn learn(
        &mut self,
        _step: usize,
        obs: O,
        action: usize,
        reward: f32,
        next_obs: O,
        done: bool,
    ) -> Result<Record> {
        self.memory.add(obs, action, reward, next_obs);
        if done {
            self.memory.end_episode();
        }
        if !self.memory.can_sample(self.batch_size) {
            return Ok(Record::empty());
        }
        self.update()
    }

    fn notify_episode_end(&mut self) -> Result<Record> {
        self.memory.end_episode();
        Ok(Record::empty())
    }

    fn move_to_device(&mut self, device: rlroute_core::Device) -> Result<()> {
        let device = candle_device(device)?;
        self.qnet.to_device(&device)?;
        self.qnet_tgt.to_device(&device)?;
        self.device = device;
        Ok(())
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.qnet.save(path.join("qnet.safetensors"))?;
        self.qnet_tgt.save(path.join("qnet_tgt.safetensors"))?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.qnet.load(path.join("qnet.safetensors"))?;
        self.qnet_tgt.load(path.join("qnet_tgt.safetensors"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::{Mlp, MlpConfig};
    use rlroute_core::replay_buffer::{PerConfig, ReplayMemoryConfig};
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

    fn obs(x: f32, available: &[bool]) -> TestObs {
        TestObs(vec![x, 1.0 - x], available.to_vec())
    }

    fn config(batch_size: usize) -> DqnConfig<MlpConfig> {
        DqnConfig::default()
            .q_config(MlpConfig::new(2, vec![8], 3, false))
            .batch_size(batch_size)
            .target_update_interval(2)
            .memory_config(ReplayMemoryConfig::default().capacity(16))
            .seed(0)
    }

    fn online_and_target_values(
        dqn: &Dqn<Mlp, TestObs>,
        o: &TestObs,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        let x = obs_tensor(std::slice::from_ref(o), &dqn.device)?;
        let q = dqn.qnet.forward(&x)?.squeeze(0)?.to_vec1::<f32>()?;
        let q_tgt = dqn.qnet_tgt.forward(&x)?.squeeze(0)?.to_vec1::<f32>()?;
        Ok((q, q_tgt))
    }

    #[test]
    fn test_next_state_values() -> Result<()> {
        let device = Device::Cpu;
        let online = Tensor::new(&[[1f32, 0., 5.]], &device)?;
        let target = Tensor::new(&[[2f32, 3., 9.]], &device)?;
        let mask = Tensor::new(&[[1u8, 1, 0]], &device)?;

        let single = next_state_values(None, &target, &mask)?.to_vec1::<f32>()?;
        assert_eq!(single, vec![3.0]);

        let double = next_state_values(Some(&online), &target, &mask)?.to_vec1::<f32>()?;
        assert_eq!(double, vec![2.0]);
        Ok(())
    }

    #[test]
    fn test_select_action_respects_mask() -> Result<()> {
        let mut dqn = Dqn::<Mlp, TestObs>::build(config(4).explorer(EpsilonGreedy::constant(1.0)))?;
        for _ in 0..50 {
            let (a, values) = dqn.select_action(&obs(0.5, &[false, true, false]))?;
            assert_eq!(a, 1);
            assert_eq!(values.len(), 3);
            assert_eq!(values[0], f32::NEG_INFINITY);
            assert!(values[1].is_finite());
        }
        Ok(())
    }

    #[test]
    fn test_learn_updates_after_warmup() -> Result<()> {
        let mut dqn = Dqn::<Mlp, TestObs>::build(config(4).grad_clip(Some(1.0)))?;
        let available = [true, true, true];

        let o = obs(0.0, &available);

        for i in 0..3 {
            let record = dqn.learn(i, obs(0.0, &available), 0, 1.0, obs(1.0, &available), false)?;
            assert!(record.is_empty());
        }
        let (q, q_tgt) = online_and_target_values(&dqn, &o)?;
        assert_eq!(q, q_tgt);

        let record = dqn.learn(3, obs(0.0, &available), 1, 1.0, obs(1.0, &available), false)?;
        assert!(record.get_scalar("loss")?.is_finite());
        assert!(record.get_scalar("grad_norm").is_ok());
        assert_eq!(dqn.n_opts(), 1);

        // The target network lags until the second optimization step
        let (q, q_tgt) = online_and_target_values(&dqn, &o)?;
        assert_ne!(q, q_tgt);

        dqn.notify_episode_end()?;
        assert!(dqn.memory().iter().last().unwrap().done);

        dqn.learn(4, obs(0.0, &available), 2, 0.0, obs(1.0, &available), false)?;
        assert_eq!(dqn.n_opts(), 2);
        let (q, q_tgt) = online_and_target_values(&dqn, &o)?;
        assert_eq!(q, q_tgt);
        Ok(())
    }

    #[test]
    fn test_terminal_transition_is_not_bootstrapped() -> Result<()> {
        let mut dqn = Dqn::<Mlp, TestObs>::build(config(1))?;
        let available = [true, true, true];
        let o = obs(0.0, &available);
        let pred = dqn.action_values(&o)?[0];

        let record = dqn.learn(0, o.clone(), 0, 1.0, obs(1.0, &available), true)?;
        assert!(dqn.memory().iter().last().unwrap().done);

        // The target is the reward alone
        let loss = record.get_scalar("loss")?;
        assert!((loss - (pred - 1.0).powi(2)).abs() < 1e-5, "{} {}", loss, pred);
        Ok(())
    }

    #[test]
    fn test_prioritized_memory_gets_td_errors() -> Result<()> {
        let memory_config = ReplayMemoryConfig::default()
            .capacity(8)
            .per_config(Some(PerConfig::default()));
        let mut dqn = Dqn::<Mlp, TestObs>::build(config(2).memory_config(memory_config))?;
        let available = [true, true, true];

        dqn.learn(0, obs(0.0, &available), 0, 5.0, obs(1.0, &available), false)?;
        dqn.learn(1, obs(1.0, &available), 1, -5.0, obs(0.0, &available), false)?;

        // Both slots leave the default priority once the update wrote |td|.
        let p0 = dqn.memory().priority(0).unwrap();
        let p1 = dqn.memory().priority(1).unwrap();
        assert!(p0 != 1.0 || p1 != 1.0);
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = TempDir::new("dqn")?;
        let o = obs(0.3, &[true, true, true]);

        let dqn = Dqn::<Mlp, TestObs>::build(config(4).seed(1))?;
        dqn.save_params(dir.path())?;
        assert!(dir.path().join("qnet.safetensors").exists());
        assert!(dir.path().join("qnet_tgt.safetensors").exists());

        let mut dqn_ = Dqn::<Mlp, TestObs>::build(config(4).seed(2))?;
        dqn_.load_params(dir.path())?;
        assert_eq!(dqn.action_values(&o)?, dqn_.action_values(&o)?);

        dqn_.move_to_device(rlroute_core::Device::Cpu)?;
        assert_eq!(dqn.action_values(&o)?, dqn_.action_values(&o)?);
        Ok(())
    }
}
