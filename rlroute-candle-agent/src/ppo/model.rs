use crate::{
    model::{ModelDims, SubModel1},
    opt::{Optimizer, OptimizerConfig},
    util::copy_weights,
    AgentError,
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Actor and critic sharing one set of parameters and one optimizer.
///
/// The actor outputs per-action logits, the critic a scalar state value.
pub struct ActorCritic<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + ModelDims + Clone,
{
    varmap: VarMap,
    actor: Q,
    critic: Q,
    actor_config: Q::Config,
    critic_config: Q::Config,
    opt_config: OptimizerConfig,
    opt: Optimizer,
}

impl<Q> ActorCritic<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + ModelDims + Clone,
{
    fn build_models(
        varmap: &VarMap,
        actor_config: &Q::Config,
        critic_config: &Q::Config,
        device: &Device,
    ) -> Result<(Q, Q)> {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        let actor = Q::build(vb.pp("actor"), actor_config.clone())?;
        let critic = Q::build(vb.pp("critic"), critic_config.clone())?;
        Ok((actor, critic))
    }

    /// Constructs [`ActorCritic`].
    pub fn build(
        actor_config: Option<Q::Config>,
        critic_config: Option<Q::Config>,
        opt_config: OptimizerConfig,
        device: Device,
    ) -> Result<Self> {
        let actor_config = actor_config.ok_or(AgentError::MissingConfig("actor_config"))?;
        let critic_config = critic_config.ok_or(AgentError::MissingConfig("critic_config"))?;
        let varmap = VarMap::new();
        let (actor, critic) = Self::build_models(&varmap, &actor_config, &critic_config, &device)?;
        let opt = opt_config.build(varmap.all_vars())?;

        Ok(Self {
            varmap,
            actor,
            critic,
            actor_config,
            critic_config,
            opt_config,
            opt,
        })
    }

    /// Returns logits `[n, n_actions]` and state values `[n]`.
    pub fn forward(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        let logits = self.actor.forward(obs)?;
        let values = self.critic.forward(obs)?.squeeze(D::Minus1)?;
        Ok((logits, values))
    }

    /// State values `[n]`.
    pub fn value(&self, obs: &Tensor) -> Result<Tensor> {
        Ok(self.critic.forward(obs)?.squeeze(D::Minus1)?)
    }

    /// Backpropagates `loss` through actor and critic and takes one optimizer step.
    pub fn backward_step(&mut self, loss: &Tensor, grad_clip: Option<f64>) -> Result<Option<f32>> {
        match grad_clip {
            None => {
                self.opt.backward_step(loss)?;
                Ok(None)
            }
            Some(max_norm) => Ok(Some(self.opt.backward_step_clip(loss, max_norm)?)),
        }
    }

    /// Rebuilds the parameters on `device`, keeping their values and resetting the optimizer.
    pub fn to_device(&mut self, device: &Device) -> Result<()> {
        let varmap = VarMap::new();
        let (actor, critic) =
            Self::build_models(&varmap, &self.actor_config, &self.critic_config, device)?;
        copy_weights(&varmap, &self.varmap)?;
        self.opt = self.opt_config.build(varmap.all_vars())?;
        self.varmap = varmap;
        self.actor = actor;
        self.critic = critic;
        Ok(())
    }

    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save actor-critic to {:?}", path.as_ref());
        Ok(())
    }

    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load actor-critic from {:?}", path.as_ref());
        Ok(())
    }
}
