use crate::{
    model::{ModelDims, SubModel1},
    opt::{Optimizer, OptimizerConfig},
    util::copy_weights,
    AgentError,
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`DqnModel`].
pub struct DqnModelConfig<Q> {
    pub q_config: Option<Q>,
    pub opt_config: OptimizerConfig,
}

impl<Q> Default for DqnModelConfig<Q> {
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::default(),
        }
    }
}

impl<Q> DqnModelConfig<Q>
where
    Q: DeserializeOwned + Serialize + ModelDims,
{
    /// Sets configurations for action-value function.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets input and output dimensions of the model.
    pub fn dims(mut self, in_dim: usize, out_dim: usize) -> Self {
        if let Some(q_config) = &mut self.q_config {
            q_config.set_in_dim(in_dim);
            q_config.set_out_dim(out_dim);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }
}

/// Action-value function with its own parameters and optimizer.
///
/// The online and the target networks of [`Dqn`](super::Dqn) are two
/// independent instances; [`DqnModel::copy_from`] synchronizes them.
pub struct DqnModel<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + ModelDims + Clone,
{
    varmap: VarMap,

    // Action-value function
    q: Q,

    opt_config: OptimizerConfig,
    q_config: Q::Config,
    opt: Optimizer,
}

impl<Q> DqnModel<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + ModelDims + Clone,
{
    /// Constructs [`DqnModel`].
    pub fn build(config: DqnModelConfig<Q::Config>, device: Device) -> Result<Self> {
        let q_config = config
            .q_config
            .ok_or(AgentError::MissingConfig("q_config"))?;
        let opt_config = config.opt_config;
        let varmap = VarMap::new();
        let q = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            Q::build(vb, q_config.clone())?
        };
        let opt = opt_config.build(varmap.all_vars())?;

        Ok(Self {
            varmap,
            q,
            opt_config,
            q_config,
            opt,
        })
    }

    /// Outputs the action-value given observation(s).
    pub fn forward(&self, obs: &Tensor) -> Result<Tensor> {
        self.q.forward(obs)
    }

    /// Backpropagates `loss` and updates the parameters.
    ///
    /// With `grad_clip`, returns the global gradient norm before clipping.
    pub fn backward_step(&mut self, loss: &Tensor, grad_clip: Option<f64>) -> Result<Option<f32>> {
        match grad_clip {
            None => {
                self.opt.backward_step(loss)?;
                Ok(None)
            }
            Some(max_norm) => Ok(Some(self.opt.backward_step_clip(loss, max_norm)?)),
        }
    }

    /// Copies the parameters of `src` into this model.
    pub fn copy_from(&mut self, src: &Self) -> Result<()> {
        copy_weights(&self.varmap, &src.varmap)
    }

    /// Rebuilds the parameters on `device`, keeping their values.
    ///
    /// The optimizer state is reset.
    pub fn to_device(&mut self, device: &Device) -> Result<()> {
        let varmap = VarMap::new();
        let q = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
            Q::build(vb, self.q_config.clone())?
        };
        copy_weights(&varmap, &self.varmap)?;
        self.opt = self.opt_config.build(varmap.all_vars())?;
        self.varmap = varmap;
        self.q = q;
        Ok(())
    }

    /// Saves the parameters in safetensors format.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save dqnmodel to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the parameters from a safetensors file.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load dqnmodel from {:?}", path.as_ref());
        Ok(())
    }
}
