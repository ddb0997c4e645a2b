//! Optimizers.
use anyhow::Result;
use candle_core::{backprop::GradStore, Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::adam::{Adam, ParamsAdam};
use serde::{Deserialize, Serialize};

/// Configuration of optimizer for training neural networks in an agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,
        /// Exponential decay rate of the first moment.
        #[serde(default = "default_beta1")]
        beta1: f64,
        /// Exponential decay rate of the second moment.
        #[serde(default = "default_beta2")]
        beta2: f64,
        /// Term added to the denominator for numerical stability.
        #[serde(default = "default_eps")]
        eps: f64,
        /// Weight decay.
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl OptimizerConfig {
    /// Constructs an optimizer updating `vars`.
    pub fn build(&self, vars: Vec<Var>) -> Result<Optimizer> {
        let opt = match &self {
            OptimizerConfig::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr: *lr,
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    weight_decay: *weight_decay,
                };
                OptimizerKind::AdamW(AdamW::new(vars.clone(), params)?)
            }
            OptimizerConfig::Adam { lr } => {
                let params = ParamsAdam {
                    lr: *lr,
                    ..ParamsAdam::default()
                };
                OptimizerKind::Adam(Adam::new(vars.clone(), params)?)
            }
        };
        Ok(Optimizer { opt, vars })
    }

    /// Override learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::AdamW {
                lr: _,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            },
            Self::Adam { lr: _ } => Self::Adam { lr },
        }
    }

    /// Learning rate.
    pub fn get_learning_rate(&self) -> f64 {
        match self {
            Self::AdamW { lr, .. } => *lr,
            Self::Adam { lr } => *lr,
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam { lr: 1e-4 }
    }
}

enum OptimizerKind {
    AdamW(AdamW),
    Adam(Adam),
}

/// Optimizer with the variables it updates.
pub struct Optimizer {
    opt: OptimizerKind,
    vars: Vec<Var>,
}

impl Optimizer {
    /// Applies a backward step pass.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step(&grads)
    }

    /// Applies a backward step pass, rescaling gradients whose global L2 norm
    /// exceeds `max_norm`.
    ///
    /// Returns the norm before clipping.
    pub fn backward_step_clip(&mut self, loss: &Tensor, max_norm: f64) -> Result<f32> {
        let mut grads = loss.backward()?;
        let norm = clip_grads(&mut grads, &self.vars, max_norm)?;
        self.step(&grads)?;
        Ok(norm)
    }

    /// Updates the variables with the given gradients.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match &mut self.opt {
            OptimizerKind::AdamW(opt) => Ok(opt.step(grads)?),
            OptimizerKind::Adam(opt) => Ok(opt.step(grads)?),
        }
    }
}

/// Rescales the gradients of `vars` in place so that their global L2 norm is at
/// most `max_norm`. Returns the norm before rescaling.
pub fn clip_grads(grads: &mut GradStore, vars: &[Var], max_norm: f64) -> Result<f32> {
    let norm = grad_norm(grads, vars)?;
    if norm as f64 > max_norm {
        let scale = max_norm / (norm as f64 + 1e-6);
        for var in vars.iter() {
            if let Some(g) = grads.remove(var.as_tensor()) {
                grads.insert(var.as_tensor(), (g * scale)?);
            }
        }
    }
    Ok(norm)
}

/// Global L2 norm of the gradients of `vars`.
pub fn grad_norm(grads: &GradStore, vars: &[Var]) -> Result<f32> {
    let mut sq = 0f32;
    for var in vars.iter() {
        if let Some(g) = grads.get(var.as_tensor()) {
            sq += g.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    Ok(sq.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_clip_grad_norm() -> Result<()> {
        let var = Var::from_tensor(&Tensor::new(&[3f32, 4f32], &Device::Cpu)?)?;
        let config = OptimizerConfig::AdamW {
            lr: 0.0,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        };
        let mut opt = config.build(vec![var.clone()])?;

        // d/dx sum(x^2) = 2x = [6, 8], norm 10
        let loss = var.as_tensor().sqr()?.sum_all()?;
        let norm = opt.backward_step_clip(&loss, 1.0)?;
        assert!((norm - 10.0).abs() < 1e-5);

        let mut grads = loss.backward()?;
        let vars = [var.clone()];
        assert!((clip_grads(&mut grads, &vars, 1.0)? - 10.0).abs() < 1e-5);
        assert!((grad_norm(&grads, &vars)? - 1.0).abs() < 1e-4);
        let g = grads.get(var.as_tensor()).unwrap().to_vec1::<f32>()?;
        assert!((g[0] - 0.6).abs() < 1e-4 && (g[1] - 0.8).abs() < 1e-4);

        // Below the threshold the gradients are left untouched
        let mut grads = loss.backward()?;
        assert!((clip_grads(&mut grads, &vars, 20.0)? - 10.0).abs() < 1e-5);
        assert!((grad_norm(&grads, &vars)? - 10.0).abs() < 1e-5);
        assert_eq!(var.as_tensor().dtype(), DType::F32);
        Ok(())
    }

    #[test]
    fn test_learning_rate_override() {
        let config = OptimizerConfig::default().learning_rate(0.5);
        assert_eq!(config.get_learning_rate(), 0.5);
        assert_eq!(config, OptimizerConfig::Adam { lr: 0.5 });
    }
}
