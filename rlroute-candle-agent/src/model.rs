//! Interface of neural networks used in the agents.
use anyhow::Result;
use candle_nn::VarBuilder;

/// Neural network model not owning its [`VarMap`] internally.
///
/// Several sub-models can be built on one [`VarMap`] with prefixed
/// [`VarBuilder`]s, so that a single optimizer updates them jointly.
///
/// [`VarMap`]: candle_nn::VarMap
pub trait SubModel1 {
    /// Configuration from which [`SubModel1`] is constructed.
    type Config;

    /// Input of the [`SubModel1`].
    type Input;

    /// Output of the [`SubModel1`].
    type Output;

    /// Builds [`SubModel1`] with [`VarBuilder`] and [`SubModel1::Config`].
    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// A generalized forward function.
    fn forward(&self, input: &Self::Input) -> Result<Self::Output>;
}

/// Input and output dimensions of a model configuration.
///
/// The dimensions depend on the problem received from the peer, so they are
/// set on the configuration after the problem is known.
pub trait ModelDims {
    /// Returns the input dimension.
    fn get_in_dim(&self) -> usize;

    /// Sets the input dimension.
    fn set_in_dim(&mut self, in_dim: usize);

    /// Returns the output dimension.
    fn get_out_dim(&self) -> usize;

    /// Sets the output dimension.
    fn set_out_dim(&mut self, out_dim: usize);
}
