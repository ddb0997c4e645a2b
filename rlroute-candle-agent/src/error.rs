use thiserror::Error;

/// Errors raised by learning algorithms.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The loss of an update is NaN or infinite.
    #[error("Non-finite loss {0} at optimization step {1}")]
    NonFiniteLoss(f32, usize),

    /// An observation allows no action.
    #[error("No available action in observation")]
    NoAvailableAction,

    /// A model configuration was not given.
    #[error("Model configuration `{0}` is not set")]
    MissingConfig(&'static str),
}
