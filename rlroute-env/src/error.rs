use thiserror::Error;

/// Errors raised while building problems and observations.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A payload is not the expected JSON document.
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The problem has no vehicle or no node.
    #[error("Problem has {n_vehicles} vehicles and {n_nodes} nodes")]
    EmptyProblem {
        /// Number of vehicles.
        n_vehicles: usize,
        /// Number of nodes.
        n_nodes: usize,
    },

    /// A route refers to a node absent from the problem.
    #[error("Unknown node id {0}")]
    UnknownNode(i64),

    /// The availability mask is longer than the action space.
    #[error("Availability mask has {actual} entries, action space has {expected}")]
    MaskTooLong {
        /// Size of the action space.
        expected: usize,
        /// Length of the received mask.
        actual: usize,
    },

    /// The availability mask allows no action.
    #[error("No action is available")]
    NoAvailableAction,
}
