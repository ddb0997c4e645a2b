use rlroute_core::Obs;

/// Observation of a route state.
///
/// `features` is the row-major `n_nodes x N_NODE_FEATURES` matrix built by
/// [`PdptwProblem`](crate::PdptwProblem).
#[derive(Debug, Clone, PartialEq)]
pub struct RouteObs {
    /// Flattened node feature matrix.
    pub features: Vec<f32>,

    /// Legal actions.
    pub available: Vec<bool>,
}

impl Obs for RouteObs {
    fn features(&self) -> &[f32] {
        &self.features
    }

    fn available_actions(&self) -> &[bool] {
        &self.available
    }
}
