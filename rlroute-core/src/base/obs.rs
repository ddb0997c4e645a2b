//! Observation.
use std::fmt::Debug;

/// An observation of the routing environment as seen by a learning algorithm.
///
/// How the features are built is up to the problem collaborator. Algorithms only
/// rely on a flat feature view of fixed length and on the mask of legal actions.
pub trait Obs: Clone + Debug {
    /// Flat feature vector of the observation.
    fn features(&self) -> &[f32];

    /// Mask over the fixed action space, `true` where the action is legal.
    fn available_actions(&self) -> &[bool];

    /// Indices of the legal actions, in ascending order.
    fn available_indices(&self) -> Vec<usize> {
        self.available_actions()
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| if a { Some(i) } else { None })
            .collect()
    }
}
