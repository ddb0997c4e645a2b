#![warn(missing_docs)]
//! Environment adapter for the external pickup-and-delivery optimization engine.
//!
//! [`OptimEnv`] turns the request/reply exchange of a [`Bridge`](rlroute_bridge::Bridge)
//! into an episode-driven interface: [`OptimEnv::reset`] waits for the first
//! observation of an episode and [`OptimEnv::step`] sends an action and waits for
//! its reward and the next observation. Observations are built by a [`Problem`],
//! parsed from the STATIC_DATA message that opens a session.
mod env;
mod error;
mod obs;
mod problem;

pub use env::{OptimEnv, Reset, Step};
pub use error::EnvError;
pub use obs::RouteObs;
pub use problem::{ActionRequest, PdptwProblem, Problem, N_NODE_FEATURES};
