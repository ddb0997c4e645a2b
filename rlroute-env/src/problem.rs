//! Pickup-and-delivery problem instances.
use crate::{EnvError, RouteObs};
use rlroute_core::Obs;
use serde::Deserialize;
use std::collections::HashMap;

/// Number of features per node: 6 static, 4 depending on the routes.
pub const N_NODE_FEATURES: usize = 10;

/// Size of the action space when the problem does not give one.
const DEFAULT_N_ACTIONS: usize = 5;

/// Builds observations from the route state sent by the peer.
pub trait Problem {
    /// Observation type.
    type Obs: Obs;

    /// Size of the fixed action space.
    fn n_actions(&self) -> usize;

    /// Length of the feature vector of an observation.
    fn obs_dim(&self) -> usize;

    /// Builds the observation of an ACTION_REQUEST.
    fn observe(&self, request: &ActionRequest) -> Result<Self::Obs, EnvError>;
}

/// Payload of an ACTION_REQUEST message.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ActionRequest {
    /// Node ids visited by each vehicle, in visiting order.
    pub routes: Vec<Vec<i64>>,

    /// Legal actions.
    pub available: Vec<bool>,
}

impl ActionRequest {
    /// Parses the JSON payload.
    pub fn parse(data: &[u8]) -> Result<Self, EnvError> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[derive(Debug, Deserialize)]
struct StaticData {
    vehicles: Vec<VehicleData>,
    nodes: Vec<NodeData>,
    #[serde(rename = "nActions")]
    n_actions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct VehicleData {
    capacity: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeData {
    node_id: i64,
    #[serde(rename = "positionXY")]
    position_xy: [f32; 2],
    earliest_arrival: f32,
    latest_arrival: f32,
    duration: f32,
    quantity: f32,
}

#[derive(Debug, Clone)]
struct Node {
    x: f32,
    y: f32,
    earliest_arrival: f32,
    latest_arrival: f32,
    duration: f32,
    /// Load change at the node, negative for deliveries.
    delta_load: f32,
}

/// Pickup-and-delivery problem with time windows.
///
/// Every node is described by its static features
/// `[x, y, ea / t_max, la / t_max, duration / t_max, quantity / capacity]`
/// followed by features of the current routes
/// `[assigned, position / route_len, vehicle / n_vehicles, load / capacity]`,
/// where `load` is the vehicle load after visiting the node.
#[derive(Debug, Clone)]
pub struct PdptwProblem {
    n_vehicles: usize,
    vehicle_capacity: f32,
    nodes: Vec<Node>,
    node_index: HashMap<i64, usize>,
    t_max: f32,
    n_actions: usize,
    static_features: Vec<[f32; 6]>,
}

impl PdptwProblem {
    /// Parses the JSON payload of a STATIC_DATA message.
    ///
    /// The capacity of the first vehicle is taken as the capacity of the fleet.
    pub fn parse(data: &[u8]) -> Result<Self, EnvError> {
        let data: StaticData = serde_json::from_slice(data)?;
        if data.vehicles.is_empty() || data.nodes.is_empty() {
            return Err(EnvError::EmptyProblem {
                n_vehicles: data.vehicles.len(),
                n_nodes: data.nodes.len(),
            });
        }

        let node_index = data
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.node_id, i))
            .collect::<HashMap<_, _>>();
        let nodes = data
            .nodes
            .iter()
            .map(|node| Node {
                x: node.position_xy[0],
                y: node.position_xy[1],
                earliest_arrival: node.earliest_arrival,
                latest_arrival: node.latest_arrival,
                duration: node.duration,
                delta_load: node.quantity,
            })
            .collect::<Vec<_>>();

        let mut problem = Self {
            n_vehicles: data.vehicles.len(),
            vehicle_capacity: data.vehicles[0].capacity,
            t_max: t_max(&nodes),
            nodes,
            node_index,
            n_actions: data.n_actions.unwrap_or(DEFAULT_N_ACTIONS),
            static_features: vec![],
        };
        problem.static_features = problem
            .nodes
            .iter()
            .map(|node| {
                [
                    node.x,
                    node.y,
                    node.earliest_arrival / problem.t_max,
                    node.latest_arrival / problem.t_max,
                    node.duration / problem.t_max,
                    node.delta_load / problem.capacity_norm(),
                ]
            })
            .collect();
        log::info!(
            "Parsed problem: {} vehicles (capacity {}), {} nodes, t_max {}, {} actions",
            problem.n_vehicles,
            problem.vehicle_capacity,
            problem.nodes.len(),
            problem.t_max,
            problem.n_actions
        );

        Ok(problem)
    }

    /// Number of vehicles.
    pub fn n_vehicles(&self) -> usize {
        self.n_vehicles
    }

    /// Capacity of a vehicle.
    pub fn vehicle_capacity(&self) -> f32 {
        self.vehicle_capacity
    }

    /// Number of nodes.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Time horizon used to normalize times.
    pub fn t_max(&self) -> f32 {
        self.t_max
    }

    fn capacity_norm(&self) -> f32 {
        if self.vehicle_capacity == 0f32 {
            1f32
        } else {
            self.vehicle_capacity
        }
    }
}

/// Latest arrival plus service time plus distance to the depot of the node
/// closing last; `1` when that sum is zero.
fn t_max(nodes: &[Node]) -> f32 {
    let latest = nodes.iter().fold(&nodes[0], |latest, node| {
        if node.latest_arrival > latest.latest_arrival {
            node
        } else {
            latest
        }
    });
    let time_to_depot = (latest.x.powi(2) + latest.y.powi(2)).round().sqrt();
    let t_max = latest.latest_arrival + latest.duration + time_to_depot;
    if t_max == 0f32 {
        1f32
    } else {
        t_max
    }
}

impl Problem for PdptwProblem {
    type Obs = RouteObs;

    fn n_actions(&self) -> usize {
        self.n_actions
    }

    fn obs_dim(&self) -> usize {
        self.nodes.len() * N_NODE_FEATURES
    }

    /// Builds the feature matrix of the routes.
    ///
    /// A mask shorter than the action space is padded with unavailable actions.
    fn observe(&self, request: &ActionRequest) -> Result<RouteObs, EnvError> {
        let n_actions = self.n_actions;
        if request.available.len() > n_actions {
            return Err(EnvError::MaskTooLong {
                expected: n_actions,
                actual: request.available.len(),
            });
        }
        if !request.available.iter().any(|&a| a) {
            return Err(EnvError::NoAvailableAction);
        }
        let mut available = request.available.clone();
        available.resize(n_actions, false);

        let mut dynamic = vec![[0f32; 4]; self.nodes.len()];
        let capacity = self.capacity_norm();
        for (vehicle, route) in request.routes.iter().enumerate() {
            let mut load = 0f32;
            for (position, node_id) in route.iter().enumerate() {
                let ix = *self
                    .node_index
                    .get(node_id)
                    .ok_or(EnvError::UnknownNode(*node_id))?;
                load += self.nodes[ix].delta_load;
                dynamic[ix] = [
                    1f32,
                    position as f32 / route.len() as f32,
                    vehicle as f32 / self.n_vehicles as f32,
                    load / capacity,
                ];
            }
        }

        let features = self
            .static_features
            .iter()
            .zip(dynamic.iter())
            .flat_map(|(s, d)| s.iter().chain(d.iter()).copied())
            .collect();

        Ok(RouteObs {
            features,
            available,
        })
    }
}
