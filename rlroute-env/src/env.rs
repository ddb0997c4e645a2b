use crate::{problem::ActionRequest, Problem};
use anyhow::Result;
use rlroute_bridge::{Bridge, BridgeError, Message, MessageType, Transport};

/// Outcome of [`OptimEnv::reset`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reset<O> {
    /// First observation of the episode.
    Obs(O),

    /// The peer ended the episode before asking for an action.
    EpisodeEnd,
}

/// Outcome of [`OptimEnv::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step<O> {
    /// Reward of the action and the next observation.
    Next {
        /// Observation after the action.
        obs: O,
        /// Reward of the action.
        reward: f32,
    },

    /// Reward of the action, after which the peer ended the episode.
    Final {
        /// Reward of the action.
        reward: f32,
    },

    /// The peer ended the episode without rewarding the action.
    EpisodeEnd,
}

/// Episode state machine over a [`Bridge`].
///
/// ```text
/// AwaitingObservation --ACTION_REQUEST--> observation
///                     --END_EPISODE-----> episode end
/// (send ACTION_RESPONSE)
/// AwaitingReward      --REWARD----------> AwaitingObservation
///                     --END_EPISODE-----> episode end
/// ```
///
/// Any other message is a protocol violation: an ERROR message is sent to the
/// peer if possible and [`BridgeError::ProtocolViolation`] is returned.
pub struct OptimEnv<P: Problem, T: Transport> {
    problem: P,
    bridge: Bridge<T>,
}

impl<P: Problem, T: Transport> OptimEnv<P, T> {
    /// Constructs the environment of a session whose problem has been received.
    pub fn new(problem: P, bridge: Bridge<T>) -> Self {
        Self { problem, bridge }
    }

    /// The problem of the session.
    pub fn problem(&self) -> &P {
        &self.problem
    }

    /// Returns the bridge, ending the session.
    pub fn into_bridge(self) -> Bridge<T> {
        self.bridge
    }

    /// Waits for the first observation of an episode.
    pub fn reset(&mut self) -> Result<Reset<P::Obs>> {
        Ok(match self.await_observation()? {
            Some(obs) => Reset::Obs(obs),
            None => Reset::EpisodeEnd,
        })
    }

    /// Sends `action` and waits for its reward and the next observation.
    pub fn step(&mut self, action: usize) -> Result<Step<P::Obs>> {
        self.bridge.send(&Message::action_response(action as i32))?;

        let msg = self.bridge.recv()?;
        let reward = match msg.msg_type() {
            MessageType::Reward => msg.reward_value()?,
            MessageType::EndEpisode => return Ok(Step::EpisodeEnd),
            _ => return Err(self.violation("REWARD or END_EPISODE", &msg).into()),
        };

        Ok(match self.await_observation()? {
            Some(obs) => Step::Next { obs, reward },
            None => Step::Final { reward },
        })
    }

    /// `None` when the peer ends the episode.
    fn await_observation(&mut self) -> Result<Option<P::Obs>> {
        let msg = self.bridge.recv()?;
        match msg.msg_type() {
            MessageType::ActionRequest => {
                let request = ActionRequest::parse(&msg.payload)?;
                Ok(Some(self.problem.observe(&request)?))
            }
            MessageType::EndEpisode => Ok(None),
            _ => Err(self
                .violation("ACTION_REQUEST or END_EPISODE", &msg)
                .into()),
        }
    }

    fn violation(&mut self, expected: &'static str, msg: &Message) -> BridgeError {
        if msg.msg_type() == MessageType::Error {
            log::error!(
                "Peer reported an error: {}",
                msg.reason().unwrap_or_else(|e| e.to_string())
            );
        }
        let err = BridgeError::ProtocolViolation {
            expected,
            actual: msg.msg_type(),
        };
        if let Err(e) = self.bridge.send(&Message::error(&err.to_string())) {
            log::warn!("Failed to report protocol violation to the peer: {}", e);
        }
        err
    }
}
