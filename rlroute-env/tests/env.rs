use anyhow::Result;
use rlroute_bridge::{Bridge, BridgeError, Message, MessageType, Transport};
use rlroute_env::{OptimEnv, PdptwProblem, Reset, RouteObs, Step};
use std::io;

const STATIC_DATA: &[u8] = br#"{
    "vehicles": [{"capacity": 5}],
    "nodes": [
        {"nodeId": 0, "positionXY": [0.0, 1.0], "earliestArrival": 0, "latestArrival": 10,
         "duration": 1, "quantity": 2},
        {"nodeId": 1, "positionXY": [1.0, 0.0], "earliestArrival": 0, "latestArrival": 10,
         "duration": 1, "quantity": -2}
    ],
    "nActions": 2
}"#;

/// Replays scripted peer messages and records what is sent back.
struct Scripted {
    incoming: Vec<u8>,
    pos: usize,
    sent: Vec<Message>,
}

impl Scripted {
    fn new(msgs: &[Message]) -> Self {
        Self {
            incoming: msgs.iter().flat_map(|m| m.to_bytes()).collect(),
            pos: 0,
            sent: vec![],
        }
    }
}

impl Transport for Scripted {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let end = (self.pos + n).min(self.incoming.len());
        let out = self.incoming[self.pos..end].to_vec();
        self.pos = end;
        Ok(out)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut t = Scripted {
            incoming: bytes.to_vec(),
            pos: 0,
            sent: vec![],
        };
        let msg = Message::recv(&mut t).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.sent.push(msg);
        Ok(())
    }
}

fn request(available: &str) -> Message {
    let json = format!(r#"{{"routes": [[0]], "available": {}}}"#, available);
    Message::action_request(json.as_bytes())
}

fn env(msgs: &[Message]) -> Result<OptimEnv<PdptwProblem, Scripted>> {
    let problem = PdptwProblem::parse(STATIC_DATA)?;
    Ok(OptimEnv::new(problem, Bridge::new(Scripted::new(msgs))))
}

fn sent(env: OptimEnv<PdptwProblem, Scripted>) -> Vec<Message> {
    env.into_bridge().into_inner().sent
}

#[test]
fn episode_with_two_steps() -> Result<()> {
    let mut env = env(&[
        request("[true, false]"),
        Message::reward(1.0),
        request("[false, true]"),
        Message::reward(-2.0),
        Message::end_episode(),
    ])?;

    let obs = match env.reset()? {
        Reset::Obs(obs) => obs,
        r => panic!("unexpected {:?}", r),
    };
    assert_eq!(obs.available, vec![true, false]);
    assert_eq!(obs.features.len(), 20);

    let obs: RouteObs = match env.step(0)? {
        Step::Next { obs, reward } => {
            assert_eq!(reward, 1.0);
            obs
        }
        s => panic!("unexpected {:?}", s),
    };
    assert_eq!(obs.available, vec![false, true]);

    assert_eq!(env.step(1)?, Step::Final { reward: -2.0 });

    let sent = sent(env);
    let actions = sent
        .iter()
        .map(|m| m.action_index().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(actions, vec![0, 1]);
    Ok(())
}

#[test]
fn episode_ends_without_reward() -> Result<()> {
    let mut env = env(&[request("[true]"), Message::end_episode(), Message::end_episode()])?;
    assert!(matches!(env.reset()?, Reset::Obs(_)));
    assert_eq!(env.step(0)?, Step::EpisodeEnd);
    assert_eq!(env.reset()?, Reset::EpisodeEnd);
    Ok(())
}

#[test]
fn unexpected_message_is_reported() -> Result<()> {
    let mut env = env(&[request("[true]"), Message::ack()])?;
    assert!(matches!(env.reset()?, Reset::Obs(_)));

    let err = env.step(0).unwrap_err();
    match err.downcast_ref::<BridgeError>() {
        Some(BridgeError::ProtocolViolation { expected, actual }) => {
            assert_eq!(*expected, "REWARD or END_EPISODE");
            assert_eq!(*actual, MessageType::Ack);
        }
        e => panic!("unexpected {:?}", e),
    }

    let sent = sent(env);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].msg_type(), MessageType::Error);
    assert!(sent[1].reason()?.contains("expected REWARD or END_EPISODE, got ACK"));
    Ok(())
}

#[test]
fn disconnect_is_connection_closed() -> Result<()> {
    let mut env = env(&[])?;
    let err = env.reset().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BridgeError>(),
        Some(BridgeError::ConnectionClosed { stage: "header" })
    ));
    Ok(())
}
