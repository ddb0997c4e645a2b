//! Training loop over sessions with the optimization engine.
use crate::config::{AlgoConfig, RunnerConfig, TransportConfig};
use anyhow::Result;
use log::{error, info, warn};
use rlroute_bridge::{
    transport::SocketListener, Bridge, BridgeError, Message, MessageType, Transport,
};
use rlroute_candle_agent::{dqn::Dqn, mlp::Mlp, ppo::Ppo};
use rlroute_core::{
    record::{Record, RecordValue, Recorder},
    Algo, Device, Obs,
};
use rlroute_env::{EnvError, OptimEnv, PdptwProblem, Problem, Reset, RouteObs, Step};
use std::{
    io::ErrorKind,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Returns `true` if `err` means the peer went away.
pub fn is_connection_closed(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<BridgeError>() {
        Some(BridgeError::ConnectionClosed { .. }) => true,
        Some(BridgeError::Io(e)) => matches!(
            e.kind(),
            ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}

/// Errors ending one session only: protocol and problem errors.
///
/// Other errors, such as a non-finite loss, stop the runner.
fn is_session_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<BridgeError>().is_some() || err.downcast_ref::<EnvError>().is_some()
}

/// Waits for the STATIC_DATA message opening a session and acknowledges it.
///
/// Any other message is answered with an ERROR message.
pub fn retrieve_problem<T: Transport>(bridge: &mut Bridge<T>) -> Result<PdptwProblem> {
    info!("Waiting for static problem data");
    let msg = bridge.recv()?;
    if msg.msg_type() != MessageType::StaticData {
        let err = BridgeError::ProtocolViolation {
            expected: "STATIC_DATA",
            actual: msg.msg_type(),
        };
        error!("{}", err);
        bridge.send(&Message::error(&err.to_string()))?;
        return Err(err.into());
    }

    match PdptwProblem::parse(&msg.payload) {
        Ok(problem) => {
            bridge.send(&Message::ack())?;
            Ok(problem)
        }
        Err(e) => {
            error!("Invalid problem data: {}", e);
            bridge.send(&Message::error(&e.to_string()))?;
            Err(e.into())
        }
    }
}

/// Builds the algorithm of `config` for a problem with `obs_dim` features and `n_actions` actions.
pub fn build_algo(
    config: &AlgoConfig,
    obs_dim: usize,
    n_actions: usize,
) -> Result<Box<dyn Algo<RouteObs>>> {
    Ok(match config.clone() {
        AlgoConfig::Dqn(config) => {
            Box::new(Dqn::<Mlp, RouteObs>::build(config.dims(obs_dim, n_actions))?)
        }
        AlgoConfig::Ppo(config) => {
            Box::new(Ppo::<Mlp, RouteObs>::build(config.dims(obs_dim, n_actions))?)
        }
    })
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Trains an algorithm in lock-step with the optimization engine.
///
/// # Session
///
/// 1. Wait for STATIC_DATA, parse the problem and reply with ACK.
/// 2. Build the algorithm with input dimension `obs_dim` and output dimension
///    `n_actions` of the problem, and move it to the configured device. A
///    checkpoint in `model_dir` is loaded first; one that does not fit the
///    problem is ignored.
/// 3. Repeat episodes until the peer disconnects or the runner is stopped:
///     1. [`OptimEnv::reset`] waits for the first observation.
///     2. The algorithm selects an action, [`OptimEnv::step`] sends it and waits
///        for the reward and the next observation.
///     3. The algorithm learns from the transition and the step is recorded with
///        keys `action`, `reward`, `q-i` and the logs of the algorithm.
///     4. When the peer ends the episode, [`Algo::notify_episode_end`] is called
///        and `episode`, `episode_return` and `episode_length` are recorded.
/// 4. Save the parameters in `model_dir`, if configured.
///
/// A disconnect of the peer ends the session without error. With `keep_alive`,
/// the runner then waits for the next peer. Every session builds a new algorithm,
/// so learning carries over between peers only through `model_dir`.
///
/// ```mermaid
/// graph LR
///     A[Algo]-->|action|B[OptimEnv]
///     B -->|obs, reward|A
///     B <-->|Message|C[Bridge]
///     A -->|Record|D[Recorder]
/// ```
pub struct Runner<R: Recorder> {
    config: RunnerConfig,
    recorder: R,
    stop: Arc<AtomicBool>,

    /// Environment steps over all sessions.
    env_steps: usize,

    /// Completed episodes over all sessions.
    episodes: usize,
}

impl<R: Recorder> Runner<R> {
    /// Constructs a runner writing metrics to `recorder`.
    pub fn new(config: RunnerConfig, recorder: R) -> Self {
        Self {
            config,
            recorder,
            stop: Arc::new(AtomicBool::new(false)),
            env_steps: 0,
            episodes: 0,
        }
    }

    /// Flag stopping the runner at the next step once set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn env_steps(&self) -> usize {
        self.env_steps
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }

    /// Serves peers over the configured transport, then closes the recorder.
    pub fn run(&mut self) -> Result<()> {
        info!("Starting runner with {}", self.config.algo.name());
        let result = match self.config.transport.clone() {
            TransportConfig::Socket { port } => {
                let listener = SocketListener::bind(port)?;
                self.serve_socket(&listener)
            }
            #[cfg(unix)]
            TransportConfig::Pipe { input, output } => self.serve_pipes(&input, &output),
            #[cfg(not(unix))]
            TransportConfig::Pipe { .. } => {
                Err(anyhow::anyhow!("Named pipes require a Unix platform"))
            }
        };
        let closed = self.recorder.close();
        info!("Stopping runner");
        result.and(closed)
    }

    /// Serves peers connecting to `listener`.
    pub fn serve_socket(&mut self, listener: &SocketListener) -> Result<()> {
        loop {
            let transport = listener.accept()?;
            let result = self.serve(Bridge::new(transport));
            if !self.config.keep_alive {
                return result;
            }
            match result {
                Err(e) if !is_session_error(&e) => return Err(e),
                Err(e) => error!("Session failed: {:#}", e),
                Ok(()) => {}
            }
            if self.is_stopped() {
                return Ok(());
            }
        }
    }

    /// Serves peers on a pair of named pipes, recreated for every peer.
    #[cfg(unix)]
    pub fn serve_pipes(
        &mut self,
        input: &std::path::Path,
        output: &std::path::Path,
    ) -> Result<()> {
        use rlroute_bridge::transport::NamedPipeTransport;
        loop {
            let transport = NamedPipeTransport::open(input, output)?;
            let result = self.serve(Bridge::new(transport));
            if !self.config.keep_alive {
                return result;
            }
            match result {
                Err(e) if !is_session_error(&e) => return Err(e),
                Err(e) => error!("Session failed: {:#}", e),
                Ok(()) => {}
            }
            if self.is_stopped() {
                return Ok(());
            }
        }
    }

    /// Runs one session with a connected peer.
    ///
    /// The bridge, and so the transport, is released on return.
    pub fn serve<T: Transport>(&mut self, mut bridge: Bridge<T>) -> Result<()> {
        let problem = match retrieve_problem(&mut bridge) {
            Err(e) if is_connection_closed(&e) => {
                error!("Connection with remote closed before static data");
                return Ok(());
            }
            r => r?,
        };

        let mut algo = build_algo(&self.config.algo, problem.obs_dim(), problem.n_actions())?;
        if let Some(model_dir) = self.config.model_dir.as_ref().filter(|d| d.is_dir()) {
            match algo.load_params(model_dir) {
                Ok(()) => info!("Resumed from {:?}", model_dir),
                Err(e) => {
                    warn!("Checkpoint in {:?} not loaded, starting fresh: {:#}", model_dir, e);
                    algo = build_algo(&self.config.algo, problem.obs_dim(), problem.n_actions())?;
                }
            }
        }
        if self.config.device != Device::Cpu {
            algo.move_to_device(self.config.device)?;
        }

        let mut env = OptimEnv::new(problem, bridge);
        self.train(&mut env, algo.as_mut())?;

        if let Some(model_dir) = &self.config.model_dir {
            algo.save_params(model_dir)?;
        }
        self.recorder.flush()
    }

    /// Runs episodes until the peer disconnects or the runner is stopped.
    pub fn train<P, T, A>(&mut self, env: &mut OptimEnv<P, T>, algo: &mut A) -> Result<()>
    where
        P: Problem,
        T: Transport,
        A: Algo<P::Obs> + ?Sized,
    {
        match self.train_(env, algo) {
            Err(e) if is_connection_closed(&e) => {
                error!("Connection with remote closed: {}", e);
                Ok(())
            }
            r => r,
        }
    }

    fn train_<P, T, A>(&mut self, env: &mut OptimEnv<P, T>, algo: &mut A) -> Result<()>
    where
        P: Problem,
        T: Transport,
        A: Algo<P::Obs> + ?Sized,
    {
        while !self.is_stopped() {
            let mut obs = match env.reset()? {
                Reset::Obs(obs) => obs,
                Reset::EpisodeEnd => {
                    warn!("Episode ended before any action request");
                    self.end_episode::<P::Obs, A>(algo, 0f32, 0)?;
                    continue;
                }
            };

            let mut episode_return = 0f32;
            let mut episode_length = 0;
            loop {
                if self.is_stopped() {
                    return Ok(());
                }
                self.env_steps += 1;
                let t = self.env_steps;

                let (action, values) = algo.select_action(&obs)?;
                let (reward, next_obs) = match env.step(action)? {
                    Step::Next { obs, reward } => (reward, Some(obs)),
                    Step::Final { reward } => (reward, None),
                    Step::EpisodeEnd => break,
                };
                episode_return += reward;
                episode_length += 1;

                let done = next_obs.is_none();
                let learn_obs = next_obs.clone().unwrap_or_else(|| obs.clone());
                let logs = algo.learn(t, obs, action, reward, learn_obs, done)?;
                self.recorder.write(t, step_record(action, reward, &values).merge(logs))?;

                match next_obs {
                    Some(next_obs) => obs = next_obs,
                    None => break,
                }
            }
            self.end_episode::<P::Obs, A>(algo, episode_return, episode_length)?;
        }
        Ok(())
    }

    fn end_episode<O, A>(
        &mut self,
        algo: &mut A,
        episode_return: f32,
        episode_length: usize,
    ) -> Result<()>
    where
        O: Obs,
        A: Algo<O> + ?Sized,
    {
        let logs = algo.notify_episode_end()?;
        self.episodes += 1;
        info!(
            "Episode {}: return {}, length {}",
            self.episodes, episode_return, episode_length
        );

        let record = Record::from_slice(&[
            ("episode", RecordValue::Scalar(self.episodes as f32)),
            ("episode_return", RecordValue::Scalar(episode_return)),
            ("episode_length", RecordValue::Scalar(episode_length as f32)),
        ]);
        self.recorder.write(self.env_steps, record.merge(logs))
    }
}

fn step_record(action: usize, reward: f32, values: &[f32]) -> Record {
    let mut record = Record::from_slice(&[
        ("action", RecordValue::Scalar(action as f32)),
        ("reward", RecordValue::Scalar(reward)),
    ]);
    for (i, v) in values.iter().enumerate() {
        record.insert(format!("q-{}", i), RecordValue::Scalar(*v));
    }
    record
}
