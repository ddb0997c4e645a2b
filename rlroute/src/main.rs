use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{info, warn};
use rlroute::{create_recorder, AlgoConfig, RecorderKind, Runner, RunnerConfig, TransportConfig};
use rlroute_candle_agent::dqn::EpsilonGreedy;
use rlroute_core::Device;
use std::{path::PathBuf, sync::atomic::Ordering};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Socket,
    Pipe,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Algo {
    Dqn,
    Ppo,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RecorderArg {
    Csv,
    Tensorboard,
    All,
    None,
}

/// Train a routing agent against an optimization engine
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML configuration of the runner; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Communication mode
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// TCP port of the socket mode
    #[arg(long)]
    port: Option<u16>,

    /// Named pipe carrying messages from the engine
    #[arg(long, default_value = "/tmp/rlroute_in")]
    input_pipe: PathBuf,

    /// Named pipe carrying messages to the engine
    #[arg(long, default_value = "/tmp/rlroute_out")]
    output_pipe: PathBuf,

    /// Learning algorithm
    #[arg(long, value_enum)]
    algo: Option<Algo>,

    /// Compute device: cpu, gpu or cuda:<n>
    #[arg(long)]
    device: Option<Device>,

    /// Learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Exploration rate of DQN
    #[arg(long)]
    epsilon: Option<f64>,

    /// Batch size of DQN, rollout length of PPO
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum global gradient norm
    #[arg(long)]
    grad_clip: Option<f64>,

    /// Use double DQN
    #[arg(long, default_value_t = false)]
    double_q: bool,

    /// Serve peers one after another
    #[arg(long, default_value_t = false)]
    keep_alive: bool,

    /// Where metrics are written
    #[arg(long, value_enum)]
    recorder: Option<RecorderArg>,

    /// Directory of metrics
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Directory where parameters are saved
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Seed of the algorithm's RNGs
    #[arg(long)]
    seed: Option<u64>,
}

fn algo_config(args: &Args, config: AlgoConfig) -> AlgoConfig {
    let config = match (args.algo, config) {
        (Some(Algo::Dqn), config @ AlgoConfig::Dqn(_)) => config,
        (Some(Algo::Ppo), config @ AlgoConfig::Ppo(_)) => config,
        (Some(Algo::Dqn), _) => AlgoConfig::dqn(),
        (Some(Algo::Ppo), _) => AlgoConfig::ppo(),
        (None, config) => config,
    };
    let config = match args.lr {
        Some(lr) => config.learning_rate(lr),
        None => config,
    };
    let config = match args.grad_clip {
        Some(v) => config.grad_clip(v),
        None => config,
    };
    let config = match args.seed {
        Some(seed) => config.seed(seed),
        None => config,
    };

    match config {
        AlgoConfig::Dqn(mut config) => {
            if let Some(eps) = args.epsilon {
                config = config.explorer(EpsilonGreedy::constant(eps));
            }
            if let Some(batch_size) = args.batch_size {
                config = config.batch_size(batch_size);
            }
            if args.double_q {
                config = config.double_dqn(true);
            }
            AlgoConfig::Dqn(config)
        }
        AlgoConfig::Ppo(mut config) => {
            if args.epsilon.is_some() || args.double_q {
                warn!("--epsilon and --double-q are ignored by PPO");
            }
            if let Some(batch_size) = args.batch_size {
                config = config.n_steps(batch_size);
            }
            AlgoConfig::Ppo(config)
        }
    }
}

fn runner_config(args: &Args) -> Result<RunnerConfig> {
    let mut config = match &args.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };

    config.transport = match (args.mode, config.transport) {
        (Some(Mode::Pipe), _) => TransportConfig::Pipe {
            input: args.input_pipe.clone(),
            output: args.output_pipe.clone(),
        },
        (Some(Mode::Socket) | None, TransportConfig::Socket { port }) => TransportConfig::Socket {
            port: args.port.unwrap_or(port),
        },
        (Some(Mode::Socket), TransportConfig::Pipe { .. }) => TransportConfig::Socket {
            port: args.port.unwrap_or(rlroute::DEFAULT_PORT),
        },
        (None, transport @ TransportConfig::Pipe { .. }) => transport,
    };
    config.algo = algo_config(args, config.algo);
    if let Some(device) = args.device {
        config.device = device;
    }
    if let Some(recorder) = args.recorder {
        config.recorder = match recorder {
            RecorderArg::Csv => RecorderKind::Csv,
            RecorderArg::Tensorboard => RecorderKind::Tensorboard,
            RecorderArg::All => RecorderKind::All,
            RecorderArg::None => RecorderKind::None,
        };
    }
    if let Some(log_dir) = &args.log_dir {
        config.log_dir = log_dir.clone();
    }
    if args.model_dir.is_some() {
        config.model_dir = args.model_dir.clone();
    }
    config.keep_alive |= args.keep_alive;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = runner_config(&args)?;
    info!("{:?}", config);

    let recorder = create_recorder(config.recorder, &config.log_dir)?;
    let mut runner = Runner::new(config, recorder);

    let stop = runner.stop_handle();
    ctrlc::set_handler(move || {
        if stop.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        warn!("Stopping after the current exchange, interrupt again to exit now");
    })?;

    runner.run()
}
