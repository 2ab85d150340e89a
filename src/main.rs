//! arena-task: episode task generation for navigation training
//!
//! Provides subcommands around the task lifecycle:
//!
//! - `run`         -- Build a task and drive resets, as the training loop would
//! - `init-agent`  -- Create an agent directory and its hyperparameter record
//! - `stages`      -- Print the training curriculum
//! - `hyperparams` -- Print an agent's hyperparameter record

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use arena_task::config::ArenaConfig;
use arena_task::curriculum::StageTable;
use arena_task::error::TaskError;
use arena_task::params::ParamStore;
use arena_task::sim::{HttpSimulator, MockSimulator, MockSimulatorControl, Simulator};
use arena_task::task::{StageTrigger, Task, TaskFactory, TaskMode};
use arena_task::training::{
    get_agent_name, initialize_hyperparameters, print_hyperparameters, AgentPaths, HyperparamFile,
};
use arena_task::world::Pose;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Episode task generation for robot-navigation training.
#[derive(Parser)]
#[command(name = "arena-task", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-memory simulator instead of connecting to a live bridge.
    #[arg(long, global = true, default_value_t = false)]
    mock: bool,

    /// Override the simulator bridge URL from the configuration.
    #[arg(long, global = true)]
    sim_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a task and run a number of episode resets.
    Run {
        /// Task mode: random, staged, manual or scenario.
        #[arg(long, default_value = "random")]
        mode: String,

        /// Simulator namespace; `eval_sim` persists curriculum progress.
        #[arg(long, default_value = "sim_1")]
        ns: String,

        /// Curriculum stage to start from (staged mode).
        #[arg(long, default_value_t = 1)]
        start_stage: usize,

        /// Agent whose directory holds the hyperparameter record.
        #[arg(long, default_value = "DRL_LOCAL_PLANNER")]
        agent: String,

        /// Number of resets to perform.
        #[arg(long, default_value_t = 10)]
        episodes: usize,

        /// Trigger a stage advance every K episodes (staged mode).
        #[arg(long)]
        advance_every: Option<usize>,

        /// Goal delivered to manual resets, as `x,y`.
        #[arg(long, value_parser = parse_goal)]
        goal: Option<Pose>,
    },

    /// Create an agent directory and initialise its hyperparameters.
    InitAgent {
        /// Agent type used as the name prefix.
        #[arg(long, default_value = "DRL_LOCAL_PLANNER")]
        agent: String,

        /// Hyperparameter preset (without `.json`) for new agents.
        #[arg(long, default_value = "default")]
        config_name: String,

        /// Number of parallel training environments.
        #[arg(long, default_value_t = 1)]
        n_envs: u64,

        /// Continue an existing agent instead of creating a new one.
        #[arg(long)]
        load: Option<String>,
    },

    /// Print the training curriculum.
    Stages {
        /// Curriculum file (defaults to the configured one).
        #[arg(long)]
        curriculum: Option<PathBuf>,
    },

    /// Print an agent's hyperparameter record.
    Hyperparams {
        #[arg(long)]
        agent: String,
    },
}

fn parse_goal(s: &str) -> Result<Pose, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{s}`"))?;
    let x = x.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let y = y.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok(Pose::new(x, y, 0.0))
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ArenaConfig::load(path)?,
        None => ArenaConfig::default(),
    };
    if let Some(url) = &cli.sim_url {
        config.simulator.base_url = url.clone();
    }

    match cli.command {
        Commands::Run {
            mode,
            ns,
            start_stage,
            agent,
            episodes,
            advance_every,
            goal,
        } => {
            let opts = RunOptions {
                mode,
                ns,
                start_stage,
                agent,
                episodes,
                advance_every,
                goal,
            };
            cmd_run(config, cli.mock, opts)
        }
        Commands::InitAgent {
            agent,
            config_name,
            n_envs,
            load,
        } => cmd_init_agent(&config, &agent, &config_name, n_envs, load.as_deref()),
        Commands::Stages { curriculum } => {
            cmd_stages(curriculum.as_ref().unwrap_or(&config.paths.curriculum))
        }
        Commands::Hyperparams { agent } => cmd_hyperparams(&config, &agent),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

struct RunOptions {
    mode: String,
    ns: String,
    start_stage: usize,
    agent: String,
    episodes: usize,
    advance_every: Option<usize>,
    goal: Option<Pose>,
}

/// What the training thread tells the callback thread.
enum Callback {
    EpisodeStarting(usize),
    Shutdown,
}

fn cmd_run(config: ArenaConfig, mock: bool, opts: RunOptions) -> Result<()> {
    let params = ParamStore::new();
    let paths = AgentPaths::new(&config.paths, &opts.agent);

    let sim: Arc<dyn Simulator>;
    let factory = if mock {
        tracing::info!("Using mock simulator");
        let mock_sim = Arc::new(MockSimulator::new().with_robot(&config.simulator.model));
        sim = mock_sim.clone();
        TaskFactory::new(config.clone(), sim.clone(), params.clone())
            .with_simulator_control(Box::new(MockSimulatorControl::new(mock_sim)))
            .with_seed(0)
    } else {
        tracing::info!(url = %config.simulator.base_url, "Using simulator bridge");
        sim = Arc::new(HttpSimulator::new(
            &config.simulator.base_url,
            config.simulator.request_timeout(),
        )?);
        TaskFactory::new(config.clone(), sim.clone(), params.clone())
    };

    let task = Arc::new(
        factory
            .build(&opts.ns, &opts.mode, opts.start_stage, &paths)
            .with_context(|| format!("Failed to build {} task", opts.mode))?,
    );
    if task.mode() == TaskMode::Manual && opts.goal.is_none() {
        bail!("manual mode needs --goal x,y");
    }

    let (tx, rx) = mpsc::channel::<Callback>();
    let callbacks = {
        let task = task.clone();
        let sim = sim.clone();
        let advance_every = opts.advance_every;
        let goal = opts.goal;
        thread::spawn(move || run_callbacks(&task, sim.as_ref(), rx, advance_every, goal))
    };

    let mut failures = 0usize;
    for episode in 0..opts.episodes {
        // Send fails only if the callback thread has already exited.
        let _ = tx.send(Callback::EpisodeStarting(episode));
        match task.reset() {
            Ok(info) => {
                let info = serde_json::to_string(&info)?;
                tracing::info!(episode, %info, "episode reset");
            }
            // Exhausted placement retries only cost this episode.
            Err(e) if e.is_recoverable() || matches!(e, TaskError::PlacementExhausted { .. }) => {
                failures += 1;
                tracing::warn!(episode, error = %e, "reset failed");
            }
            Err(e) => {
                let _ = tx.send(Callback::Shutdown);
                if callbacks.join().is_err() {
                    tracing::error!("callback thread panicked");
                }
                return Err(e).with_context(|| format!("episode {episode} reset failed"));
            }
        }
    }
    let _ = tx.send(Callback::Shutdown);
    if callbacks.join().is_err() {
        bail!("callback thread panicked");
    }

    tracing::info!(
        episodes = opts.episodes,
        failures,
        params = ?params.snapshot(),
        "run complete"
    );
    Ok(())
}

/// Stand-in for the simulator's subscriber thread: delivers manual goals,
/// curriculum triggers and map refreshes.
fn run_callbacks(
    task: &Task,
    sim: &dyn Simulator,
    rx: mpsc::Receiver<Callback>,
    advance_every: Option<usize>,
    goal: Option<Pose>,
) {
    while let Ok(Callback::EpisodeStarting(episode)) = rx.recv() {
        if let (Some(inbox), Some(goal)) = (task.goal_inbox(), goal) {
            inbox.publish(goal);
            continue;
        }

        if let Some(k) = advance_every.filter(|k| *k > 0) {
            if episode > 0 && episode % k == 0 {
                match task.on_trigger(StageTrigger::Advance) {
                    Ok(changed) => tracing::info!(episode, changed, "advance trigger handled"),
                    Err(e) => tracing::error!(episode, error = %e, "advance trigger failed"),
                }
            }
        }

        match sim.get_map() {
            Ok(map) => task.update_map(map),
            Err(e) => tracing::warn!(error = %e, "map refresh failed"),
        }
    }
}

fn cmd_init_agent(
    config: &ArenaConfig,
    agent: &str,
    config_name: &str,
    n_envs: u64,
    load: Option<&str>,
) -> Result<()> {
    let name = get_agent_name(agent, load, None, chrono::Local::now());
    let paths = AgentPaths::resolve(&config.paths, &name, load.is_some(), true, true)?;
    initialize_hyperparameters(&paths, load, config_name, n_envs)?;
    tracing::info!(agent = %name, path = %paths.model.display(), "agent ready");
    Ok(())
}

fn cmd_stages(path: &PathBuf) -> Result<()> {
    let stages = StageTable::load(path)?;

    println!("Curriculum: {}", path.display());
    println!("  Stages: {}", stages.len());
    println!();
    println!("  {:>5}  {:>7}  {:>7}", "stage", "static", "dynamic");
    for (index, stage) in stages.iter() {
        println!(
            "  {:>5}  {:>7}  {:>7}",
            index, stage.static_count, stage.dynamic_count
        );
    }
    Ok(())
}

fn cmd_hyperparams(config: &ArenaConfig, agent: &str) -> Result<()> {
    let paths = AgentPaths::new(&config.paths, agent);
    let params = HyperparamFile::for_agent(&paths.model).load()?;
    print_hyperparameters(&params);
    Ok(())
}
