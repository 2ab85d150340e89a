use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete configuration for task generation and simulator orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    pub task: TaskConfig,
    pub simulator: SimulatorConfig,
    pub paths: PathsConfig,
}

/// Episode layout parameters shared by every task variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Robot footprint radius, used for forbidden zones (default: 0.3).
    pub robot_radius: f64,
    /// Static obstacles registered once by the factory (default: 10).
    pub static_obstacles: usize,
    /// Dynamic obstacles per random/manual reset (default: 3).
    pub dynamic_obstacles: usize,
    /// Consecutive placement failures tolerated per reset (default: 3).
    pub max_placement_attempts: usize,
    /// How long a manual reset waits for a goal, in seconds (default: 60).
    pub manual_goal_timeout_secs: u64,
    /// Reported repeat budget for scenario tasks (default: 1000).
    pub scenario_max_repeats: usize,
    /// Minimum start/goal separation in metres (default: 1.0).
    pub min_start_goal_distance: f64,
    /// Obstacle footprint radius in metres (default: 0.2).
    pub obstacle_radius: f64,
    /// Random draws per placement before giving up (default: 500).
    pub placement_samples: usize,
}

/// A command line with `{actors}`, `{world}` and `{model}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Arguments with every placeholder substituted.
    pub fn render_args(&self, actors: usize, world: &str, model: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| {
                a.replace("{actors}", &actors.to_string())
                    .replace("{world}", world)
                    .replace("{model}", model)
            })
            .collect()
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How to reach and (re)start the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Base URL of the simulator bridge.
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Run before relaunching, to stop simulators not owned by this process.
    pub kill_commands: Vec<CommandSpec>,
    /// Regenerates the world description for a new actor count.
    pub world_generator: CommandSpec,
    /// Starts the simulator; kept as an owned child process.
    pub launch: CommandSpec,
    pub world: String,
    pub model: String,
    /// Service polled for readiness after a relaunch.
    pub spawn_service: String,
    pub ready_timeout_secs: u64,
    pub ready_poll_interval_ms: u64,
    /// Pause after respawning the robot (default: 10).
    pub settle_delay_secs: u64,
}

/// Filesystem layout for agents and curriculum files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root under which each agent gets its own directory.
    pub agents_dir: PathBuf,
    /// Directory of `<name>.json` hyperparameter presets.
    pub hyperparams_dir: PathBuf,
    pub curriculum: PathBuf,
    #[serde(default)]
    pub scenario: Option<PathBuf>,
    pub tensorboard_dir: PathBuf,
    pub eval_log_dir: PathBuf,
}

impl TaskConfig {
    pub fn manual_goal_timeout(&self) -> Duration {
        Duration::from_secs(self.manual_goal_timeout_secs)
    }
}

impl SimulatorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

impl ArenaConfig {
    /// Read a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            task: TaskConfig {
                robot_radius: 0.3,
                static_obstacles: 10,
                dynamic_obstacles: 3,
                max_placement_attempts: 3,
                manual_goal_timeout_secs: 60,
                scenario_max_repeats: 1000,
                min_start_goal_distance: 1.0,
                obstacle_radius: 0.2,
                placement_samples: 500,
            },
            simulator: SimulatorConfig {
                base_url: "http://localhost:11400".into(),
                request_timeout_secs: 10,
                kill_commands: vec![
                    CommandSpec::new("killall", &["-q", "gzclient"]),
                    CommandSpec::new("killall", &["-q", "gzserver"]),
                ],
                world_generator: CommandSpec::new(
                    "rosrun",
                    &["task_generator", "generate_world.py", "--actors", "{actors}"],
                ),
                launch: CommandSpec::new(
                    "roslaunch",
                    &[
                        "arena_bringup",
                        "gazebo_simulator.launch",
                        "world:={world}",
                        "model:={model}",
                    ],
                ),
                world: "small_warehouse".into(),
                model: "turtlebot3_burger".into(),
                spawn_service: "/gazebo/spawn_urdf_model".into(),
                ready_timeout_secs: 60,
                ready_poll_interval_ms: 500,
                settle_delay_secs: 10,
            },
            paths: PathsConfig {
                agents_dir: "agents".into(),
                hyperparams_dir: "configs/hyperparameters".into(),
                curriculum: "configs/training_curriculum.yaml".into(),
                scenario: None,
                tensorboard_dir: "training_logs/tensorboard".into(),
                eval_log_dir: "training_logs/train_eval_log".into(),
            },
        }
    }
}
