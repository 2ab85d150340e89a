//! Agent naming and on-disk layout.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};

use super::hyperparams::HYPERPARAMS_FILE;
use crate::config::PathsConfig;

/// Layout of a custom MLP policy, used to derive a descriptive agent name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlpSpec {
    pub body: String,
    pub pi: String,
    pub vf: String,
    pub act_fn: String,
}

/// Name under which an agent is saved and loaded.
///
/// Examples: `MLP_B_64-64_P_32-32_V_32-32_relu_2021_01_07__10_32`,
/// `DRL_LOCAL_PLANNER_2021_01_08__07_14`. Loading an existing agent keeps its
/// name unchanged.
pub fn get_agent_name(
    agent: &str,
    load: Option<&str>,
    custom_mlp: Option<&MlpSpec>,
    now: DateTime<Local>,
) -> String {
    let stamp = now.format("%Y_%m_%d__%H_%M");
    if let Some(mlp) = custom_mlp {
        return format!(
            "MLP_B_{}_P_{}_V_{}_{}_{stamp}",
            mlp.body, mlp.pi, mlp.vf, mlp.act_fn
        );
    }
    match load {
        None => format!("{agent}_{stamp}"),
        Some(name) => name.to_string(),
    }
}

/// Resolved per-agent paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPaths {
    pub model: PathBuf,
    pub tensorboard: Option<PathBuf>,
    pub eval: Option<PathBuf>,
    pub hyperparams_dir: PathBuf,
    pub curriculum: PathBuf,
    pub scenario: Option<PathBuf>,
}

impl AgentPaths {
    /// Compute paths without touching the filesystem.
    pub fn new(config: &PathsConfig, agent_name: &str) -> Self {
        Self {
            model: config.agents_dir.join(agent_name),
            tensorboard: Some(config.tensorboard_dir.join(agent_name)),
            eval: Some(config.eval_log_dir.join(agent_name)),
            hyperparams_dir: config.hyperparams_dir.clone(),
            curriculum: config.curriculum.clone(),
            scenario: config.scenario.clone(),
        }
    }

    /// Compute paths and prepare the directories a run needs.
    ///
    /// A new agent gets a fresh model directory (it must not exist yet). A
    /// loaded agent must already have `<name>.zip` or `best_model.zip`.
    /// Evaluation and tensorboard directories are created when enabled and
    /// dropped otherwise.
    pub fn resolve(
        config: &PathsConfig,
        agent_name: &str,
        load: bool,
        eval_log: bool,
        tensorboard: bool,
    ) -> Result<Self> {
        let mut paths = Self::new(config, agent_name);

        if !load {
            if paths.model.exists() {
                bail!("agent directory {} already exists", paths.model.display());
            }
            std::fs::create_dir_all(&paths.model)
                .with_context(|| format!("Failed to create {}", paths.model.display()))?;
        } else {
            let named = paths.model.join(format!("{agent_name}.zip"));
            let best = paths.model.join("best_model.zip");
            if !named.is_file() && !best.is_file() {
                bail!(
                    "Couldn't find model named {agent_name}.zip or best_model.zip in {}",
                    paths.model.display()
                );
            }
        }

        paths.eval = if eval_log { paths.eval.take() } else { None };
        paths.tensorboard = if tensorboard {
            paths.tensorboard.take()
        } else {
            None
        };
        for dir in [&paths.eval, &paths.tensorboard].into_iter().flatten() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(paths)
    }

    /// The agent's `hyperparameters.json`.
    pub fn hyperparams_file(&self) -> PathBuf {
        self.model.join(HYPERPARAMS_FILE)
    }
}
