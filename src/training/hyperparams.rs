//! Agent hyperparameter records.
//!
//! Each agent directory holds a flat `hyperparameters.json`. The training
//! driver, the evaluation environment and the curriculum controller all
//! rewrite parts of it, possibly from different processes, so every
//! read-modify-write goes through [`HyperparamFile`], which holds an advisory
//! lock on `hyperparameters.json.lock` for the whole cycle.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::paths::AgentPaths;
use crate::error::{ConfigError, TaskError};
use crate::task::TaskMode;

/// File name of the per-agent record.
pub const HYPERPARAMS_FILE: &str = "hyperparameters.json";

/// Keys every record must carry.
pub const HYPERPARAM_KEYS: [&str; 21] = [
    "agent_name",
    "robot",
    "batch_size",
    "gamma",
    "n_steps",
    "ent_coef",
    "learning_rate",
    "vf_coef",
    "max_grad_norm",
    "gae_lambda",
    "m_batch_size",
    "n_epochs",
    "clip_range",
    "reward_fnc",
    "discrete_action_space",
    "normalize",
    "task_mode",
    "curr_stage",
    "train_max_steps_per_episode",
    "eval_max_steps_per_episode",
    "goal_radius",
];

/// Keys a record may carry in addition to [`HYPERPARAM_KEYS`].
pub const OPTIONAL_KEYS: [&str; 1] = ["n_timesteps"];

pub type Hyperparams = Map<String, Value>;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check the key set and the types of the fields that steer task generation.
pub fn check_hyperparam_format(params: &Hyperparams) -> Result<(), ConfigError> {
    let expected: BTreeSet<&str> = HYPERPARAM_KEYS.iter().copied().collect();
    let present: BTreeSet<&str> = params.keys().map(String::as_str).collect();

    let missing: Vec<&str> = expected.difference(&present).copied().collect();
    let unused: Vec<&str> = present
        .difference(&expected)
        .copied()
        .filter(|k| !OPTIONAL_KEYS.contains(k))
        .collect();
    if !missing.is_empty() || !unused.is_empty() {
        return Err(ConfigError::HyperparamFormat(format!(
            "unmatching keys, following keys missing: {missing:?}, following keys unused: {unused:?}"
        )));
    }

    if !params["discrete_action_space"].is_boolean() {
        return Err(ConfigError::HyperparamFormat(
            "parameter 'discrete_action_space' not of type bool".into(),
        ));
    }
    match params["task_mode"].as_str() {
        Some(mode) if mode.parse::<TaskMode>().is_ok() => Ok(()),
        _ => Err(ConfigError::HyperparamFormat(
            "parameter 'task_mode' has unknown value".into(),
        )),
    }
}

/// Validate batch sizing for `n_envs` parallel environments.
pub fn check_batch_size(n_envs: u64, batch_size: u64, m_batch_size: u64) -> Result<(), ConfigError> {
    let fail = |msg: String| Err(ConfigError::HyperparamFormat(msg));
    if n_envs == 0 || m_batch_size == 0 {
        return fail("n_envs and mini batch size must be positive".into());
    }
    if batch_size <= m_batch_size {
        return fail(format!(
            "mini batch size {m_batch_size} is bigger than batch size {batch_size}"
        ));
    }
    if batch_size % m_batch_size != 0 {
        return fail(format!(
            "batch size {batch_size} isn't divisible by mini batch size {m_batch_size}"
        ));
    }
    if batch_size % n_envs != 0 {
        return fail(format!(
            "batch size {batch_size} isn't divisible by n_envs {n_envs}"
        ));
    }
    Ok(())
}

fn require_u64(params: &Hyperparams, key: &str) -> Result<u64, ConfigError> {
    params.get(key).and_then(Value::as_u64).ok_or_else(|| {
        ConfigError::HyperparamFormat(format!("parameter '{key}' not of type unsigned integer"))
    })
}

// ---------------------------------------------------------------------------
// Locked file access
// ---------------------------------------------------------------------------

/// Releases the advisory lock when dropped.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// A hyperparameter JSON file plus its sibling lock file.
#[derive(Debug, Clone)]
pub struct HyperparamFile {
    path: PathBuf,
    lock_path: PathBuf,
}

impl HyperparamFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: lock_path.into(),
        }
    }

    /// The record inside an agent's model directory.
    pub fn for_agent(model_dir: impl AsRef<Path>) -> Self {
        Self::new(model_dir.as_ref().join(HYPERPARAMS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn io_err(&self, source: std::io::Error) -> TaskError {
        TaskError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn acquire(&self, exclusive: bool) -> Result<LockGuard, TaskError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| self.io_err(e))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| self.io_err(e))?;
        Ok(LockGuard { file })
    }

    fn read_unlocked(&self) -> Result<Hyperparams, TaskError> {
        if !self.exists() {
            return Err(ConfigError::HyperparamsMissing(self.path.clone()).into());
        }
        let text = std::fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        serde_json::from_str(&text).map_err(|e| {
            ConfigError::HyperparamsMalformed {
                path: self.path.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn write_unlocked(&self, params: &Hyperparams) -> Result<(), TaskError> {
        // Four-space indentation keeps the files diffable against the presets.
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        params
            .serialize(&mut ser)
            .map_err(|e| self.io_err(std::io::Error::other(e)))?;
        std::fs::write(&self.path, buf).map_err(|e| self.io_err(e))
    }

    /// Read the record under a shared lock.
    pub fn load(&self) -> Result<Hyperparams, TaskError> {
        let _guard = self.acquire(false)?;
        self.read_unlocked()
    }

    /// Replace the record under an exclusive lock.
    pub fn write(&self, params: &Hyperparams) -> Result<(), TaskError> {
        let _guard = self.acquire(true)?;
        self.write_unlocked(params)
    }

    /// Read-modify-write under one exclusive lock.
    pub fn update<F>(&self, f: F) -> Result<Hyperparams, TaskError>
    where
        F: FnOnce(&mut Hyperparams) -> Result<(), TaskError>,
    {
        let _guard = self.acquire(true)?;
        let mut params = self.read_unlocked()?;
        f(&mut params)?;
        self.write_unlocked(&params)?;
        Ok(params)
    }

    /// Persist the curriculum stage. The record must already carry `curr_stage`.
    pub fn update_curr_stage(&self, stage: usize) -> Result<(), TaskError> {
        let path = self.path.clone();
        self.update(|params| match params.get_mut("curr_stage") {
            Some(value) => {
                *value = Value::from(stage);
                Ok(())
            }
            None => Err(ConfigError::MissingField {
                field: "curr_stage".into(),
                path,
            }
            .into()),
        })?;
        debug!(stage, path = %self.path.display(), "persisted curriculum stage");
        Ok(())
    }

    /// Add `timesteps` to the running `n_timesteps` total.
    pub fn update_total_timesteps(&self, timesteps: u64) -> Result<u64, TaskError> {
        let params = self.update(|params| {
            let current = params
                .get("n_timesteps")
                .and_then(Value::as_u64)
                .ok_or_else(|| {
                    ConfigError::HyperparamFormat(
                        "parameter 'n_timesteps' not found or not of type integer".into(),
                    )
                })?;
            params.insert("n_timesteps".into(), Value::from(current + timesteps));
            Ok(())
        })?;
        Ok(params["n_timesteps"].as_u64().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Agent-level helpers
// ---------------------------------------------------------------------------

/// Load a record, either a preset from the hyperparameter config directory
/// (`from_scratch`) or the agent's own record. The result is validated.
pub fn load_hyperparameters(
    paths: &AgentPaths,
    from_scratch: bool,
    config_name: &str,
) -> Result<Hyperparams> {
    let file = if from_scratch {
        HyperparamFile::new(paths.hyperparams_dir.join(format!("{config_name}.json")))
    } else {
        HyperparamFile::for_agent(&paths.model)
    };
    let params = file
        .load()
        .with_context(|| format!("Failed to load hyperparameters from {}", file.path().display()))?;
    check_hyperparam_format(&params)?;
    Ok(params)
}

/// Prepare the record for a training run.
///
/// A new agent (`load_target == None`) starts from the `config_name` preset
/// and takes its name from the model directory; a loaded agent reuses its own
/// record. `n_steps` is derived from the batch size and written back.
pub fn initialize_hyperparameters(
    paths: &AgentPaths,
    load_target: Option<&str>,
    config_name: &str,
    n_envs: u64,
) -> Result<Hyperparams> {
    let mut params = match load_target {
        None => {
            let mut params = load_hyperparameters(paths, true, config_name)?;
            let agent_name = paths
                .model
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            params.insert("agent_name".into(), Value::from(agent_name));
            params
        }
        Some(_) => load_hyperparameters(paths, false, config_name)?,
    };

    let batch_size = require_u64(&params, "batch_size")?;
    let m_batch_size = require_u64(&params, "m_batch_size")?;
    check_batch_size(n_envs, batch_size, m_batch_size)?;
    params.insert("n_steps".into(), Value::from(batch_size / n_envs));

    HyperparamFile::for_agent(&paths.model).write(&params)?;
    info!(agent = %paths.model.display(), n_envs, "hyperparameters initialised");
    print_hyperparameters(&params);
    Ok(params)
}

/// Render the record as an aligned two-column table.
pub fn format_hyperparameters(params: &Hyperparams) -> String {
    let mut out = String::from("\n--------------------------------\n");
    out.push_str("         HYPERPARAMETERS         \n\n");
    for (key, value) in params {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&format!("{:30}{:<10}\n", format!("{key}:"), value));
    }
    out.push_str("--------------------------------\n");
    out
}

pub fn print_hyperparameters(params: &Hyperparams) {
    println!("{}", format_hyperparameters(params));
}
