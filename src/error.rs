//! Error taxonomy for task construction and episode resets.
//!
//! - [`ServiceError`] -- a collaborator or simulator service call failed. These
//!   are the recoverable class: placement retries swallow them up to a bound.
//! - [`ConfigError`] -- construction-time validation failures. Always fatal.
//! - [`TaskError`] -- everything a reset, a stage transition or the factory can
//!   return.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A failed call into the simulator or one of the world managers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service answered with an error or could not be reached.
    #[error("service `{service}` failed: {reason}")]
    Call { service: String, reason: String },

    /// No free position could be sampled on the current map.
    #[error("no free position for {what} after {samples} samples")]
    NoFreeSpace { what: String, samples: usize },

    /// The service has not been registered (yet).
    #[error("service `{0}` is not available")]
    Unavailable(String),
}

impl ServiceError {
    pub fn call(service: impl Into<String>, reason: impl ToString) -> Self {
        Self::Call {
            service: service.into(),
            reason: reason.to_string(),
        }
    }
}

/// Construction-time validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("start stage {stage} out of bounds, has to be between 1 and {max}")]
    StartStageOutOfBounds { stage: usize, max: usize },

    #[error("curriculum file not found at {0}")]
    CurriculumMissing(PathBuf),

    #[error("curriculum {path} is malformed: {reason}")]
    CurriculumMalformed { path: PathBuf, reason: String },

    #[error("unknown task mode `{0}` (expected random, staged, manual or scenario)")]
    UnknownMode(String),

    #[error("found no hyperparameter file at {0}")]
    HyperparamsMissing(PathBuf),

    #[error("hyperparameter file {path} is malformed: {reason}")]
    HyperparamsMalformed { path: PathBuf, reason: String },

    #[error("invalid hyperparameters: {0}")]
    HyperparamFormat(String),

    #[error("parameter `{field}` not found in {path}")]
    MissingField { field: String, path: PathBuf },

    #[error("scenario {path} could not be loaded: {reason}")]
    Scenario { path: PathBuf, reason: String },

    #[error("{0} mode requires a {1} path")]
    MissingPath(&'static str, &'static str),
}

/// Errors surfaced from `reset()`, stage transitions and task construction.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Obstacle placement kept failing; the reset is abandoned.
    #[error("reset failed after {attempts} placement attempts")]
    PlacementExhausted {
        attempts: usize,
        #[source]
        last: ServiceError,
    },

    #[error("no goal position received within {0:?}")]
    GoalTimeout(Duration),

    #[error("simulator service `{service}` not ready after {waited:?}")]
    SimulatorNotReady { service: String, waited: Duration },

    #[error("failed to {action}: {source}")]
    Process {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("hyperparameter file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TaskError {
    /// Whether retrying the same operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Service(_))
    }

    pub(crate) fn process(action: impl Into<String>, source: std::io::Error) -> Self {
        Self::Process {
            action: action.into(),
            source,
        }
    }
}
