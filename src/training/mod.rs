//! Training-side utilities shared with the RL driver.
//!
//! - [`hyperparams`] -- validation and lock-protected persistence of the
//!   per-agent `hyperparameters.json`.
//! - [`paths`] -- agent naming and directory layout.

pub mod hyperparams;
pub mod paths;

pub use hyperparams::{
    check_batch_size, check_hyperparam_format, initialize_hyperparameters, load_hyperparameters,
    print_hyperparameters, HyperparamFile, Hyperparams, HYPERPARAM_KEYS,
};
pub use paths::{get_agent_name, AgentPaths, MlpSpec};
