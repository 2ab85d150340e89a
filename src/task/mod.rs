//! Episode tasks: how the world is reset between training episodes.
//!
//! A [`Task`] is one of four variants, chosen once by the
//! [`factory`](factory::TaskFactory):
//!
//! - **Random** ([`random`]) -- new start/goal and dynamic obstacles every
//!   episode, with bounded retries on placement failures.
//! - **Manual** ([`manual`]) -- random start and obstacles, goal supplied by
//!   an external publisher through a [`GoalInbox`].
//! - **Staged** ([`staged`]) -- Random, with the obstacle population driven
//!   by a training curriculum that can advance and retreat.
//! - **Scenario** ([`scenario`]) -- a fixed layout read from a scenario file.
//!
//! Every `reset()` runs inside the task's [`WorldGate`], the same lock the
//! map-update callback takes.

pub mod factory;
pub mod manual;
pub mod random;
pub mod scenario;
pub mod staged;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TaskError};
use crate::world::{OccupancyGrid, Position, WorldGate};

pub use factory::{get_predefined_task, TaskFactory, EVAL_NAMESPACE};
pub use manual::{GoalInbox, ManualTask};
pub use random::RandomTask;
pub use scenario::{ArenaScenario, ScenarioTask};
pub use staged::{StageTrigger, StagedRandomTask};

/// How episodes are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    Random,
    Staged,
    Manual,
    Scenario,
}

impl TaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Staged => "staged",
            Self::Manual => "manual",
            Self::Scenario => "scenario",
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "staged" => Ok(Self::Staged),
            "manual" => Ok(Self::Manual),
            "scenario" => Ok(Self::Scenario),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Per-reset report consumed by the reward and logging layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInfo {
    pub robot_goal_position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_scenario_loaded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_repeats: Option<usize>,
}

impl TaskInfo {
    pub fn with_goal(goal: Position) -> Self {
        Self {
            robot_goal_position: goal,
            new_scenario_loaded: None,
            repeat_count: None,
            max_repeats: None,
        }
    }
}

/// A constructed task, ready for `reset()` once per episode.
pub enum Task {
    Random(RandomTask),
    Manual(ManualTask),
    Staged(StagedRandomTask),
    Scenario(ScenarioTask),
}

impl Task {
    /// Prepare the world for the next episode.
    pub fn reset(&self) -> Result<TaskInfo, TaskError> {
        match self {
            Self::Random(t) => t.reset(),
            Self::Manual(t) => t.reset(),
            Self::Staged(t) => t.reset(),
            Self::Scenario(t) => t.reset(),
        }
    }

    pub fn mode(&self) -> TaskMode {
        match self {
            Self::Random(_) => TaskMode::Random,
            Self::Manual(_) => TaskMode::Manual,
            Self::Staged(_) => TaskMode::Staged,
            Self::Scenario(_) => TaskMode::Scenario,
        }
    }

    pub fn world(&self) -> &Arc<WorldGate> {
        match self {
            Self::Random(t) => t.world(),
            Self::Manual(t) => t.world(),
            Self::Staged(t) => t.world(),
            Self::Scenario(t) => t.world(),
        }
    }

    /// Map-update callback entry point.
    pub fn update_map(&self, map: OccupancyGrid) {
        self.world().update_map(map);
    }

    /// Where manual goals are delivered; `None` for other modes.
    pub fn goal_inbox(&self) -> Option<Arc<GoalInbox>> {
        match self {
            Self::Manual(t) => Some(t.inbox()),
            _ => None,
        }
    }

    pub fn as_staged(&self) -> Option<&StagedRandomTask> {
        match self {
            Self::Staged(t) => Some(t),
            _ => None,
        }
    }

    /// Stage-trigger callback entry point. Returns whether the stage changed;
    /// always `false` for non-curriculum tasks.
    pub fn on_trigger(&self, trigger: StageTrigger) -> Result<bool, TaskError> {
        match self {
            Self::Staged(t) => t.handle_trigger(trigger),
            _ => {
                tracing::debug!(mode = %self.mode(), ?trigger, "ignoring stage trigger");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_from_tags() {
        for mode in [
            TaskMode::Random,
            TaskMode::Staged,
            TaskMode::Manual,
            TaskMode::Scenario,
        ] {
            assert_eq!(mode.as_str().parse::<TaskMode>().unwrap(), mode);
        }
        assert!(matches!(
            "custom".parse::<TaskMode>(),
            Err(ConfigError::UnknownMode(m)) if m == "custom"
        ));
    }

    #[test]
    fn info_omits_unset_fields() {
        let info = TaskInfo::with_goal(Position::new(1.5, -2.0));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json, serde_json::json!({"robot_goal_position": {"x": 1.5, "y": -2.0}}));
    }
}
