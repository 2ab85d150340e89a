//! Fixed layouts read from a scenario file.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::TaskInfo;
use crate::error::{ConfigError, TaskError};
use crate::world::{PedestrianAgent, Pose, WorldGate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRobot {
    pub start_pos: Pose,
    pub goal_pos: Pose,
}

/// A scenario file: fixed robot start/goal plus the pedestrians to simulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaScenario {
    pub robot: ScenarioRobot,
    #[serde(default)]
    pub pedsim_agents: Vec<PedestrianAgent>,
}

impl ArenaScenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let scenario_err = |reason: String| ConfigError::Scenario {
            path: path.to_path_buf(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| scenario_err(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| scenario_err(e.to_string()))
    }
}

/// Replays one scenario every episode.
pub struct ScenarioTask {
    world: Arc<WorldGate>,
    scenario: ArenaScenario,
    resets: AtomicUsize,
    max_repeats: usize,
}

impl ScenarioTask {
    /// Spawns the scenario's pedestrians, if it has any.
    pub(crate) fn new(
        world: Arc<WorldGate>,
        scenario: ArenaScenario,
        max_repeats: usize,
    ) -> Result<Self, TaskError> {
        if !scenario.pedsim_agents.is_empty() {
            world.with_world(|w| w.pedestrians.spawn_agents(&scenario.pedsim_agents))?;
            info!(agents = scenario.pedsim_agents.len(), "scenario pedestrians spawned");
        }
        Ok(Self {
            world,
            scenario,
            resets: AtomicUsize::new(0),
            max_repeats,
        })
    }

    pub fn reset(&self) -> Result<TaskInfo, TaskError> {
        self.world.with_world(|world| {
            if !self.scenario.pedsim_agents.is_empty() {
                world.pedestrians.reset_all_agents()?;
            }
            let robot = &self.scenario.robot;
            world
                .robot
                .set_start_and_goal(Some(robot.start_pos), Some(robot.goal_pos))?;

            let count = self.resets.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(count, max = self.max_repeats, "scenario reset");
            Ok(TaskInfo {
                robot_goal_position: robot.goal_pos.position(),
                new_scenario_loaded: Some(count == 1),
                repeat_count: Some(count),
                max_repeats: Some(self.max_repeats),
            })
        })
    }

    pub fn world(&self) -> &Arc<WorldGate> {
        &self.world
    }

    pub fn scenario(&self) -> &ArenaScenario {
        &self.scenario
    }

    /// Successful resets so far.
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_world, Probe};
    use crate::world::Position;

    const SCENARIO: &str = r#"{
        "robot": {
            "start_pos": {"x": 1.0, "y": 2.0},
            "goal_pos": {"x": 7.5, "y": 3.0, "yaw": 1.57}
        },
        "pedsim_agents": [
            {"id": 1, "position": {"x": 4.0, "y": 4.0}, "waypoints": [{"x": 6.0, "y": 4.0}]},
            {"id": 2, "kind": "child", "position": {"x": 5.0, "y": 1.0}, "vmax": 0.6}
        ]
    }"#;

    fn scenario() -> ArenaScenario {
        serde_json::from_str(SCENARIO).unwrap()
    }

    #[test]
    fn parses_agents_with_defaults() {
        let s = scenario();
        assert_eq!(s.pedsim_agents.len(), 2);
        assert_eq!(s.pedsim_agents[0].kind, "adult");
        assert_eq!(s.pedsim_agents[1].vmax, 0.6);
        assert_eq!(s.robot.goal_pos.yaw, 1.57);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.json");
        std::fs::write(&path, r#"{"robot": {}}"#).unwrap();
        assert!(matches!(
            ArenaScenario::load(&path),
            Err(ConfigError::Scenario { .. })
        ));
        assert!(matches!(
            ArenaScenario::load(dir.path().join("missing.json")),
            Err(ConfigError::Scenario { .. })
        ));
    }

    #[test]
    fn first_reset_reports_new_scenario() {
        let probe = Probe::default();
        let task = ScenarioTask::new(fake_world(&probe), scenario(), 1000).unwrap();
        assert_eq!(probe.events(), vec!["peds.spawn(2)"]);
        probe.clear();

        let first = task.reset().unwrap();
        assert_eq!(first.new_scenario_loaded, Some(true));
        assert_eq!(first.repeat_count, Some(1));
        assert_eq!(first.max_repeats, Some(1000));
        assert_eq!(first.robot_goal_position, Position::new(7.5, 3.0));

        let second = task.reset().unwrap();
        assert_eq!(second.new_scenario_loaded, Some(false));
        assert_eq!(second.repeat_count, Some(2));
        assert_eq!(task.reset_count(), 2);

        assert_eq!(
            probe.events(),
            vec![
                "peds.reset",
                "robot.set_start_and_goal",
                "peds.reset",
                "robot.set_start_and_goal",
            ]
        );
    }

    #[test]
    fn empty_scenario_skips_pedestrians() {
        let probe = Probe::default();
        let mut s = scenario();
        s.pedsim_agents.clear();
        let task = ScenarioTask::new(fake_world(&probe), s, 5).unwrap();
        task.reset().unwrap();
        assert_eq!(probe.events(), vec!["robot.set_start_and_goal"]);
    }
}
