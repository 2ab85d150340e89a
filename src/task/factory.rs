//! Builds the requested task variant and its collaborators.

use std::sync::Arc;

use tracing::info;

use super::manual::ManualTask;
use super::random::{PlacementPolicy, RandomTask};
use super::scenario::{ArenaScenario, ScenarioTask};
use super::staged::{StagedRandomTask, StagedSetup};
use super::{Task, TaskMode};
use crate::config::ArenaConfig;
use crate::curriculum::StageTable;
use crate::error::{ConfigError, TaskError};
use crate::managers::{SimObstacleManager, SimPedestrianManager, SimRobotManager};
use crate::params::{self, ParamStore};
use crate::sim::{ProcessSimulatorControl, Simulator, SimulatorControl};
use crate::training::{AgentPaths, HyperparamFile};
use crate::world::{World, WorldGate};

/// Namespace of the evaluation simulator, the only instance that persists
/// curriculum progress.
pub const EVAL_NAMESPACE: &str = "eval_sim";

/// Single construction point for [`Task`]s.
pub struct TaskFactory {
    config: ArenaConfig,
    sim: Arc<dyn Simulator>,
    params: ParamStore,
    control: Option<Box<dyn SimulatorControl>>,
    seed: Option<u64>,
}

impl TaskFactory {
    pub fn new(config: ArenaConfig, sim: Arc<dyn Simulator>, params: ParamStore) -> Self {
        Self {
            config,
            sim,
            params,
            control: None,
            seed: None,
        }
    }

    /// Replace the process-based simulator restart used by staged tasks.
    pub fn with_simulator_control(mut self, control: Box<dyn SimulatorControl>) -> Self {
        self.control = Some(control);
        self
    }

    /// Seed the placement samplers for reproducible layouts.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn policy(&self) -> PlacementPolicy {
        PlacementPolicy {
            robot_radius: self.config.task.robot_radius,
            max_attempts: self.config.task.max_placement_attempts,
        }
    }

    /// Fetch the map and wire the managers to it behind a fresh gate.
    fn build_world(&self) -> Result<Arc<WorldGate>, TaskError> {
        let map = self.sim.get_map()?;
        let task = &self.config.task;
        let mut robot = SimRobotManager::new(
            self.sim.clone(),
            map.clone(),
            &self.config.simulator.model,
            task,
        );
        let mut obstacles = SimObstacleManager::new(self.sim.clone(), map.clone(), task);
        if let Some(seed) = self.seed {
            robot = robot.with_seed(seed);
            obstacles = obstacles.with_seed(seed.wrapping_add(1));
        }
        Ok(Arc::new(WorldGate::new(World::new(
            map,
            Box::new(robot),
            Box::new(obstacles),
            Box::new(SimPedestrianManager::new(self.sim.clone())),
        ))))
    }

    fn register_static_obstacles(&self, world: &WorldGate) -> Result<(), TaskError> {
        let count = self.config.task.static_obstacles;
        let zones =
            world.with_world(|w| w.obstacles.register_random_static_obstacles(count, &[]))?;
        info!(count, zones = zones.len(), "static obstacles registered");
        Ok(())
    }

    /// Build the task for `mode` in namespace `ns`.
    ///
    /// `start_stage` is only used by staged mode.
    pub fn build(
        self,
        ns: &str,
        mode: &str,
        start_stage: usize,
        paths: &AgentPaths,
    ) -> Result<Task, TaskError> {
        let mode: TaskMode = mode.parse()?;
        let world = self.build_world()?;
        self.params.set(params::TASK_MODE, mode.as_str());
        let task_cfg = &self.config.task;

        let task = match mode {
            TaskMode::Random => {
                self.register_static_obstacles(&world)?;
                Task::Random(RandomTask::new(
                    world,
                    task_cfg.dynamic_obstacles,
                    self.policy(),
                ))
            }
            TaskMode::Manual => Task::Manual(ManualTask::new(
                world,
                task_cfg.dynamic_obstacles,
                task_cfg.robot_radius,
                task_cfg.manual_goal_timeout(),
            )),
            TaskMode::Scenario => {
                let path = paths
                    .scenario
                    .as_ref()
                    .ok_or(ConfigError::MissingPath("scenario", "scenario file"))?;
                let scenario = ArenaScenario::load(path)?;
                self.register_static_obstacles(&world)?;
                Task::Scenario(ScenarioTask::new(
                    world,
                    scenario,
                    task_cfg.scenario_max_repeats,
                )?)
            }
            TaskMode::Staged => {
                let stages = StageTable::load(&paths.curriculum)?;
                let policy = self.policy();
                let settle_delay = self.config.simulator.settle_delay();
                let control: Box<dyn SimulatorControl> = match self.control {
                    Some(control) => control,
                    None => Box::new(ProcessSimulatorControl::new(
                        self.config.simulator.clone(),
                        self.sim.clone(),
                    )),
                };
                Task::Staged(StagedRandomTask::new(StagedSetup {
                    world,
                    ns: ns.to_string(),
                    start_stage,
                    stages,
                    hyperparams: HyperparamFile::for_agent(&paths.model),
                    params: self.params,
                    control,
                    policy,
                    settle_delay,
                })?)
            }
        };
        info!(ns, mode = %mode, "task ready");
        Ok(task)
    }
}

/// Build a task against `sim` with the process-based simulator restart.
pub fn get_predefined_task(
    ns: &str,
    mode: &str,
    start_stage: usize,
    config: ArenaConfig,
    sim: Arc<dyn Simulator>,
    params: ParamStore,
    paths: &AgentPaths,
) -> Result<Task, TaskError> {
    TaskFactory::new(config, sim, params).build(ns, mode, start_stage, paths)
}
