//! Curriculum-driven random task.
//!
//! Wraps the random reset with a stage index into a [`StageTable`]. Triggers
//! move the index one stage forwards or backwards and re-initiate the world
//! for the new stage. When the dynamic-obstacle population changes the
//! simulator has to reload its world file, so the controller restarts it
//! through [`SimulatorControl`]; otherwise the new obstacles are registered
//! live.
//!
//! Only the instance running in the evaluation namespace is authoritative: it
//! publishes the stage to the shared parameters and persists it to the
//! agent's hyperparameter file. Training instances follow along locally.
//!
//! Lock order is the world gate first, then the stage state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::factory::EVAL_NAMESPACE;
use super::random::{reset_random, PlacementPolicy};
use super::{TaskInfo, TaskMode};
use crate::curriculum::{CurriculumState, StageTable};
use crate::error::{ConfigError, TaskError};
use crate::params::{self, ParamStore};
use crate::sim::SimulatorControl;
use crate::training::HyperparamFile;
use crate::world::{World, WorldGate};

/// Curriculum trigger delivered by the training callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageTrigger {
    Advance,
    Retreat,
}

struct StageState {
    curriculum: CurriculumState,
    control: Box<dyn SimulatorControl>,
}

/// Everything the factory hands over to build a staged task.
pub(crate) struct StagedSetup {
    pub world: Arc<WorldGate>,
    pub ns: String,
    pub start_stage: usize,
    pub stages: StageTable,
    pub hyperparams: HyperparamFile,
    pub params: ParamStore,
    pub control: Box<dyn SimulatorControl>,
    pub policy: PlacementPolicy,
    pub settle_delay: Duration,
}

pub struct StagedRandomTask {
    world: Arc<WorldGate>,
    ns: String,
    authoritative: bool,
    stages: StageTable,
    state: Mutex<StageState>,
    params: ParamStore,
    hyperparams: HyperparamFile,
    policy: PlacementPolicy,
    settle_delay: Duration,
}

impl StagedRandomTask {
    /// Validate the setup and initiate the start stage.
    pub(crate) fn new(setup: StagedSetup) -> Result<Self, TaskError> {
        let StagedSetup {
            world,
            ns,
            start_stage,
            stages,
            hyperparams,
            params,
            control,
            policy,
            settle_delay,
        } = setup;

        if !stages.contains(start_stage) {
            return Err(ConfigError::StartStageOutOfBounds {
                stage: start_stage,
                max: stages.len(),
            }
            .into());
        }
        if !hyperparams.exists() {
            return Err(ConfigError::HyperparamsMissing(hyperparams.path().to_path_buf()).into());
        }

        params.set(params::TASK_MODE, TaskMode::Staged.as_str());
        params.set(params::CURR_STAGE, start_stage);

        let task = Self {
            world,
            authoritative: ns == EVAL_NAMESPACE,
            ns,
            stages,
            state: Mutex::new(StageState {
                curriculum: CurriculumState {
                    current_stage: start_stage,
                    last_stage_reached: false,
                },
                control,
            }),
            params,
            hyperparams,
            policy,
            settle_delay,
        };

        // At construction the world is compared against the stage below.
        let previous = start_stage.saturating_sub(1);
        task.world.with_world(|world| {
            let mut state = task.state.lock();
            task.initiate_stage(world, &mut state, start_stage, previous)
        })?;
        info!(ns = %task.ns, stage = start_stage, stages = task.stages.len(), "curriculum started");
        Ok(task)
    }

    /// Random reset with the current stage's dynamic-obstacle count.
    pub fn reset(&self) -> Result<TaskInfo, TaskError> {
        self.world.with_world(|world| {
            let stage = self.state.lock().curriculum.current_stage;
            reset_random(world, self.dynamic_count(stage), self.policy)
        })
    }

    /// Move to the next stage. Returns `false` when already at the last one.
    pub fn next_stage(&self) -> Result<bool, TaskError> {
        self.world.with_world(|world| {
            let mut state = self.state.lock();
            let from = state.curriculum.current_stage;
            if from >= self.stages.len() {
                info!(ns = %self.ns, stage = from, "already at the last stage");
                return Ok(false);
            }
            let to = from + 1;
            self.initiate_stage(world, &mut state, to, from)?;
            state.curriculum.current_stage = to;

            // The world already runs the new stage, so the in-memory state and
            // the shared parameters are committed before the file is written.
            if self.authoritative {
                if to == self.stages.len() {
                    state.curriculum.last_stage_reached = true;
                    self.params.set(params::LAST_STAGE_REACHED, true);
                }
                self.publish_stage(to)?;
            }
            info!(ns = %self.ns, from, to, "advanced curriculum stage");
            Ok(true)
        })
    }

    /// Move to the previous stage. Returns `false` when already at stage 1.
    pub fn previous_stage(&self) -> Result<bool, TaskError> {
        self.world.with_world(|world| {
            let mut state = self.state.lock();
            let from = state.curriculum.current_stage;
            if from <= 1 {
                info!(ns = %self.ns, "already at the first stage");
                return Ok(false);
            }
            let to = from - 1;
            self.initiate_stage(world, &mut state, to, from)?;
            state.curriculum.current_stage = to;

            if self.authoritative {
                state.curriculum.last_stage_reached = false;
                self.params.set(params::LAST_STAGE_REACHED, false);
                self.publish_stage(to)?;
            }
            info!(ns = %self.ns, from, to, "retreated curriculum stage");
            Ok(true)
        })
    }

    pub fn handle_trigger(&self, trigger: StageTrigger) -> Result<bool, TaskError> {
        match trigger {
            StageTrigger::Advance => self.next_stage(),
            StageTrigger::Retreat => self.previous_stage(),
        }
    }

    pub fn current_stage(&self) -> usize {
        self.state.lock().curriculum.current_stage
    }

    pub fn curriculum_state(&self) -> CurriculumState {
        self.state.lock().curriculum
    }

    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    pub fn namespace(&self) -> &str {
        &self.ns
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn world(&self) -> &Arc<WorldGate> {
        &self.world
    }

    fn dynamic_count(&self, stage: usize) -> usize {
        self.stages.get(stage).map_or(0, |s| s.dynamic_count)
    }

    /// Publish `stage` to the shared parameters, then persist it. A failed
    /// save leaves the published value in place.
    fn publish_stage(&self, stage: usize) -> Result<(), TaskError> {
        self.params.set(params::CURR_STAGE, stage);
        self.hyperparams.update_curr_stage(stage).inspect_err(|e| {
            warn!(ns = %self.ns, stage, error = %e, "failed to persist curriculum stage");
        })
    }

    /// Clear the world and bring it up for `stage`. `previous` is the stage
    /// whose population is currently loaded (0 when none).
    ///
    /// The restart decision compares against `previous`, not `stage - 1`: on a
    /// retreat the loaded population is the one of the stage above.
    fn initiate_stage(
        &self,
        world: &mut World,
        state: &mut StageState,
        stage: usize,
        previous: usize,
    ) -> Result<(), TaskError> {
        world.obstacles.remove_all_obstacles()?;
        let dynamic = self.dynamic_count(stage);
        let restart =
            stage == 1 || self.stages.get(previous).map(|s| s.dynamic_count) != Some(dynamic);
        info!(
            ns = %self.ns,
            stage,
            dynamic,
            static_count = self.stages.get(stage).map_or(0, |s| s.static_count),
            restart,
            "initiating stage"
        );

        if !restart {
            world
                .obstacles
                .register_random_dynamic_obstacles(dynamic, &[])?;
            return Ok(());
        }

        self.params.set(params::ACTORS, dynamic);
        let control = &mut state.control;
        control.terminate()?;
        control.regenerate_world(dynamic)?;
        control.relaunch()?;
        control.wait_until_ready()?;
        world.robot.spawn_robot()?;
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tempfile::TempDir;

    use super::*;
    use crate::curriculum::StageDefinition;
    use crate::testing::{fake_world, fake_world_with_delay, FakeControl, Probe};
    use crate::world::OccupancyGrid;
    use crate::training::hyperparams::tests::sample_record;

    const POLICY: PlacementPolicy = PlacementPolicy {
        robot_radius: 0.3,
        max_attempts: 3,
    };

    /// Dynamic counts 0, 2, 2, 5 for stages 1 to 4.
    fn table() -> StageTable {
        let stage = |static_count, dynamic_count| StageDefinition {
            static_count,
            dynamic_count,
        };
        StageTable::new(vec![stage(0, 0), stage(5, 2), stage(10, 2), stage(10, 5)]).unwrap()
    }

    struct Fixture {
        _dir: TempDir,
        probe: Probe,
        params: ParamStore,
        file: HyperparamFile,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let file = HyperparamFile::for_agent(dir.path());
        file.write(&sample_record()).unwrap();
        Fixture {
            _dir: dir,
            probe: Probe::default(),
            params: ParamStore::new(),
            file,
        }
    }

    fn build(fx: &Fixture, ns: &str, start_stage: usize) -> Result<StagedRandomTask, TaskError> {
        build_on(fx, fake_world(&fx.probe), ns, start_stage)
    }

    fn build_on(
        fx: &Fixture,
        world: Arc<WorldGate>,
        ns: &str,
        start_stage: usize,
    ) -> Result<StagedRandomTask, TaskError> {
        StagedRandomTask::new(StagedSetup {
            world,
            ns: ns.to_string(),
            start_stage,
            stages: table(),
            hyperparams: fx.file.clone(),
            params: fx.params.clone(),
            control: Box::new(FakeControl {
                probe: fx.probe.clone(),
            }),
            policy: POLICY,
            settle_delay: Duration::ZERO,
        })
    }

    fn persisted_stage(fx: &Fixture) -> u64 {
        fx.file.load().unwrap()["curr_stage"].as_u64().unwrap()
    }

    fn restarted(events: &[String]) -> bool {
        events.iter().any(|e| e == "sim.terminate")
    }

    #[test]
    fn start_stage_one_restarts_the_simulator() {
        let fx = fixture();
        let task = build(&fx, "sim_1", 1).unwrap();
        assert_eq!(task.current_stage(), 1);
        assert_eq!(
            fx.probe.events(),
            vec![
                "obstacles.remove_all",
                "sim.terminate",
                "sim.regenerate(0)",
                "sim.relaunch",
                "sim.ready",
                "robot.spawn",
            ]
        );
        assert_eq!(fx.params.get_str(params::TASK_MODE).as_deref(), Some("staged"));
        assert_eq!(fx.params.get_u64(params::CURR_STAGE), Some(1));
        assert_eq!(fx.params.get_u64(params::ACTORS), Some(0));
    }

    #[test]
    fn out_of_range_start_stage_is_rejected() {
        let fx = fixture();
        for stage in [0, 5, 100] {
            match build(&fx, "sim_1", stage) {
                Err(TaskError::Config(ConfigError::StartStageOutOfBounds { stage: s, max })) => {
                    assert_eq!((s, max), (stage, 4));
                }
                Err(other) => panic!("unexpected error {other:?}"),
                Ok(_) => panic!("stage {stage} accepted"),
            }
        }
        assert!(fx.probe.events().is_empty());
    }

    #[test]
    fn missing_hyperparameter_file_is_rejected() {
        let fx = fixture();
        std::fs::remove_file(fx.file.path()).unwrap();
        assert!(matches!(
            build(&fx, "sim_1", 1),
            Err(TaskError::Config(ConfigError::HyperparamsMissing(_)))
        ));
    }

    #[test]
    fn unchanged_population_registers_live() {
        let fx = fixture();
        let task = build(&fx, "sim_1", 2).unwrap();
        fx.probe.clear();

        // 2 -> 3 keeps two dynamic obstacles.
        assert!(task.next_stage().unwrap());
        let events = fx.probe.events();
        assert!(!restarted(&events));
        assert_eq!(events, vec!["obstacles.remove_all", "obstacles.register_dynamic(2)"]);

        // 3 -> 4 goes to five and needs a restart.
        fx.probe.clear();
        assert!(task.next_stage().unwrap());
        let events = fx.probe.events();
        assert!(events.contains(&"sim.regenerate(5)".to_string()));
        assert_eq!(fx.params.get_u64(params::ACTORS), Some(5));
    }

    #[test]
    fn retreat_compares_against_the_loaded_stage() {
        let fx = fixture();
        let task = build(&fx, "sim_1", 4).unwrap();
        fx.probe.clear();

        // 4 -> 3: five loaded, two wanted.
        assert!(task.previous_stage().unwrap());
        assert!(restarted(&fx.probe.events()));

        // 3 -> 2: two loaded, two wanted.
        fx.probe.clear();
        assert!(task.previous_stage().unwrap());
        assert!(!restarted(&fx.probe.events()));
    }

    #[test]
    fn eval_instance_persists_and_flags_last_stage() {
        let fx = fixture();
        let task = build(&fx, EVAL_NAMESPACE, 3).unwrap();
        assert!(task.is_authoritative());

        assert!(task.next_stage().unwrap());
        assert_eq!(persisted_stage(&fx), 4);
        assert_eq!(fx.params.get_u64(params::CURR_STAGE), Some(4));
        assert_eq!(fx.params.get_bool(params::LAST_STAGE_REACHED), Some(true));

        // Advancing past the end is a no-op that keeps the flag.
        fx.probe.clear();
        assert!(!task.next_stage().unwrap());
        assert!(fx.probe.events().is_empty());
        assert_eq!(task.current_stage(), 4);
        assert!(task.curriculum_state().last_stage_reached);
        assert_eq!(fx.params.get_bool(params::LAST_STAGE_REACHED), Some(true));

        assert!(task.previous_stage().unwrap());
        assert_eq!(persisted_stage(&fx), 3);
        assert_eq!(fx.params.get_bool(params::LAST_STAGE_REACHED), Some(false));
        assert!(!task.curriculum_state().last_stage_reached);
    }

    #[test]
    fn training_instance_does_not_persist() {
        let fx = fixture();
        let task = build(&fx, "sim_2", 1).unwrap();
        assert!(!task.is_authoritative());
        assert!(task.next_stage().unwrap());
        assert_eq!(task.current_stage(), 2);
        assert_eq!(persisted_stage(&fx), 1);
        // Construction publishes the start stage; later moves are left to eval.
        assert_eq!(fx.params.get_u64(params::CURR_STAGE), Some(1));
        assert_eq!(fx.params.get_bool(params::LAST_STAGE_REACHED), None);
    }

    #[test]
    fn retreat_at_first_stage_is_a_no_op() {
        let fx = fixture();
        let task = build(&fx, EVAL_NAMESPACE, 1).unwrap();
        fx.probe.clear();
        assert!(!task.handle_trigger(StageTrigger::Retreat).unwrap());
        assert_eq!(task.current_stage(), 1);
        assert!(fx.probe.events().is_empty());
        assert_eq!(persisted_stage(&fx), 1);
    }

    #[test]
    fn failed_transition_keeps_the_stage() {
        let fx = fixture();
        let task = build(&fx, "sim_1", 2).unwrap();
        fx.probe.fail_registrations(1);
        assert!(task.next_stage().is_err());
        assert_eq!(task.current_stage(), 2);
    }

    #[test]
    fn failed_save_still_commits_the_new_stage() {
        let fx = fixture();
        let task = build(&fx, EVAL_NAMESPACE, 3).unwrap();
        fx.file
            .update(|record| {
                record.remove("curr_stage");
                Ok(())
            })
            .unwrap();

        assert!(matches!(
            task.next_stage(),
            Err(TaskError::Config(ConfigError::MissingField { .. }))
        ));

        // The world was re-initiated for stage 4, so everything else follows it.
        assert_eq!(task.current_stage(), 4);
        assert!(task.curriculum_state().last_stage_reached);
        assert_eq!(fx.params.get_u64(params::CURR_STAGE), Some(4));
        assert_eq!(fx.params.get_bool(params::LAST_STAGE_REACHED), Some(true));

        // Retreating clears the flag even though the save fails again.
        assert!(task.previous_stage().is_err());
        assert_eq!(task.current_stage(), 3);
        assert!(!task.curriculum_state().last_stage_reached);
        assert_eq!(fx.params.get_u64(params::CURR_STAGE), Some(3));
        assert_eq!(fx.params.get_bool(params::LAST_STAGE_REACHED), Some(false));
    }

    #[test]
    fn transitions_do_not_interleave_with_resets_or_map_updates() {
        const ROUNDS: usize = 8;
        let fx = fixture();
        let world = fake_world_with_delay(&fx.probe, Duration::from_millis(2));
        // Stages 2 and 3 both carry two dynamic obstacles, so every
        // transition re-registers live without a restart.
        let task = build_on(&fx, world, "sim_1", 2).unwrap();
        fx.probe.clear();

        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    assert!(task.next_stage().unwrap());
                    assert!(task.previous_stage().unwrap());
                }
            });
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    task.reset().unwrap();
                }
            });
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    task.world().update_map(OccupancyGrid::walled_room(10, 10, 1.0));
                }
            });
        });

        let events = fx.probe.events();
        let (mut transitions, mut resets, mut updates) = (0, 0, 0);
        let mut rest = events.as_slice();
        while let Some(head) = rest.first() {
            let block: &[&str] = match head.as_str() {
                "obstacles.update_map" => {
                    updates += 1;
                    &["obstacles.update_map", "robot.update_map"]
                }
                "robot.set_start_and_goal" => {
                    resets += 1;
                    &[
                        "robot.set_start_and_goal",
                        "obstacles.remove_all",
                        "obstacles.register_dynamic(2)",
                    ]
                }
                "obstacles.remove_all" => {
                    transitions += 1;
                    &["obstacles.remove_all", "obstacles.register_dynamic(2)"]
                }
                other => panic!("unexpected event {other} in {events:?}"),
            };
            let whole = rest.len() >= block.len()
                && rest.iter().zip(block).all(|(event, expected)| event == expected);
            assert!(whole, "interleaved block at {head} in {events:?}");
            rest = &rest[block.len()..];
        }

        assert_eq!((transitions, resets, updates), (2 * ROUNDS, ROUNDS, ROUNDS));
        assert_eq!(task.current_stage(), 2);
    }

    #[test]
    fn reset_uses_the_stage_population() {
        let fx = fixture();
        let task = build(&fx, "sim_1", 4).unwrap();
        fx.probe.clear();
        task.reset().unwrap();
        assert_eq!(
            fx.probe.events(),
            vec![
                "robot.set_start_and_goal",
                "obstacles.remove_all",
                "obstacles.register_dynamic(5)",
            ]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn any_valid_start_stage_is_accepted(stage in 1usize..=4) {
            let fx = fixture();
            let task = build(&fx, "sim_1", stage).unwrap();
            prop_assert_eq!(task.current_stage(), stage);
        }

        #[test]
        fn invalid_start_stages_fail(stage in 5usize..1_000) {
            let fx = fixture();
            prop_assert!(build(&fx, "sim_1", stage).is_err());
        }

        #[test]
        fn advance_then_retreat_returns_home(start in 1usize..=4, k in 0usize..4) {
            let fx = fixture();
            let task = build(&fx, "sim_1", start).unwrap();
            let steps = k.min(4 - start);
            for _ in 0..steps {
                prop_assert!(task.next_stage().unwrap());
            }
            prop_assert_eq!(task.current_stage(), start + steps);
            for _ in 0..steps {
                prop_assert!(task.previous_stage().unwrap());
            }
            prop_assert_eq!(task.current_stage(), start);
        }
    }
}
