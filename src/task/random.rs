//! Random start/goal with freshly placed dynamic obstacles every episode.

use std::sync::Arc;

use tracing::{debug, warn};

use super::TaskInfo;
use crate::error::{ServiceError, TaskError};
use crate::world::{Pose, World, WorldGate};

/// Limits shared by every variant that places obstacles at random.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlacementPolicy {
    pub robot_radius: f64,
    /// Consecutive failed attempts before a reset is abandoned.
    pub max_attempts: usize,
}

/// One placement attempt: sample start/goal, clear, re-register obstacles.
fn place(world: &mut World, actors: usize, robot_radius: f64) -> Result<Pose, ServiceError> {
    let (start, goal) = world.robot.set_start_and_goal(None, None)?;
    world.obstacles.remove_all_obstacles()?;
    world.obstacles.register_random_dynamic_obstacles(
        actors,
        &[
            start.forbidden_zone(robot_radius),
            goal.forbidden_zone(robot_radius),
        ],
    )?;
    Ok(goal)
}

/// Random reset with bounded retries. Must be called inside the gate.
pub(crate) fn reset_random(
    world: &mut World,
    actors: usize,
    policy: PlacementPolicy,
) -> Result<TaskInfo, TaskError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match place(world, actors, policy.robot_radius) {
            Ok(goal) => {
                debug!(attempt, actors, goal_x = goal.x, goal_y = goal.y, "random reset done");
                return Ok(TaskInfo::with_goal(goal.position()));
            }
            Err(e) if attempt < attempts => {
                warn!(attempt, attempts, error = %e, "obstacle placement failed, retrying");
            }
            Err(last) => return Err(TaskError::PlacementExhausted { attempts, last }),
        }
    }
}

/// Every reset samples a new robot start and goal and places a fixed number
/// of dynamic obstacles outside their forbidden zones.
pub struct RandomTask {
    world: Arc<WorldGate>,
    actors: usize,
    policy: PlacementPolicy,
}

impl RandomTask {
    pub(crate) fn new(world: Arc<WorldGate>, actors: usize, policy: PlacementPolicy) -> Self {
        Self {
            world,
            actors,
            policy,
        }
    }

    pub fn reset(&self) -> Result<TaskInfo, TaskError> {
        self.world
            .with_world(|world| reset_random(world, self.actors, self.policy))
    }

    pub fn world(&self) -> &Arc<WorldGate> {
        &self.world
    }

    /// Dynamic obstacles placed per episode.
    pub fn actors(&self) -> usize {
        self.actors
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{fake_world, fake_world_with_delay, Probe};
    use crate::world::{OccupancyGrid, Position};

    const POLICY: PlacementPolicy = PlacementPolicy {
        robot_radius: 0.3,
        max_attempts: 3,
    };

    #[test]
    fn reset_places_obstacles_around_start_and_goal() {
        let probe = Probe::default();
        let task = RandomTask::new(fake_world(&probe), 4, POLICY);

        let info = task.reset().unwrap();
        assert_eq!(info.robot_goal_position, Position::new(6.0, 5.0));
        assert_eq!(info.new_scenario_loaded, None);

        assert_eq!(
            probe.events(),
            vec![
                "robot.set_start_and_goal",
                "obstacles.remove_all",
                "obstacles.register_dynamic(4)",
            ]
        );
        let (count, zones) = probe.registrations().remove(0);
        assert_eq!(count, 4);
        assert_eq!(zones.len(), 2);
        assert_eq!((zones[0].x, zones[0].y, zones[0].radius), (1.0, 1.0, 0.3));
        assert_eq!((zones[1].x, zones[1].y), (6.0, 5.0));
    }

    #[test]
    fn transient_failures_are_retried() {
        let probe = Probe::default();
        let task = RandomTask::new(fake_world(&probe), 2, POLICY);
        probe.fail_registrations(2);

        let info = task.reset().unwrap();
        // Third attempt sampled the third goal.
        assert_eq!(info.robot_goal_position, Position::new(8.0, 5.0));
        assert_eq!(probe.count("obstacles.register_dynamic_failed"), 2);
        assert_eq!(probe.count("obstacles.register_dynamic(2)"), 1);
    }

    #[test]
    fn third_consecutive_failure_is_terminal() {
        let probe = Probe::default();
        let task = RandomTask::new(fake_world(&probe), 2, POLICY);
        probe.fail_registrations(3);

        match task.reset() {
            Err(TaskError::PlacementExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhausted retries, got {other:?}"),
        }
        assert_eq!(probe.count("robot.set_start_and_goal"), 3);

        // The failure is local to that reset; the next one starts fresh.
        assert!(task.reset().is_ok());
    }

    #[test]
    fn retry_bound_is_configurable() {
        let probe = Probe::default();
        let policy = PlacementPolicy {
            max_attempts: 5,
            ..POLICY
        };
        let task = RandomTask::new(fake_world(&probe), 1, policy);
        probe.fail_registrations(4);
        assert!(task.reset().is_ok());
        assert_eq!(probe.count("obstacles.register_dynamic_failed"), 4);
    }

    #[test]
    fn map_updates_and_resets_never_interleave() {
        let probe = Probe::default();
        let world = fake_world_with_delay(&probe, Duration::from_millis(2));
        let task = Arc::new(RandomTask::new(world, 3, POLICY));

        let updater = {
            let task = task.clone();
            std::thread::spawn(move || {
                for _ in 0..15 {
                    task.world().update_map(OccupancyGrid::walled_room(10, 10, 1.0));
                }
            })
        };
        for _ in 0..15 {
            task.reset().unwrap();
        }
        updater.join().unwrap();

        let events = probe.events();
        assert_eq!(events.len(), 15 * 3 + 15 * 2);
        let mut i = 0;
        while i < events.len() {
            let block: &[&str] = if events[i] == "obstacles.update_map" {
                &["obstacles.update_map", "robot.update_map"]
            } else {
                &[
                    "robot.set_start_and_goal",
                    "obstacles.remove_all",
                    "obstacles.register_dynamic(3)",
                ]
            };
            assert_eq!(&events[i..i + block.len()], block, "interleaving at event {i}");
            i += block.len();
        }
    }
}
