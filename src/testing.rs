//! Recording test doubles for the world collaborators.
//!
//! Every double appends to a shared [`Probe`] so tests can assert on the exact
//! order of calls, including across threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{ServiceError, TaskError};
use crate::managers::{ObstacleManager, PedestrianManager, RobotManager};
use crate::sim::SimulatorControl;
use crate::world::{ForbiddenZone, OccupancyGrid, PedestrianAgent, Pose, World, WorldGate};

#[derive(Clone, Default)]
pub(crate) struct Probe {
    events: Arc<Mutex<Vec<String>>>,
    goals: Arc<Mutex<Vec<Pose>>>,
    registrations: Arc<Mutex<Vec<(usize, Vec<ForbiddenZone>)>>>,
    failing_registrations: Arc<AtomicUsize>,
}

impl Probe {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    /// Goals forwarded through `RobotManager::publish_goal`.
    pub fn published_goals(&self) -> Vec<Pose> {
        self.goals.lock().clone()
    }

    /// `(count, forbidden zones)` of every successful dynamic registration.
    pub fn registrations(&self) -> Vec<(usize, Vec<ForbiddenZone>)> {
        self.registrations.lock().clone()
    }

    /// Make the next `n` dynamic registrations fail.
    pub fn fail_registrations(&self, n: usize) {
        self.failing_registrations.store(n, Ordering::SeqCst);
    }
}

pub(crate) struct FakeRobot {
    probe: Probe,
    resets: usize,
    /// Pause inside each call, to widen race windows.
    delay: Duration,
}

impl RobotManager for FakeRobot {
    fn update_map(&mut self, _map: &OccupancyGrid) {
        self.probe.push("robot.update_map");
    }

    fn set_start_and_goal(
        &mut self,
        start: Option<Pose>,
        goal: Option<Pose>,
    ) -> Result<(Pose, Pose), ServiceError> {
        std::thread::sleep(self.delay);
        self.resets += 1;
        let start = start.unwrap_or(Pose::new(1.0, 1.0, 0.0));
        let goal = goal.unwrap_or(Pose::new(5.0 + self.resets as f64, 5.0, 0.0));
        self.probe.push("robot.set_start_and_goal");
        Ok((start, goal))
    }

    fn set_start_random(&mut self) -> Result<Pose, ServiceError> {
        self.probe.push("robot.set_start_random");
        Ok(Pose::new(2.0, 2.0, 0.0))
    }

    fn spawn_robot(&mut self) -> Result<(), ServiceError> {
        self.probe.push("robot.spawn");
        Ok(())
    }

    fn publish_goal(&mut self, goal: &Pose) -> Result<(), ServiceError> {
        self.probe.push("robot.publish_goal");
        self.probe.goals.lock().push(*goal);
        Ok(())
    }
}

pub(crate) struct FakeObstacles {
    probe: Probe,
    delay: Duration,
}

impl ObstacleManager for FakeObstacles {
    fn update_map(&mut self, _map: &OccupancyGrid) {
        std::thread::sleep(self.delay);
        self.probe.push("obstacles.update_map");
    }

    fn remove_all_obstacles(&mut self) -> Result<(), ServiceError> {
        std::thread::sleep(self.delay);
        self.probe.push("obstacles.remove_all");
        Ok(())
    }

    fn register_random_static_obstacles(
        &mut self,
        count: usize,
        _forbidden: &[ForbiddenZone],
    ) -> Result<Vec<ForbiddenZone>, ServiceError> {
        self.probe.push(format!("obstacles.register_static({count})"));
        Ok(Vec::new())
    }

    fn register_random_dynamic_obstacles(
        &mut self,
        count: usize,
        forbidden: &[ForbiddenZone],
    ) -> Result<Vec<ForbiddenZone>, ServiceError> {
        std::thread::sleep(self.delay);
        let failing = &self.probe.failing_registrations;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.probe.push("obstacles.register_dynamic_failed");
            return Err(ServiceError::call("/spawn_model", "transient failure"));
        }
        self.probe.push(format!("obstacles.register_dynamic({count})"));
        self.probe
            .registrations
            .lock()
            .push((count, forbidden.to_vec()));
        Ok(Vec::new())
    }
}

pub(crate) struct FakePedestrians {
    probe: Probe,
}

impl PedestrianManager for FakePedestrians {
    fn spawn_agents(&mut self, agents: &[PedestrianAgent]) -> Result<(), ServiceError> {
        self.probe.push(format!("peds.spawn({})", agents.len()));
        Ok(())
    }

    fn reset_all_agents(&mut self) -> Result<(), ServiceError> {
        self.probe.push("peds.reset");
        Ok(())
    }
}

/// Records the simulator restart sequence.
pub(crate) struct FakeControl {
    pub probe: Probe,
}

impl SimulatorControl for FakeControl {
    fn terminate(&mut self) -> Result<(), TaskError> {
        self.probe.push("sim.terminate");
        Ok(())
    }

    fn regenerate_world(&mut self, actors: usize) -> Result<(), TaskError> {
        self.probe.push(format!("sim.regenerate({actors})"));
        Ok(())
    }

    fn relaunch(&mut self) -> Result<(), TaskError> {
        self.probe.push("sim.relaunch");
        Ok(())
    }

    fn wait_until_ready(&mut self) -> Result<(), TaskError> {
        self.probe.push("sim.ready");
        Ok(())
    }
}

/// A gate over fake managers that all report into `probe`.
pub(crate) fn fake_world(probe: &Probe) -> Arc<WorldGate> {
    fake_world_with_delay(probe, Duration::ZERO)
}

pub(crate) fn fake_world_with_delay(probe: &Probe, delay: Duration) -> Arc<WorldGate> {
    Arc::new(WorldGate::new(World::new(
        OccupancyGrid::walled_room(10, 10, 1.0),
        Box::new(FakeRobot {
            probe: probe.clone(),
            resets: 0,
            delay,
        }),
        Box::new(FakeObstacles {
            probe: probe.clone(),
            delay,
        }),
        Box::new(FakePedestrians {
            probe: probe.clone(),
        }),
    )))
}
