//! Random start, goal supplied by an external publisher.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use super::TaskInfo;
use crate::error::TaskError;
use crate::world::{Pose, WorldGate};

#[derive(Debug, Default)]
struct GoalSlot {
    goal: Option<Pose>,
    received: bool,
}

/// One-shot hand-off of a goal from the goal subscriber to a waiting reset.
///
/// A published goal stays pending until a reset consumes it, so a goal that
/// arrives while the reset is still placing obstacles is not lost.
#[derive(Debug, Default)]
pub struct GoalInbox {
    slot: Mutex<GoalSlot>,
    ready: Condvar,
}

impl GoalInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Goal-subscriber callback: store the goal and wake the waiter.
    pub fn publish(&self, goal: Pose) {
        let mut slot = self.slot.lock();
        slot.goal = Some(goal);
        slot.received = true;
        self.ready.notify_all();
    }

    /// Block until a goal is pending or `timeout` passes, then consume it.
    pub fn wait(&self, timeout: Duration) -> Option<Pose> {
        let mut slot = self.slot.lock();
        self.ready
            .wait_while_for(&mut slot, |slot| !slot.received, timeout);
        if !slot.received {
            return None;
        }
        slot.received = false;
        slot.goal.take()
    }
}

/// Each reset clears the world, places the robot at a random start with
/// dynamic obstacles around it, then waits for a human-supplied goal.
pub struct ManualTask {
    world: Arc<WorldGate>,
    inbox: Arc<GoalInbox>,
    actors: usize,
    robot_radius: f64,
    timeout: Duration,
}

impl ManualTask {
    pub(crate) fn new(
        world: Arc<WorldGate>,
        actors: usize,
        robot_radius: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            world,
            inbox: Arc::new(GoalInbox::new()),
            actors,
            robot_radius,
            timeout,
        }
    }

    /// The gate stays held while waiting for the goal, so map updates queue
    /// behind a pending manual reset.
    pub fn reset(&self) -> Result<TaskInfo, TaskError> {
        self.world.with_world(|world| {
            world.obstacles.remove_all_obstacles()?;
            let start = world.robot.set_start_random()?;
            world.obstacles.register_random_dynamic_obstacles(
                self.actors,
                &[start.forbidden_zone(self.robot_radius)],
            )?;

            info!(timeout = ?self.timeout, "waiting for manual goal");
            let goal = self
                .inbox
                .wait(self.timeout)
                .ok_or(TaskError::GoalTimeout(self.timeout))?;

            if let Err(e) = world.robot.publish_goal(&goal) {
                warn!(error = %e, "failed to forward manual goal");
            }
            Ok(TaskInfo::with_goal(goal.position()))
        })
    }

    pub fn world(&self) -> &Arc<WorldGate> {
        &self.world
    }

    /// Handle for the goal subscriber.
    pub fn inbox(&self) -> Arc<GoalInbox> {
        self.inbox.clone()
    }
}
