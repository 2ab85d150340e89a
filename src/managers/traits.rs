//! Collaborator interfaces the task variants drive.
//!
//! Every method may fail with a [`ServiceError`]; callers decide whether that
//! is worth a retry.

use crate::error::ServiceError;
use crate::world::{ForbiddenZone, OccupancyGrid, PedestrianAgent, Pose};

/// Places the robot and its navigation goal.
pub trait RobotManager: Send {
    /// Swap in a new map snapshot. Only called from inside the world gate.
    fn update_map(&mut self, map: &OccupancyGrid);

    /// Move the robot to `start` and set `goal`, sampling whichever is `None`.
    ///
    /// Returns the poses actually applied.
    fn set_start_and_goal(
        &mut self,
        start: Option<Pose>,
        goal: Option<Pose>,
    ) -> Result<(Pose, Pose), ServiceError>;

    /// Move the robot to a random free start pose without touching the goal.
    fn set_start_random(&mut self) -> Result<Pose, ServiceError>;

    /// Spawn the robot model into a freshly launched simulator.
    fn spawn_robot(&mut self) -> Result<(), ServiceError>;

    /// Forward a goal downstream (planner / path validation).
    fn publish_goal(&mut self, goal: &Pose) -> Result<(), ServiceError>;
}

/// Owns the static and dynamic obstacles currently in the world.
pub trait ObstacleManager: Send {
    fn update_map(&mut self, map: &OccupancyGrid);

    fn remove_all_obstacles(&mut self) -> Result<(), ServiceError>;

    /// Register `count` static obstacles outside `forbidden`.
    ///
    /// Returns the zones now covered by the new obstacles so later placements
    /// can avoid them.
    fn register_random_static_obstacles(
        &mut self,
        count: usize,
        forbidden: &[ForbiddenZone],
    ) -> Result<Vec<ForbiddenZone>, ServiceError>;

    /// Register `count` moving obstacles outside `forbidden`.
    fn register_random_dynamic_obstacles(
        &mut self,
        count: usize,
        forbidden: &[ForbiddenZone],
    ) -> Result<Vec<ForbiddenZone>, ServiceError>;
}

/// Drives the pedestrian (crowd) simulation.
pub trait PedestrianManager: Send {
    fn spawn_agents(&mut self, agents: &[PedestrianAgent]) -> Result<(), ServiceError>;

    /// Put every spawned agent back at its initial state.
    fn reset_all_agents(&mut self) -> Result<(), ServiceError>;
}
