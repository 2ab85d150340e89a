//! The world-state gate.
//!
//! One mutex guards the current map together with the managers that read it.
//! Map updates, episode resets and curriculum stage transitions all run as a
//! closure over `&mut World` while holding it, so none of them can observe
//! another half-applied. The closure has no handle back to the gate, which
//! rules out re-entrant locking.

use parking_lot::Mutex;
use tracing::debug;

use super::types::OccupancyGrid;
use crate::managers::{ObstacleManager, PedestrianManager, RobotManager};

/// Everything a reset may touch.
pub struct World {
    pub map: OccupancyGrid,
    pub robot: Box<dyn RobotManager>,
    pub obstacles: Box<dyn ObstacleManager>,
    pub pedestrians: Box<dyn PedestrianManager>,
}

impl World {
    pub fn new(
        map: OccupancyGrid,
        robot: Box<dyn RobotManager>,
        obstacles: Box<dyn ObstacleManager>,
        pedestrians: Box<dyn PedestrianManager>,
    ) -> Self {
        Self {
            map,
            robot,
            obstacles,
            pedestrians,
        }
    }
}

/// Serialises every access to the [`World`].
pub struct WorldGate {
    world: Mutex<World>,
}

impl WorldGate {
    pub fn new(world: World) -> Self {
        Self {
            world: Mutex::new(world),
        }
    }

    /// Map-update handler. Blocks while a reset or transition is in progress.
    pub fn update_map(&self, map: OccupancyGrid) {
        let mut world = self.world.lock();
        world.obstacles.update_map(&map);
        world.robot.update_map(&map);
        debug!(width = map.width, height = map.height, "map updated");
        world.map = map;
    }

    /// Run `f` with exclusive access to the world.
    pub fn with_world<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        let mut world = self.world.lock();
        f(&mut world)
    }
}
