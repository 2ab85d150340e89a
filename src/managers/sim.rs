//! Manager implementations that drive a [`Simulator`] directly.
//!
//! Positions are drawn uniformly from free cells of the current occupancy
//! grid. Each manager keeps its own copy of the map, refreshed through
//! `update_map` from inside the world gate.

use std::f64::consts::PI;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::traits::{ObstacleManager, PedestrianManager, RobotManager};
use crate::config::TaskConfig;
use crate::error::ServiceError;
use crate::sim::{ModelKind, ModelSpec, Simulator};
use crate::world::{ForbiddenZone, OccupancyGrid, PedestrianAgent, Pose};

/// Topics a goal is published on: the task goal and the planner goal.
pub const GOAL_TOPICS: [&str; 2] = ["/goal", "/move_base_simple/goal"];

fn random_yaw(rng: &mut StdRng) -> f64 {
    rng.gen_range(-PI..PI)
}

// ---------------------------------------------------------------------------
// Robot
// ---------------------------------------------------------------------------

pub struct SimRobotManager {
    sim: Arc<dyn Simulator>,
    map: OccupancyGrid,
    model_name: String,
    radius: f64,
    min_goal_distance: f64,
    samples: usize,
    rng: StdRng,
}

impl SimRobotManager {
    pub fn new(
        sim: Arc<dyn Simulator>,
        map: OccupancyGrid,
        model_name: &str,
        config: &TaskConfig,
    ) -> Self {
        Self {
            sim,
            map,
            model_name: model_name.to_string(),
            radius: config.robot_radius,
            min_goal_distance: config.min_start_goal_distance,
            samples: config.placement_samples,
            rng: StdRng::from_entropy(),
        }
    }

    /// Reseed the sampler, for reproducible layouts.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn sample_pose(&mut self, what: &str, away_from: Option<&Pose>) -> Result<Pose, ServiceError> {
        let min_distance = self.min_goal_distance;
        let pos = self
            .map
            .sample_free(&mut self.rng, self.radius, self.samples, |p| {
                away_from.map_or(true, |other| other.position().distance(p) >= min_distance)
            })
            .ok_or_else(|| ServiceError::NoFreeSpace {
                what: what.to_string(),
                samples: self.samples,
            })?;
        Ok(Pose::new(pos.x, pos.y, random_yaw(&mut self.rng)))
    }
}

impl RobotManager for SimRobotManager {
    fn update_map(&mut self, map: &OccupancyGrid) {
        self.map = map.clone();
    }

    fn set_start_and_goal(
        &mut self,
        start: Option<Pose>,
        goal: Option<Pose>,
    ) -> Result<(Pose, Pose), ServiceError> {
        let start = match start {
            Some(pose) => pose,
            None => self.sample_pose("robot start", None)?,
        };
        let goal = match goal {
            Some(pose) => pose,
            None => self.sample_pose("robot goal", Some(&start))?,
        };
        self.sim.set_model_state(&self.model_name, &start)?;
        self.sim.publish_goal(GOAL_TOPICS[0], &goal)?;
        debug!(?start, ?goal, "robot start and goal set");
        Ok((start, goal))
    }

    fn set_start_random(&mut self) -> Result<Pose, ServiceError> {
        let start = self.sample_pose("robot start", None)?;
        self.sim.set_model_state(&self.model_name, &start)?;
        Ok(start)
    }

    fn spawn_robot(&mut self) -> Result<(), ServiceError> {
        let pose = self.sample_pose("robot spawn", None)?;
        self.sim.spawn_model(&ModelSpec {
            name: self.model_name.clone(),
            kind: ModelKind::Robot,
            pose,
            radius: self.radius,
        })
    }

    fn publish_goal(&mut self, goal: &Pose) -> Result<(), ServiceError> {
        for topic in GOAL_TOPICS {
            self.sim.publish_goal(topic, goal)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Obstacles
// ---------------------------------------------------------------------------

pub struct SimObstacleManager {
    sim: Arc<dyn Simulator>,
    map: OccupancyGrid,
    radius: f64,
    samples: usize,
    rng: StdRng,
    /// Names of the models currently spawned, in spawn order.
    spawned: Vec<String>,
    next_id: usize,
}

impl SimObstacleManager {
    pub fn new(sim: Arc<dyn Simulator>, map: OccupancyGrid, config: &TaskConfig) -> Self {
        Self {
            sim,
            map,
            radius: config.obstacle_radius,
            samples: config.placement_samples,
            rng: StdRng::from_entropy(),
            spawned: Vec::new(),
            next_id: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn spawned(&self) -> &[String] {
        &self.spawned
    }

    fn register(
        &mut self,
        kind: ModelKind,
        count: usize,
        forbidden: &[ForbiddenZone],
    ) -> Result<Vec<ForbiddenZone>, ServiceError> {
        let prefix = match kind {
            ModelKind::StaticObstacle => "obs_static",
            _ => "obs_dynamic",
        };
        let mut zones = forbidden.to_vec();
        let mut placed = Vec::with_capacity(count);
        for _ in 0..count {
            let radius = self.radius;
            let pos = self
                .map
                .sample_free(&mut self.rng, radius, self.samples, |p| {
                    zones.iter().all(|z| !z.overlaps(p, radius))
                })
                .ok_or_else(|| ServiceError::NoFreeSpace {
                    what: prefix.to_string(),
                    samples: self.samples,
                })?;
            let name = format!("{prefix}_{:03}", self.next_id);
            let pose = Pose::new(pos.x, pos.y, random_yaw(&mut self.rng));
            self.sim.spawn_model(&ModelSpec {
                name: name.clone(),
                kind,
                pose,
                radius,
            })?;
            self.next_id += 1;
            self.spawned.push(name);
            let zone = pose.forbidden_zone(radius);
            zones.push(zone);
            placed.push(zone);
        }
        debug!(kind = ?kind, count, "obstacles registered");
        Ok(placed)
    }
}

impl ObstacleManager for SimObstacleManager {
    fn update_map(&mut self, map: &OccupancyGrid) {
        self.map = map.clone();
    }

    fn remove_all_obstacles(&mut self) -> Result<(), ServiceError> {
        while let Some(name) = self.spawned.last() {
            self.sim.delete_model(name)?;
            self.spawned.pop();
        }
        Ok(())
    }

    fn register_random_static_obstacles(
        &mut self,
        count: usize,
        forbidden: &[ForbiddenZone],
    ) -> Result<Vec<ForbiddenZone>, ServiceError> {
        self.register(ModelKind::StaticObstacle, count, forbidden)
    }

    fn register_random_dynamic_obstacles(
        &mut self,
        count: usize,
        forbidden: &[ForbiddenZone],
    ) -> Result<Vec<ForbiddenZone>, ServiceError> {
        self.register(ModelKind::DynamicObstacle, count, forbidden)
    }
}

// ---------------------------------------------------------------------------
// Pedestrians
// ---------------------------------------------------------------------------

pub struct SimPedestrianManager {
    sim: Arc<dyn Simulator>,
    spawned: usize,
}

impl SimPedestrianManager {
    pub fn new(sim: Arc<dyn Simulator>) -> Self {
        Self { sim, spawned: 0 }
    }
}

impl PedestrianManager for SimPedestrianManager {
    fn spawn_agents(&mut self, agents: &[PedestrianAgent]) -> Result<(), ServiceError> {
        self.sim.spawn_pedestrians(agents)?;
        self.spawned += agents.len();
        debug!(count = agents.len(), "pedestrian agents spawned");
        Ok(())
    }

    fn reset_all_agents(&mut self) -> Result<(), ServiceError> {
        if self.spawned == 0 {
            return Ok(());
        }
        self.sim.reset_pedestrians()
    }
}
