//! The narrow service surface this crate needs from a running simulator.

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::world::{OccupancyGrid, PedestrianAgent, Pose};

/// What kind of model is being spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Robot,
    StaticObstacle,
    DynamicObstacle,
}

/// A model to insert into the simulated world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub kind: ModelKind,
    pub pose: Pose,
    /// Footprint radius in metres.
    pub radius: f64,
}

/// Synchronous simulator services.
///
/// Implementations must be shareable between the training thread and the
/// callback thread.
pub trait Simulator: Send + Sync {
    /// Fetch the current static occupancy grid.
    fn get_map(&self) -> Result<OccupancyGrid, ServiceError>;

    fn spawn_model(&self, model: &ModelSpec) -> Result<(), ServiceError>;

    fn delete_model(&self, name: &str) -> Result<(), ServiceError>;

    fn set_model_state(&self, name: &str, pose: &Pose) -> Result<(), ServiceError>;

    fn get_model_state(&self, name: &str) -> Result<Pose, ServiceError>;

    /// Whether the named service is currently answering.
    fn service_available(&self, service: &str) -> bool;

    fn spawn_pedestrians(&self, agents: &[PedestrianAgent]) -> Result<(), ServiceError>;

    fn reset_pedestrians(&self) -> Result<(), ServiceError>;

    /// Publish a navigation goal on the named topic.
    fn publish_goal(&self, topic: &str, goal: &Pose) -> Result<(), ServiceError>;
}
