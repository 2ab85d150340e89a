//! World collaborators: robot placement, obstacles and pedestrians.
//!
//! The task variants only see the traits in [`traits`]; [`sim`] provides the
//! implementations the factory binds to a [`Simulator`](crate::sim::Simulator).

pub mod sim;
pub mod traits;

pub use sim::{SimObstacleManager, SimPedestrianManager, SimRobotManager, GOAL_TOPICS};
pub use traits::{ObstacleManager, PedestrianManager, RobotManager};
