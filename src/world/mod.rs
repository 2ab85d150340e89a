//! World state shared between the map callback and the task variants.
//!
//! - [`types`] -- poses, forbidden zones, the occupancy grid and pedestrian
//!   definitions.
//! - [`gate`] -- [`WorldGate`], the single lock every reset and map update
//!   goes through.

pub mod gate;
pub mod types;

pub use gate::{World, WorldGate};
pub use types::{ForbiddenZone, OccupancyGrid, PedestrianAgent, Pose, Position};
