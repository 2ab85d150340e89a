//! Arena task generation: episode resets and a staged training curriculum for
//! robot-navigation reinforcement learning.
//!
//! A [`Task`](task::Task) prepares the simulated world between episodes:
//! robot start and goal, obstacles and pedestrians. The staged variant moves
//! through a curriculum of growing obstacle populations, restarting the
//! simulator when the population changes, and persists its progress to the
//! agent's hyperparameter file.

pub mod config;
pub mod curriculum;
pub mod error;
pub mod managers;
pub mod params;
pub mod sim;
pub mod task;
pub mod training;
pub mod world;

#[cfg(test)]
mod testing;
