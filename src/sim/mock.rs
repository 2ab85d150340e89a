//! In-memory simulator for tests and dry runs.
//!
//! [`MockSimulator`] keeps a model registry, a pedestrian registry and the
//! list of published goals behind a mutex so both worker threads can use it.
//! It can be told to fail the next N spawn calls, which is how placement
//! retries are exercised without a real simulator.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::control::SimulatorControl;
use super::traits::{ModelKind, ModelSpec, Simulator};
use crate::error::{ServiceError, TaskError};
use crate::world::{OccupancyGrid, PedestrianAgent, Pose};

#[derive(Debug, Default)]
struct MockState {
    models: BTreeMap<String, ModelSpec>,
    pedestrians: Vec<PedestrianAgent>,
    pedestrian_resets: usize,
    goals: Vec<(String, Pose)>,
    failing_spawns: usize,
    running: bool,
    actors: usize,
    launches: usize,
}

/// A scripted simulator holding all state in memory.
#[derive(Debug)]
pub struct MockSimulator {
    map: OccupancyGrid,
    state: Mutex<MockState>,
}

impl MockSimulator {
    /// A running simulator serving a 20 m x 20 m walled room.
    pub fn new() -> Self {
        Self::with_map(OccupancyGrid::walled_room(200, 200, 0.1))
    }

    pub fn with_map(map: OccupancyGrid) -> Self {
        Self {
            map,
            state: Mutex::new(MockState {
                running: true,
                ..MockState::default()
            }),
        }
    }

    /// Pre-register a robot model, as if the launch file had spawned it.
    pub fn with_robot(self, name: &str) -> Self {
        self.state.lock().models.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                kind: ModelKind::Robot,
                pose: Pose::default(),
                radius: 0.3,
            },
        );
        self
    }

    /// Make the next `n` spawn calls fail with a service error.
    pub fn fail_next_spawns(&self, n: usize) {
        self.state.lock().failing_spawns = n;
    }

    pub fn model_names(&self) -> Vec<String> {
        self.state.lock().models.keys().cloned().collect()
    }

    pub fn count_models(&self, kind: ModelKind) -> usize {
        self.state
            .lock()
            .models
            .values()
            .filter(|m| m.kind == kind)
            .count()
    }

    pub fn pedestrians(&self) -> Vec<PedestrianAgent> {
        self.state.lock().pedestrians.clone()
    }

    pub fn pedestrian_resets(&self) -> usize {
        self.state.lock().pedestrian_resets
    }

    pub fn published_goals(&self) -> Vec<(String, Pose)> {
        self.state.lock().goals.clone()
    }

    /// Actor count of the currently generated world.
    pub fn world_actors(&self) -> usize {
        self.state.lock().actors
    }

    pub fn launches(&self) -> usize {
        self.state.lock().launches
    }

    fn ensure_running(state: &MockState, service: &str) -> Result<(), ServiceError> {
        if state.running {
            Ok(())
        } else {
            Err(ServiceError::Unavailable(service.to_string()))
        }
    }
}

impl Default for MockSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator for MockSimulator {
    fn get_map(&self) -> Result<OccupancyGrid, ServiceError> {
        Ok(self.map.clone())
    }

    fn spawn_model(&self, model: &ModelSpec) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        Self::ensure_running(&state, "/spawn_model")?;
        if state.failing_spawns > 0 {
            state.failing_spawns -= 1;
            return Err(ServiceError::call("/spawn_model", "injected failure"));
        }
        debug!(name = %model.name, kind = ?model.kind, "mock spawn");
        state.models.insert(model.name.clone(), model.clone());
        Ok(())
    }

    fn delete_model(&self, name: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        Self::ensure_running(&state, "/delete_model")?;
        state.models.remove(name);
        Ok(())
    }

    fn set_model_state(&self, name: &str, pose: &Pose) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        Self::ensure_running(&state, "/set_model_state")?;
        match state.models.get_mut(name) {
            Some(model) => {
                model.pose = *pose;
                Ok(())
            }
            None => Err(ServiceError::call(
                "/set_model_state",
                format!("model `{name}` does not exist"),
            )),
        }
    }

    fn get_model_state(&self, name: &str) -> Result<Pose, ServiceError> {
        let state = self.state.lock();
        Self::ensure_running(&state, "/get_model_state")?;
        state.models.get(name).map(|m| m.pose).ok_or_else(|| {
            ServiceError::call("/get_model_state", format!("model `{name}` does not exist"))
        })
    }

    fn service_available(&self, _service: &str) -> bool {
        self.state.lock().running
    }

    fn spawn_pedestrians(&self, agents: &[PedestrianAgent]) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        Self::ensure_running(&state, "/pedsim/spawn_peds")?;
        state.pedestrians.extend_from_slice(agents);
        Ok(())
    }

    fn reset_pedestrians(&self) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        Self::ensure_running(&state, "/pedsim/reset_all_peds")?;
        state.pedestrian_resets += 1;
        Ok(())
    }

    fn publish_goal(&self, topic: &str, goal: &Pose) -> Result<(), ServiceError> {
        self.state.lock().goals.push((topic.to_string(), *goal));
        Ok(())
    }
}

/// Restarts a [`MockSimulator`] in place.
///
/// Terminating wipes the model registry and takes services offline until the
/// next relaunch.
pub struct MockSimulatorControl {
    sim: Arc<MockSimulator>,
    pending_actors: usize,
}

impl MockSimulatorControl {
    pub fn new(sim: Arc<MockSimulator>) -> Self {
        Self {
            sim,
            pending_actors: 0,
        }
    }
}

impl SimulatorControl for MockSimulatorControl {
    fn terminate(&mut self) -> Result<(), TaskError> {
        let mut state = self.sim.state.lock();
        state.running = false;
        state.models.clear();
        state.pedestrians.clear();
        Ok(())
    }

    fn regenerate_world(&mut self, actors: usize) -> Result<(), TaskError> {
        self.pending_actors = actors;
        Ok(())
    }

    fn relaunch(&mut self) -> Result<(), TaskError> {
        let mut state = self.sim.state.lock();
        state.actors = self.pending_actors;
        state.running = true;
        state.launches += 1;
        Ok(())
    }

    fn wait_until_ready(&mut self) -> Result<(), TaskError> {
        if self.sim.service_available("/spawn_urdf_model") {
            Ok(())
        } else {
            Err(TaskError::SimulatorNotReady {
                service: "/spawn_urdf_model".into(),
                waited: std::time::Duration::ZERO,
            })
        }
    }
}
