//! Simulator bridge reached over HTTP.
//!
//! The bridge process translates these JSON endpoints into the simulator's
//! native service calls:
//!
//! - `GET  {base}/static_map`
//! - `POST {base}/spawn_model`       -- body: [`ModelSpec`]
//! - `POST {base}/delete_model`      -- body: `{"name": ...}`
//! - `POST {base}/set_model_state`   -- body: `{"name": ..., "pose": ...}`
//! - `GET  {base}/model_state/{name}`
//! - `GET  {base}/services/{name}`   -- 200 when the service is registered
//! - `POST {base}/pedsim/spawn_peds` -- body: `[PedestrianAgent]`
//! - `POST {base}/pedsim/reset_all_peds`
//! - `POST {base}/goal`              -- body: `{"topic": ..., "pose": ...}`

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::traits::{ModelSpec, Simulator};
use crate::error::ServiceError;
use crate::world::{OccupancyGrid, PedestrianAgent, Pose};

/// Blocking HTTP client for a simulator bridge.
#[derive(Debug, Clone)]
pub struct HttpSimulator {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl HttpSimulator {
    /// Create a client for the bridge at `base_url` (e.g. `http://localhost:11400`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::call("http client", e))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn get<T: DeserializeOwned>(&self, service: &str, path: &str) -> Result<T, ServiceError> {
        debug!(service, "GET simulator service");
        self.http
            .get(self.url(path))
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ServiceError::call(service, e))?
            .json()
            .map_err(|e| ServiceError::call(service, format!("bad response: {e}")))
    }

    fn post<B: Serialize + ?Sized>(
        &self,
        service: &str,
        path: &str,
        body: &B,
    ) -> Result<(), ServiceError> {
        debug!(service, "POST simulator service");
        self.http
            .post(self.url(path))
            .json(body)
            .send()
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|e| ServiceError::call(service, e))
    }
}

impl Simulator for HttpSimulator {
    fn get_map(&self) -> Result<OccupancyGrid, ServiceError> {
        self.get("/static_map", "static_map")
    }

    fn spawn_model(&self, model: &ModelSpec) -> Result<(), ServiceError> {
        self.post("/spawn_model", "spawn_model", model)
    }

    fn delete_model(&self, name: &str) -> Result<(), ServiceError> {
        self.post(
            "/delete_model",
            "delete_model",
            &serde_json::json!({ "name": name }),
        )
    }

    fn set_model_state(&self, name: &str, pose: &Pose) -> Result<(), ServiceError> {
        self.post(
            "/set_model_state",
            "set_model_state",
            &serde_json::json!({ "name": name, "pose": pose }),
        )
    }

    fn get_model_state(&self, name: &str) -> Result<Pose, ServiceError> {
        self.get("/get_model_state", &format!("model_state/{name}"))
    }

    fn service_available(&self, service: &str) -> bool {
        let name = service.trim_start_matches('/');
        self.http
            .get(self.url(&format!("services/{name}")))
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn spawn_pedestrians(&self, agents: &[PedestrianAgent]) -> Result<(), ServiceError> {
        self.post("/pedsim/spawn_peds", "pedsim/spawn_peds", agents)
    }

    fn reset_pedestrians(&self) -> Result<(), ServiceError> {
        self.post(
            "/pedsim/reset_all_peds",
            "pedsim/reset_all_peds",
            &serde_json::json!({}),
        )
    }

    fn publish_goal(&self, topic: &str, goal: &Pose) -> Result<(), ServiceError> {
        self.post(
            "/goal",
            "goal",
            &serde_json::json!({ "topic": topic, "pose": goal }),
        )
    }
}
