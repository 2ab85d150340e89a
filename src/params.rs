//! Process-wide parameter store.
//!
//! Tasks publish their mode and curriculum progress here so observers (the
//! training driver, evaluation callbacks, the CLI) can read them without
//! holding a reference to the task.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

pub const TASK_MODE: &str = "task_mode";
pub const CURR_STAGE: &str = "curr_stage";
pub const LAST_STAGE_REACHED: &str = "last_stage_reached";
pub const ACTORS: &str = "actors";

/// A cloneable handle to a shared key-value map.
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    inner: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.inner.write().insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.inner.read().get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.inner.read().get(key).and_then(Value::as_u64)
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.inner
            .read()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Copy of every parameter, for logging.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.read().clone()
    }
}
