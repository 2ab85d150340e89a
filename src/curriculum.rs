//! Training curriculum definitions.
//!
//! The curriculum file is a YAML mapping from 1-based stage index to obstacle
//! counts:
//!
//! ```yaml
//! 1: { static: 0, dynamic: 0 }
//! 2: { static: 5, dynamic: 2 }
//! 3: { static: 10, dynamic: 6 }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Obstacle population of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    #[serde(rename = "static")]
    pub static_count: usize,
    #[serde(rename = "dynamic")]
    pub dynamic_count: usize,
}

/// Immutable, contiguous `1..=N` stage table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTable {
    stages: Vec<StageDefinition>,
}

impl StageTable {
    /// Build from stage definitions ordered from stage 1 upwards.
    pub fn new(stages: Vec<StageDefinition>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::CurriculumMalformed {
                path: Default::default(),
                reason: "curriculum defines no stages".into(),
            });
        }
        Ok(Self { stages })
    }

    /// Read and validate a curriculum file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::CurriculumMissing(path.to_path_buf()));
        }
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::CurriculumMalformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::from_yaml_str(&text).map_err(|reason| ConfigError::CurriculumMalformed {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse a YAML stage mapping, requiring keys `1..=N` without gaps.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, String> {
        let raw: BTreeMap<usize, StageDefinition> =
            serde_yaml::from_str(yaml).map_err(|e| format!("has to encode a stage mapping: {e}"))?;
        if raw.is_empty() {
            return Err("curriculum defines no stages".into());
        }
        for (expected, stage) in (1..).zip(raw.keys()) {
            if *stage != expected {
                return Err(format!(
                    "stage indices must be contiguous from 1, expected {expected} but found {stage}"
                ));
            }
        }
        Ok(Self {
            stages: raw.into_values().collect(),
        })
    }

    /// Number of stages `N`.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Definition of a 1-based stage.
    pub fn get(&self, stage: usize) -> Option<&StageDefinition> {
        stage.checked_sub(1).and_then(|i| self.stages.get(i))
    }

    pub fn contains(&self, stage: usize) -> bool {
        (1..=self.len()).contains(&stage)
    }

    /// `(stage, definition)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &StageDefinition)> {
        (1..).zip(self.stages.iter())
    }
}

/// Progress through the curriculum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumState {
    pub current_stage: usize,
    pub last_stage_reached: bool,
}
