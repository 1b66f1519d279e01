use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{MazeError, PersistenceError},
    generation::StrategyKind,
    maze::Maze,
};

/// Tunables for one level. Every field has a default, so a configuration
/// file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub width: i32,
    pub height: i32,
    /// Seconds available to finish the level.
    pub time_budget: f32,
    pub ghost_count: usize,
    /// Player cells per second.
    pub player_speed: f32,
    /// Ghost cells per second.
    pub ghost_speed: f32,
    /// Fraction of the budget a ghost contact costs.
    pub hazard_penalty: f32,
    /// Wait multiplier for forward replays.
    pub replay_speed: f32,
    /// Wait multiplier for the rewind before the next level.
    pub rewind_speed: f32,
    pub light_min_angle: f32,
    pub light_max_angle: f32,
    pub seed: u64,
    pub strategy: StrategyKind,
}

impl Default for LevelConfig {
    fn default() -> Self {
        LevelConfig {
            width: 8,
            height: 8,
            time_budget: 60.0,
            ghost_count: 2,
            player_speed: 8.0,
            ghost_speed: 2.0,
            hazard_penalty: 0.3,
            replay_speed: 1.0,
            rewind_speed: 0.25,
            light_min_angle: 20.0,
            light_max_angle: 90.0,
            seed: 0,
            strategy: StrategyKind::BranchedDfs,
        }
    }
}

impl LevelConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let json = fs::read_to_string(path).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json).map_err(|source| PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), MazeError> {
        Maze::check_dimensions(self.width, self.height)
    }

    /// Configuration for the level after this one.
    pub fn next_level(&self) -> Self {
        LevelConfig {
            seed: self.seed.wrapping_add(1),
            ..self.clone()
        }
    }
}
