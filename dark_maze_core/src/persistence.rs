use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Position, error::PersistenceError};

/// Persisted state of one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    pub x: i32,
    pub y: i32,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    /// See [`crate::ItemKind::code`].
    pub item: i32,
}

/// Persisted maze: dimensions plus one record per cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MazeSnapshot {
    pub width: i32,
    pub height: i32,
    pub cells: Vec<CellRecord>,
}

/// Everything needed to rebuild a level exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub maze: MazeSnapshot,
    pub time_budget: f32,
    pub mode: String,
    /// Ghost spawn positions.
    pub hazards: Vec<Position>,
}

/// Identifies a stored level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LevelKey {
    pub mode: String,
    pub width: i32,
    pub height: i32,
    pub level: u32,
}

impl LevelKey {
    pub fn new(mode: impl Into<String>, width: i32, height: i32, level: u32) -> Self {
        LevelKey {
            mode: mode.into(),
            width,
            height,
            level,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{self}.json")
    }
}

impl fmt::Display for LevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}x{}_{}",
            self.mode, self.width, self.height, self.level
        )
    }
}

/// Durable storage for level records.
///
/// Stores never retry or fall back; a failed load is the caller's to handle,
/// typically by generating a fresh level.
pub trait LevelStore {
    fn save(&mut self, record: &LevelRecord, key: &LevelKey) -> Result<(), PersistenceError>;

    fn load(&self, key: &LevelKey) -> Result<LevelRecord, PersistenceError>;
}

/// Stores each level as a pretty-printed JSON file in one directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonFileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &LevelKey) -> PathBuf {
        self.root.join(key.file_name())
    }
}

impl LevelStore for JsonFileStore {
    fn save(&mut self, record: &LevelRecord, key: &LevelKey) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        fs::create_dir_all(&self.root).map_err(|source| PersistenceError::Io {
            path: self.root.clone(),
            source,
        })?;
        let json = serde_json::to_string_pretty(record).map_err(|source| {
            PersistenceError::Json {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&path, json).map_err(|source| PersistenceError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "level saved");
        Ok(())
    }

    fn load(&self, key: &LevelKey) -> Result<LevelRecord, PersistenceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Err(PersistenceError::NotFound(key.to_string()));
        }
        let json = fs::read_to_string(&path).map_err(|source| PersistenceError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| PersistenceError::Json { path, source })
    }
}

/// In-memory store, handy for tests and for keeping levels of one session.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<LevelKey, LevelRecord>,
}

impl LevelStore for MemoryStore {
    fn save(&mut self, record: &LevelRecord, key: &LevelKey) -> Result<(), PersistenceError> {
        self.records.insert(key.clone(), record.clone());
        Ok(())
    }

    fn load(&self, key: &LevelKey) -> Result<LevelRecord, PersistenceError> {
        self.records
            .get(key)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LevelRecord {
        LevelRecord {
            maze: MazeSnapshot {
                width: 1,
                height: 1,
                cells: vec![CellRecord {
                    x: 0,
                    y: 0,
                    up: true,
                    down: true,
                    left: true,
                    right: false,
                    item: 2,
                }],
            },
            time_budget: 30.0,
            mode: "escape".to_string(),
            hazards: vec![Position::new(0, 0)],
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dark_maze_{}_{}", name, std::process::id()))
    }

    #[test]
    fn hazards_are_stored_as_integer_pairs() {
        let mut record = record();
        record.hazards = vec![Position::new(0, 0), Position::new(3, -1)];
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["hazards"], serde_json::json!([[0, 0], [3, -1]]));

        let back: LevelRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.hazards, record.hazards);
    }

    #[test]
    fn key_formats_as_file_name() {
        let key = LevelKey::new("key-hunt", 8, 16, 3);
        assert_eq!(key.file_name(), "key-hunt_8x16_3.json");
    }

    #[test]
    fn json_store_round_trip() {
        let root = scratch_dir("round_trip");
        let mut store = JsonFileStore::new(&root);
        let key = LevelKey::new("escape", 1, 1, 0);

        store.save(&record(), &key).unwrap();
        assert_eq!(store.load(&key).unwrap(), record());

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn missing_level_is_not_found() {
        let store = JsonFileStore::new(scratch_dir("missing"));
        let err = store.load(&LevelKey::new("escape", 2, 2, 9)).unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }

    #[test]
    fn corrupt_file_is_a_json_error() {
        let root = scratch_dir("corrupt");
        let store = JsonFileStore::new(&root);
        let key = LevelKey::new("escape", 1, 1, 1);
        fs::create_dir_all(&root).unwrap();
        fs::write(store.path_for(&key), "{ not json").unwrap();

        let err = store.load(&key).unwrap_err();
        assert!(matches!(err, PersistenceError::Json { .. }));

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn memory_store_keeps_records_apart() {
        let mut store = MemoryStore::default();
        store.save(&record(), &LevelKey::new("escape", 1, 1, 0)).unwrap();
        assert!(store.load(&LevelKey::new("escape", 1, 1, 1)).is_err());
        assert!(store.load(&LevelKey::new("escape", 1, 1, 0)).is_ok());
    }
}
