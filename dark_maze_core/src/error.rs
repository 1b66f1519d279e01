use std::path::PathBuf;

use crate::Position;

/// Errors raised by maze construction, queries and generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MazeError {
    #[error(
        "Maze dimensions ({width}, {height}) must be positive and hold at most {} cells",
        crate::maze::MAX_CELLS
    )]
    InvalidDimensions { width: i32, height: i32 },
    #[error("Position ({}, {}) is out of bounds for maze size ({width}, {height})", .position.x, .position.y)]
    OutOfBounds {
        position: Position,
        width: i32,
        height: i32,
    },
    #[error("End position ({}, {}) is unreachable from the start", .end.x, .end.y)]
    Unreachable { end: Position },
    #[error("Corrupt maze snapshot: {0}")]
    CorruptSnapshot(String),
}

/// Errors raised while saving or loading persisted levels.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed level file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("No saved level under key {0}")]
    NotFound(String),
}

/// Errors raised while setting up a level session.
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error(transparent)]
    Maze(#[from] MazeError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Unknown game mode '{0}'")]
    UnknownMode(String),
}
