use serde::{Deserialize, Serialize};

use crate::{Direction, ItemKind, Position};

/// State of one wall segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WallState {
    #[default]
    Exists,
    Destroyed,
}

impl WallState {
    pub fn from_exists(exists: bool) -> Self {
        if exists {
            WallState::Exists
        } else {
            WallState::Destroyed
        }
    }

    pub fn exists(self) -> bool {
        self == WallState::Exists
    }
}

/// A single maze cell: its four walls and the item lying on it.
///
/// Walls are indexed by [`Direction::wall_index`]. A cell never changes its
/// own walls' symmetry partner; that is [`crate::maze::Maze::set_wall`]'s job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    position: Position,
    walls: [WallState; 4],
    pub item: ItemKind,
}

impl Cell {
    pub fn new(position: Position, wall_state: WallState) -> Self {
        Cell {
            position,
            walls: [wall_state; 4],
            item: ItemKind::None,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Wall state facing `direction`; [`Direction::None`] is always open.
    pub fn wall(&self, direction: Direction) -> WallState {
        match direction.wall_index() {
            Some(index) => self.walls[index],
            None => WallState::Destroyed,
        }
    }

    pub(crate) fn set_wall(&mut self, direction: Direction, state: WallState) {
        if let Some(index) = direction.wall_index() {
            self.walls[index] = state;
        }
    }

    /// Cardinal directions whose wall is destroyed.
    pub fn open_directions(&self) -> impl Iterator<Item = Direction> + '_ {
        Direction::CARDINAL
            .into_iter()
            .filter(|direction| !self.wall(*direction).exists())
    }

    pub fn has_item(&self) -> bool {
        self.item.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cell_is_uniform_and_empty() {
        let cell = Cell::new(Position::new(1, 2), WallState::Exists);
        assert!(Direction::CARDINAL.iter().all(|d| cell.wall(*d).exists()));
        assert!(!cell.has_item());
        assert_eq!(cell.open_directions().count(), 0);
    }

    #[test]
    fn no_movement_has_no_wall() {
        let cell = Cell::new(Position::new(0, 0), WallState::Exists);
        assert_eq!(cell.wall(Direction::None), WallState::Destroyed);
    }
}
