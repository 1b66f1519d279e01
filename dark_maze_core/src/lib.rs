use std::ops::{Add, AddAssign, Neg};

use serde::{Deserialize, Serialize};

pub mod agent;
pub mod cell;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod generation;
pub mod grid;
pub mod history;
pub mod level;
pub mod maze;
pub mod mode;
pub mod persistence;

/// Represents a 2D coordinate. `y` grows upward.
///
/// Serialized as an `[x, y]` integer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Position::new(x, y)
    }
}

impl From<Position> for (i32, i32) {
    fn from(position: Position) -> Self {
        (position.x, position.y)
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Add<Direction> for Position {
    type Output = Position;

    fn add(self, rhs: Direction) -> Position {
        self + rhs.delta()
    }
}

impl AddAssign<Direction> for Position {
    fn add_assign(&mut self, rhs: Direction) {
        *self = *self + rhs;
    }
}

/// One of the four cardinal directions, or no movement at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// The four directions that actually move, in wall-index order.
    pub const CARDINAL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Position offset applied by a step in this direction.
    pub const fn delta(self) -> Position {
        match self {
            Direction::None => Position::new(0, 0),
            Direction::Up => Position::new(0, 1),
            Direction::Down => Position::new(0, -1),
            Direction::Left => Position::new(-1, 0),
            Direction::Right => Position::new(1, 0),
        }
    }

    pub const fn opposite(self) -> Direction {
        match self {
            Direction::None => Direction::None,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Index into a cell's wall array, `None` for [`Direction::None`].
    pub const fn wall_index(self) -> Option<usize> {
        match self {
            Direction::None => None,
            Direction::Up => Some(0),
            Direction::Down => Some(1),
            Direction::Left => Some(2),
            Direction::Right => Some(3),
        }
    }
}

impl Neg for Direction {
    type Output = Direction;

    fn neg(self) -> Direction {
        self.opposite()
    }
}

/// Items that can occupy a maze cell or sit in the player's inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ItemKind {
    #[default]
    None,
    Key,
    Oil,
}

impl ItemKind {
    /// Integer code used by the persisted snapshot format.
    pub const fn code(self) -> i32 {
        match self {
            ItemKind::None => 0,
            ItemKind::Key => 1,
            ItemKind::Oil => 2,
        }
    }

    pub const fn from_code(code: i32) -> Option<ItemKind> {
        match code {
            0 => Some(ItemKind::None),
            1 => Some(ItemKind::Key),
            2 => Some(ItemKind::Oil),
            _ => None,
        }
    }

    pub const fn is_some(self) -> bool {
        !matches!(self, ItemKind::None)
    }
}
