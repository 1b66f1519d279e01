use std::collections::{HashSet, VecDeque};

use rand::{RngCore, seq::IndexedRandom};
use tracing::{debug, warn};

use crate::{
    Direction, ItemKind, Position,
    cell::{Cell, WallState},
    error::MazeError,
    generation::GenerationStrategy,
    grid::Grid,
    persistence::{CellRecord, MazeSnapshot},
};

/// Largest number of cells a maze may hold.
pub const MAX_CELLS: usize = 1 << 20;

/// A rectangular maze of walled cells.
///
/// The start sits in the top-left corner `(0, height - 1)` and the end in the
/// opposite corner `(width - 1, 0)`. Walls between neighbouring cells are
/// always stored on both sides with the same state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Maze {
    width: i32,
    height: i32,
    cells: Grid<Cell>,
    start: Position,
    end: Position,
}

impl Maze {
    /// Creates a fully walled maze of the given dimensions.
    pub fn new(width: i32, height: i32) -> Result<Self, MazeError> {
        Self::check_dimensions(width, height)?;
        let mut maze = Maze {
            width,
            height,
            cells: Grid::empty(),
            start: Position::new(0, height - 1),
            end: Position::new(width - 1, 0),
        };
        maze.fill(WallState::Exists);
        Ok(maze)
    }

    /// Rejects non-positive dimensions and mazes above [`MAX_CELLS`].
    pub fn check_dimensions(width: i32, height: i32) -> Result<(), MazeError> {
        let cells = usize::try_from(width)
            .ok()
            .zip(usize::try_from(height).ok())
            .and_then(|(w, h)| w.checked_mul(h));
        match cells {
            Some(cells) if cells > 0 && cells <= MAX_CELLS => Ok(()),
            _ => Err(MazeError::InvalidDimensions { width, height }),
        }
    }

    /// Rebuilds a maze from a persisted snapshot, validating its layout.
    ///
    /// The record count is checked against the dimensions before anything is
    /// allocated.
    pub fn from_snapshot(snapshot: &MazeSnapshot) -> Result<Self, MazeError> {
        let expected = usize::try_from(snapshot.width)
            .ok()
            .zip(usize::try_from(snapshot.height).ok())
            .and_then(|(w, h)| w.checked_mul(h));
        if expected != Some(snapshot.cells.len()) {
            return Err(MazeError::CorruptSnapshot(format!(
                "{}x{} maze with {} cell records",
                snapshot.width,
                snapshot.height,
                snapshot.cells.len()
            )));
        }
        let mut maze = Maze::new(snapshot.width, snapshot.height)?;

        let mut seen = HashSet::with_capacity(snapshot.cells.len());
        for record in &snapshot.cells {
            let position = Position::new(record.x, record.y);
            if !maze.in_bounds(position) || !seen.insert(position) {
                return Err(MazeError::CorruptSnapshot(format!(
                    "unexpected cell record at ({}, {})",
                    record.x, record.y
                )));
            }
            let item = ItemKind::from_code(record.item).ok_or_else(|| {
                MazeError::CorruptSnapshot(format!("unknown item code {}", record.item))
            })?;
            let cell = &mut maze.cells[position];
            cell.set_wall(Direction::Up, WallState::from_exists(record.up));
            cell.set_wall(Direction::Down, WallState::from_exists(record.down));
            cell.set_wall(Direction::Left, WallState::from_exists(record.left));
            cell.set_wall(Direction::Right, WallState::from_exists(record.right));
            cell.item = item;
        }

        if let Some((position, direction)) = maze.first_asymmetric_wall() {
            return Err(MazeError::CorruptSnapshot(format!(
                "wall {:?} of ({}, {}) disagrees with its neighbour",
                direction, position.x, position.y
            )));
        }
        Ok(maze)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn end(&self) -> Position {
        self.end
    }

    /// Resets every in-bounds cell to `wall_state` on all four sides, with no items.
    pub fn fill(&mut self, wall_state: WallState) {
        self.cells = Grid::from_generator(self.width, self.height, |position| {
            Cell::new(position, wall_state)
        });
    }

    /// Drops every cell. Dimensions are kept so the maze can be refilled.
    pub fn clear(&mut self) {
        self.cells = Grid::empty();
    }

    /// True after [`Maze::clear`] and before the next [`Maze::fill`].
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn in_bounds(&self, position: Position) -> bool {
        position.x >= 0 && position.y >= 0 && position.x < self.width && position.y < self.height
    }

    pub fn cell(&self, position: Position) -> Result<&Cell, MazeError> {
        self.cells
            .get(position)
            .ok_or_else(|| self.out_of_bounds(position))
    }

    fn cell_mut(&mut self, position: Position) -> Result<&mut Cell, MazeError> {
        let (width, height) = (self.width, self.height);
        self.cells
            .get_mut(position)
            .ok_or_else(|| MazeError::OutOfBounds {
                position,
                width,
                height,
            })
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Sets a wall on both the cell at `position` and the neighbour it faces.
    pub fn set_wall(
        &mut self,
        position: Position,
        direction: Direction,
        state: WallState,
    ) -> Result<(), MazeError> {
        self.cell_mut(position)?.set_wall(direction, state);
        let neighbour = position + direction;
        if direction != Direction::None && self.in_bounds(neighbour) {
            self.cell_mut(neighbour)?
                .set_wall(direction.opposite(), state);
        }
        Ok(())
    }

    pub fn wall_exists(&self, position: Position, direction: Direction) -> Result<bool, MazeError> {
        Ok(self.cell(position)?.wall(direction).exists())
    }

    /// Cardinal directions leaving `position` through a destroyed wall into
    /// another in-bounds cell.
    pub fn open_directions(&self, position: Position) -> Result<Vec<Direction>, MazeError> {
        Ok(self
            .cell(position)?
            .open_directions()
            .filter(|direction| self.in_bounds(position + *direction))
            .collect())
    }

    pub fn item_at(&self, position: Position) -> Result<ItemKind, MazeError> {
        Ok(self.cell(position)?.item)
    }

    pub fn set_item(&mut self, position: Position, item: ItemKind) -> Result<(), MazeError> {
        self.cell_mut(position)?.item = item;
        Ok(())
    }

    /// Removes and returns the item at `position`, leaving the cell empty.
    pub fn take_item(&mut self, position: Position) -> Result<ItemKind, MazeError> {
        Ok(std::mem::take(&mut self.cell_mut(position)?.item))
    }

    /// Walks a corridor starting at `position`, entered while travelling in
    /// `incoming`, and returns every step taken until a decision point.
    ///
    /// A cell continues the corridor when exactly one opening other than the
    /// way back exists. The walk stops at intersections and dead ends, and
    /// also if it would revisit a cell.
    pub fn sequence_to_decision_point(
        &self,
        position: Position,
        incoming: Direction,
    ) -> Result<Vec<Direction>, MazeError> {
        let mut steps = Vec::new();
        let mut visited = HashSet::from([position]);
        let mut current = position;
        let mut incoming = incoming;

        loop {
            let back = incoming.opposite();
            let exits: Vec<Direction> = self
                .open_directions(current)?
                .into_iter()
                .filter(|direction| *direction != back)
                .collect();
            let [next_direction] = exits.as_slice() else {
                break;
            };
            let next = current + *next_direction;
            if !visited.insert(next) {
                break;
            }
            steps.push(*next_direction);
            current = next;
            incoming = *next_direction;
        }

        Ok(steps)
    }

    /// Shortest number of steps from start to end following open walls.
    pub fn path_length(&self) -> Result<usize, MazeError> {
        self.distance(self.start, self.end)
    }

    /// Breadth-first distance between two cells.
    pub fn distance(&self, from: Position, to: Position) -> Result<usize, MazeError> {
        self.cell(from)?;
        self.cell(to)?;

        let mut frontier = VecDeque::from([(from, 0usize)]);
        let mut visited = HashSet::from([from]);

        while let Some((current, steps)) = frontier.pop_front() {
            if current == to {
                return Ok(steps);
            }
            for direction in self.open_directions(current)? {
                let next = current + direction;
                if visited.insert(next) {
                    frontier.push_back((next, steps + 1));
                }
            }
        }

        Err(MazeError::Unreachable { end: to })
    }

    /// Up to `quantity` distinct positions holding no item and not at the start.
    ///
    /// Returns fewer positions when the maze does not have enough empty cells.
    pub fn random_positions(&self, quantity: usize, rng: &mut dyn RngCore) -> Vec<Position> {
        let candidates: Vec<Position> = self
            .cells
            .iter()
            .filter(|cell| !cell.has_item() && cell.position() != self.start)
            .map(Cell::position)
            .collect();
        candidates
            .choose_multiple(rng, quantity)
            .copied()
            .collect()
    }

    /// Fills the maze with walls and carves it with `strategy`.
    ///
    /// Fails with [`MazeError::Unreachable`] if the strategy left the end
    /// disconnected from the start.
    pub fn generate(
        &mut self,
        strategy: &dyn GenerationStrategy,
        rng: &mut dyn RngCore,
    ) -> Result<(), MazeError> {
        self.fill(WallState::Exists);
        strategy.carve(self, rng)?;
        let length = self.path_length()?;
        debug!(
            strategy = strategy.name(),
            width = self.width,
            height = self.height,
            path_length = length,
            "maze generated"
        );
        Ok(())
    }

    /// Places each item on a distinct random empty cell and returns where
    /// they went. Items that do not fit are dropped.
    pub fn place_items(&mut self, items: &[ItemKind], rng: &mut dyn RngCore) -> Vec<Position> {
        let positions = self.random_positions(items.len(), rng);
        if positions.len() < items.len() {
            warn!(
                requested = items.len(),
                placed = positions.len(),
                "not enough empty cells for every item"
            );
        }
        for (position, item) in positions.iter().zip(items) {
            self.cells[*position].item = *item;
        }
        positions
    }

    /// Captures dimensions, walls and items for persistence.
    pub fn snapshot(&self) -> MazeSnapshot {
        MazeSnapshot {
            width: self.width,
            height: self.height,
            cells: self
                .cells
                .iter()
                .map(|cell| CellRecord {
                    x: cell.position().x,
                    y: cell.position().y,
                    up: cell.wall(Direction::Up).exists(),
                    down: cell.wall(Direction::Down).exists(),
                    left: cell.wall(Direction::Left).exists(),
                    right: cell.wall(Direction::Right).exists(),
                    item: cell.item.code(),
                })
                .collect(),
        }
    }

    fn first_asymmetric_wall(&self) -> Option<(Position, Direction)> {
        self.cells.iter().find_map(|cell| {
            Direction::CARDINAL.into_iter().find_map(|direction| {
                let neighbour = self.cells.get(cell.position() + direction)?;
                (cell.wall(direction) != neighbour.wall(direction.opposite()))
                    .then_some((cell.position(), direction))
            })
        })
    }

    fn out_of_bounds(&self, position: Position) -> MazeError {
        MazeError::OutOfBounds {
            position,
            width: self.width,
            height: self.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::generation::BranchedDfs;

    fn open(maze: &mut Maze, path: &[(i32, i32, Direction)]) {
        for (x, y, direction) in path {
            maze.set_wall(Position::new(*x, *y), *direction, WallState::Destroyed)
                .unwrap();
        }
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert_eq!(
            Maze::new(0, 4),
            Err(MazeError::InvalidDimensions {
                width: 0,
                height: 4
            })
        );
        assert!(Maze::new(3, -1).is_err());
        assert_eq!(
            Maze::new(i32::MAX, i32::MAX),
            Err(MazeError::InvalidDimensions {
                width: i32::MAX,
                height: i32::MAX
            })
        );
        assert!(Maze::new(1025, 1024).is_err());
    }

    #[test]
    fn start_and_end_are_opposite_corners() {
        let maze = Maze::new(3, 3).unwrap();
        assert_eq!(maze.start(), Position::new(0, 2));
        assert_eq!(maze.end(), Position::new(2, 0));

        let single = Maze::new(1, 1).unwrap();
        assert_eq!(single.start(), single.end());
        let pair = Maze::new(1, 2).unwrap();
        assert_ne!(pair.start(), pair.end());
    }

    #[test]
    fn set_wall_updates_both_sides() {
        let mut maze = Maze::new(3, 3).unwrap();
        let p = Position::new(1, 1);
        maze.set_wall(p, Direction::Up, WallState::Destroyed).unwrap();
        assert!(!maze.wall_exists(p, Direction::Up).unwrap());
        assert!(!maze.wall_exists(Position::new(1, 2), Direction::Down).unwrap());
        assert!(maze.wall_exists(p, Direction::Down).unwrap());
    }

    #[test]
    fn border_wall_has_no_partner() {
        let mut maze = Maze::new(2, 2).unwrap();
        maze.set_wall(Position::new(0, 0), Direction::Left, WallState::Destroyed)
            .unwrap();
        // The opening leads nowhere, so it is not a usable exit.
        assert!(maze.open_directions(Position::new(0, 0)).unwrap().is_empty());
    }

    #[test]
    fn out_of_bounds_queries_are_errors() {
        let maze = Maze::new(2, 2).unwrap();
        let err = maze.wall_exists(Position::new(2, 0), Direction::Up).unwrap_err();
        assert!(matches!(err, MazeError::OutOfBounds { .. }));
        assert!(maze.cell(Position::new(-1, 0)).is_err());
    }

    #[test]
    fn fill_removes_items_and_restores_walls() {
        let mut maze = Maze::new(2, 2).unwrap();
        maze.set_item(Position::new(1, 1), ItemKind::Key).unwrap();
        maze.set_wall(Position::new(0, 0), Direction::Up, WallState::Destroyed)
            .unwrap();
        maze.fill(WallState::Exists);
        assert_eq!(maze.item_at(Position::new(1, 1)).unwrap(), ItemKind::None);
        assert!(maze.wall_exists(Position::new(0, 0), Direction::Up).unwrap());
    }

    #[test]
    fn clear_empties_the_grid() {
        let mut maze = Maze::new(2, 2).unwrap();
        maze.clear();
        assert!(maze.is_empty());
        assert!(maze.cell(Position::new(0, 0)).is_err());
        maze.fill(WallState::Destroyed);
        assert!(!maze.is_empty());
    }

    #[test]
    fn corridor_walk_stops_before_branching() {
        // Corridor along y = 0 from x = 0 to x = 4, turning up at x = 4 into
        // (4, 1), which branches left and up.
        let mut maze = Maze::new(5, 3).unwrap();
        open(
            &mut maze,
            &[
                (0, 0, Direction::Right),
                (1, 0, Direction::Right),
                (2, 0, Direction::Right),
                (3, 0, Direction::Right),
                (4, 0, Direction::Up),
                (4, 1, Direction::Left),
                (4, 1, Direction::Up),
            ],
        );

        let steps = maze
            .sequence_to_decision_point(Position::new(1, 0), Direction::Right)
            .unwrap();
        assert_eq!(
            steps,
            vec![
                Direction::Right,
                Direction::Right,
                Direction::Right,
                Direction::Up
            ]
        );
    }

    #[test]
    fn corridor_walk_stops_at_dead_end() {
        let mut maze = Maze::new(3, 1).unwrap();
        open(&mut maze, &[(0, 0, Direction::Right), (1, 0, Direction::Right)]);
        let steps = maze
            .sequence_to_decision_point(Position::new(1, 0), Direction::Right)
            .unwrap();
        assert_eq!(steps, vec![Direction::Right]);

        let none = maze
            .sequence_to_decision_point(Position::new(2, 0), Direction::Right)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn corridor_walk_does_not_loop() {
        let mut maze = Maze::new(2, 2).unwrap();
        open(
            &mut maze,
            &[
                (0, 0, Direction::Right),
                (1, 0, Direction::Up),
                (1, 1, Direction::Left),
                (0, 1, Direction::Down),
            ],
        );
        let steps = maze
            .sequence_to_decision_point(Position::new(1, 0), Direction::Right)
            .unwrap();
        assert_eq!(steps, vec![Direction::Up, Direction::Left, Direction::Down]);
    }

    #[test]
    fn unreachable_end_is_reported() {
        let maze = Maze::new(2, 2).unwrap();
        assert_eq!(
            maze.path_length(),
            Err(MazeError::Unreachable {
                end: Position::new(1, 0)
            })
        );
    }

    #[test]
    fn path_length_follows_open_walls() {
        let mut maze = Maze::new(2, 2).unwrap();
        open(
            &mut maze,
            &[
                (0, 1, Direction::Right),
                (1, 1, Direction::Down),
                (0, 1, Direction::Down),
            ],
        );
        assert_eq!(maze.path_length(), Ok(2));
    }

    #[test]
    fn random_positions_skip_start_and_items() {
        let mut maze = Maze::new(2, 2).unwrap();
        maze.set_item(Position::new(1, 0), ItemKind::Oil).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let positions = maze.random_positions(10, &mut rng);
        assert_eq!(positions.len(), 2);
        assert!(!positions.contains(&maze.start()));
        assert!(!positions.contains(&Position::new(1, 0)));

        let unique: HashSet<_> = maze.random_positions(2, &mut rng).into_iter().collect();
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn place_items_tolerates_shortfall() {
        let mut maze = Maze::new(1, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let placed = maze.place_items(&[ItemKind::Key, ItemKind::Oil], &mut rng);
        assert_eq!(placed, vec![Position::new(0, 0)]);
        assert_eq!(maze.item_at(Position::new(0, 0)).unwrap(), ItemKind::Key);
    }

    #[test]
    fn snapshot_restores_identical_maze() {
        let mut maze = Maze::new(6, 4).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        maze.generate(&BranchedDfs, &mut rng).unwrap();
        maze.place_items(&[ItemKind::Key], &mut rng);

        let restored = Maze::from_snapshot(&maze.snapshot()).unwrap();
        assert_eq!(restored, maze);
    }

    #[test]
    fn asymmetric_snapshot_is_rejected() {
        let maze = Maze::new(2, 1).unwrap();
        let mut snapshot = maze.snapshot();
        snapshot.cells[0].right = false;
        assert!(matches!(
            Maze::from_snapshot(&snapshot),
            Err(MazeError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn oversized_snapshot_is_rejected_before_allocating() {
        let snapshot = MazeSnapshot {
            width: i32::MAX,
            height: i32::MAX,
            cells: Vec::new(),
        };
        assert!(matches!(
            Maze::from_snapshot(&snapshot),
            Err(MazeError::CorruptSnapshot(_))
        ));

        let negative = MazeSnapshot {
            width: -2,
            height: -3,
            cells: Vec::new(),
        };
        assert!(matches!(
            Maze::from_snapshot(&negative),
            Err(MazeError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn truncated_snapshot_is_rejected() {
        let mut snapshot = Maze::new(2, 2).unwrap().snapshot();
        snapshot.cells.pop();
        assert!(Maze::from_snapshot(&snapshot).is_err());
    }
}
