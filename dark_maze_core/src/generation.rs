use std::{fmt, str::FromStr};

use rand::{
    Rng, RngCore,
    seq::{IndexedRandom, SliceRandom},
};
use serde::{Deserialize, Serialize};

use crate::{Direction, Position, cell::WallState, error::MazeError, grid::Grid, maze::Maze};

/// An algorithm that carves corridors into a fully walled [`Maze`].
///
/// Strategies only open walls through [`Maze::set_wall`], so wall symmetry
/// holds for every strategy.
pub trait GenerationStrategy {
    fn name(&self) -> &'static str;

    fn carve(&self, maze: &mut Maze, rng: &mut dyn RngCore) -> Result<(), MazeError>;
}

/// Depth-first carving that re-bases its stack on the end position.
///
/// When the top of the stack reaches the end while other cells are still
/// stacked, the whole stack is reversed so carving carries on from the start
/// side again. This hangs branches off the start-to-end path instead of
/// leaving a single winding corridor.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchedDfs;

impl GenerationStrategy for BranchedDfs {
    fn name(&self) -> &'static str {
        "branched-dfs"
    }

    fn carve(&self, maze: &mut Maze, rng: &mut dyn RngCore) -> Result<(), MazeError> {
        let mut visited = Grid::from_generator(maze.width(), maze.height(), |_| false);
        let mut stack = vec![maze.start()];

        while let Some(&current) = stack.last() {
            visited[current] = true;

            if current == maze.end() && stack.len() > 1 {
                stack.reverse();
                continue;
            }

            match unvisited_neighbour(maze, &visited, current, rng) {
                Some((direction, next)) => {
                    maze.set_wall(current, direction, WallState::Destroyed)?;
                    stack.push(next);
                }
                None => {
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

/// Plain recursive backtracker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dfs;

impl GenerationStrategy for Dfs {
    fn name(&self) -> &'static str {
        "dfs"
    }

    fn carve(&self, maze: &mut Maze, rng: &mut dyn RngCore) -> Result<(), MazeError> {
        let mut visited = Grid::from_generator(maze.width(), maze.height(), |_| false);
        let mut stack = vec![maze.start()];

        while let Some(&current) = stack.last() {
            visited[current] = true;
            match unvisited_neighbour(maze, &visited, current, rng) {
                Some((direction, next)) => {
                    maze.set_wall(current, direction, WallState::Destroyed)?;
                    stack.push(next);
                }
                None => {
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

/// Randomized wavefront growth: a random frontier cell is joined to a random
/// already carved neighbour until the frontier is exhausted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wavefront;

impl GenerationStrategy for Wavefront {
    fn name(&self) -> &'static str {
        "wavefront"
    }

    fn carve(&self, maze: &mut Maze, rng: &mut dyn RngCore) -> Result<(), MazeError> {
        let mut visited = Grid::from_generator(maze.width(), maze.height(), |_| false);
        let mut queued = visited.clone();
        let mut frontier = Vec::new();

        let start = maze.start();
        visited[start] = true;
        queue_neighbours(maze, &visited, &mut queued, &mut frontier, start);

        while !frontier.is_empty() {
            let index = rng.random_range(0..frontier.len());
            let cell = frontier.swap_remove(index);

            let mut directions = Direction::CARDINAL;
            directions.shuffle(rng);
            let link = directions.into_iter().find(|direction| {
                let neighbour = cell + *direction;
                maze.in_bounds(neighbour) && visited[neighbour]
            });
            if let Some(direction) = link {
                maze.set_wall(cell, direction, WallState::Destroyed)?;
            }

            visited[cell] = true;
            queue_neighbours(maze, &visited, &mut queued, &mut frontier, cell);
        }
        Ok(())
    }
}

fn unvisited_neighbour(
    maze: &Maze,
    visited: &Grid<bool>,
    current: Position,
    rng: &mut dyn RngCore,
) -> Option<(Direction, Position)> {
    let candidates: Vec<(Direction, Position)> = Direction::CARDINAL
        .into_iter()
        .map(|direction| (direction, current + direction))
        .filter(|(_, next)| maze.in_bounds(*next) && !visited[*next])
        .collect();
    candidates.choose(rng).copied()
}

fn queue_neighbours(
    maze: &Maze,
    visited: &Grid<bool>,
    queued: &mut Grid<bool>,
    frontier: &mut Vec<Position>,
    cell: Position,
) {
    for direction in Direction::CARDINAL {
        let neighbour = cell + direction;
        if maze.in_bounds(neighbour) && !visited[neighbour] && !queued[neighbour] {
            queued[neighbour] = true;
            frontier.push(neighbour);
        }
    }
}

/// Selects a generation strategy by name, for configuration files and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    BranchedDfs,
    Dfs,
    Wavefront,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn GenerationStrategy> {
        match self {
            StrategyKind::BranchedDfs => Box::new(BranchedDfs),
            StrategyKind::Dfs => Box::new(Dfs),
            StrategyKind::Wavefront => Box::new(Wavefront),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.build().name())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "branched-dfs" => Ok(StrategyKind::BranchedDfs),
            "dfs" => Ok(StrategyKind::Dfs),
            "wavefront" | "bfs" => Ok(StrategyKind::Wavefront),
            other => Err(format!("unknown generation strategy '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn carved(strategy: &dyn GenerationStrategy, width: i32, height: i32, seed: u64) -> Maze {
        let mut maze = Maze::new(width, height).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        maze.generate(strategy, &mut rng).unwrap();
        maze
    }

    fn open_edges(maze: &Maze) -> usize {
        maze.cells()
            .map(|cell| maze.open_directions(cell.position()).unwrap().len())
            .sum::<usize>()
            / 2
    }

    #[test]
    fn every_strategy_builds_a_spanning_tree() {
        for kind in [StrategyKind::BranchedDfs, StrategyKind::Dfs, StrategyKind::Wavefront] {
            let strategy = kind.build();
            for (width, height) in [(8, 8), (16, 8), (8, 16), (1, 5), (5, 1)] {
                let maze = carved(strategy.as_ref(), width, height, 42);
                let cells = (width * height) as usize;
                assert_eq!(open_edges(&maze), cells - 1, "{kind} {width}x{height}");
                for cell in maze.cells() {
                    assert!(maze.distance(maze.start(), cell.position()).is_ok());
                }
            }
        }
    }

    #[test]
    fn branched_dfs_leaves_dead_ends_off_the_main_path() {
        let maze = carved(&BranchedDfs, 12, 12, 5);
        let path = maze.path_length().unwrap();
        assert!(path < 12 * 12 - 1);
        let dead_ends = maze
            .cells()
            .filter(|cell| maze.open_directions(cell.position()).unwrap().len() == 1)
            .count();
        assert!(dead_ends > 2);
    }

    #[test]
    fn single_cell_maze_is_trivially_connected() {
        let maze = carved(&BranchedDfs, 1, 1, 0);
        assert_eq!(maze.path_length(), Ok(0));
    }

    #[test]
    fn strategy_names_parse_back() {
        for kind in [StrategyKind::BranchedDfs, StrategyKind::Dfs, StrategyKind::Wavefront] {
            assert_eq!(kind.to_string().parse::<StrategyKind>(), Ok(kind));
        }
        assert!("prim".parse::<StrategyKind>().is_err());
    }
}
