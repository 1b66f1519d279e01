use std::fmt;

use crate::{ItemKind, agent::Player, command::Actionable, maze::Maze};

/// What a game mode may inspect when deciding whether the level is won.
#[derive(Debug, Clone, Copy)]
pub struct LevelView<'a> {
    pub maze: &'a Maze,
    pub player: &'a Player,
}

impl LevelView<'_> {
    pub fn player_at_end(&self) -> bool {
        self.player.position() == self.maze.end()
    }

    pub fn items_left(&self, kind: ItemKind) -> usize {
        self.maze.cells().filter(|cell| cell.item == kind).count()
    }
}

/// Win condition and item set of a game mode.
pub trait GameMode: fmt::Debug {
    /// Stable name, used as part of persisted level keys.
    fn name(&self) -> &'static str;

    /// Items placed into every freshly generated level.
    fn items(&self) -> Vec<ItemKind>;

    fn game_ended(&self, view: &LevelView<'_>) -> bool;
}

/// Reach the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct Escape;

impl GameMode for Escape {
    fn name(&self) -> &'static str {
        "escape"
    }

    fn items(&self) -> Vec<ItemKind> {
        Vec::new()
    }

    fn game_ended(&self, view: &LevelView<'_>) -> bool {
        view.player_at_end()
    }
}

/// Reach the end carrying the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyHunt;

impl GameMode for KeyHunt {
    fn name(&self) -> &'static str {
        "key-hunt"
    }

    fn items(&self) -> Vec<ItemKind> {
        vec![ItemKind::Key]
    }

    fn game_ended(&self, view: &LevelView<'_>) -> bool {
        view.player_at_end() && view.player.carries(ItemKind::Key)
    }
}

/// Collect every oil can, then reach the end.
#[derive(Debug, Clone, Copy)]
pub struct OilRun {
    pub cans: usize,
}

impl Default for OilRun {
    fn default() -> Self {
        OilRun { cans: 3 }
    }
}

impl GameMode for OilRun {
    fn name(&self) -> &'static str {
        "oil-run"
    }

    fn items(&self) -> Vec<ItemKind> {
        vec![ItemKind::Oil; self.cans]
    }

    fn game_ended(&self, view: &LevelView<'_>) -> bool {
        view.player_at_end() && view.items_left(ItemKind::Oil) == 0
    }
}

/// Looks a shipped mode up by its [`GameMode::name`].
pub fn mode_by_name(name: &str) -> Option<Box<dyn GameMode>> {
    match name {
        "escape" => Some(Box::new(Escape)),
        "key-hunt" => Some(Box::new(KeyHunt)),
        "oil-run" => Some(Box::new(OilRun::default())),
        _ => None,
    }
}
