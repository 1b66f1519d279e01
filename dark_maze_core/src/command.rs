//! Reversible agent commands.
//!
//! Every state change an agent makes during live play is expressed as a
//! [`Command`], so the same value can be executed forward when the run is
//! replayed and backward when it is rewound.

use serde::{Deserialize, Serialize};

use crate::{Direction, Position, clock::LevelClock, maze::Maze};

/// The capabilities commands need from an agent.
///
/// Agents override only what they support; the defaults report that nothing
/// changed.
pub trait Actionable {
    fn position(&self) -> Position;

    /// Moves one cell in `direction` if the agent's movement rules allow it.
    fn try_move(&mut self, maze: &Maze, direction: Direction) -> bool;

    /// Moves the item under the agent onto its inventory.
    fn pick_up(&mut self, _maze: &mut Maze) -> bool {
        false
    }

    /// Puts the most recently picked up item back under the agent.
    fn place_item(&mut self, _maze: &mut Maze) -> bool {
        false
    }

    fn on_hazard_enter(&mut self, _clock: &mut LevelClock) -> bool {
        false
    }

    fn on_hazard_leave(&mut self, _clock: &mut LevelClock) -> bool {
        false
    }
}

/// The world state commands may touch besides the agent itself.
pub struct CommandContext<'a> {
    pub maze: &'a mut Maze,
    pub clock: &'a mut LevelClock,
}

/// Agent-specific action pairs. Each effect is undone by its [`Effect::inverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    PickUpItem,
    PlaceItem,
    HazardEnter,
    HazardLeave,
}

impl Effect {
    pub const fn inverse(self) -> Effect {
        match self {
            Effect::PickUpItem => Effect::PlaceItem,
            Effect::PlaceItem => Effect::PickUpItem,
            Effect::HazardEnter => Effect::HazardLeave,
            Effect::HazardLeave => Effect::HazardEnter,
        }
    }

    fn apply(self, agent: &mut dyn Actionable, ctx: &mut CommandContext<'_>) -> bool {
        match self {
            Effect::PickUpItem => agent.pick_up(ctx.maze),
            Effect::PlaceItem => agent.place_item(ctx.maze),
            Effect::HazardEnter => agent.on_hazard_enter(ctx.clock),
            Effect::HazardLeave => agent.on_hazard_leave(ctx.clock),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    Move(Direction),
    Effect(Effect),
    /// Time filler carrying the pause between two recorded commands.
    Idle,
}

/// Result of executing a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    /// Whether the command changed any state.
    pub changed: bool,
    /// Seconds the command stands for.
    pub elapsed: f32,
}

/// An immutable, reversible unit of agent action with a duration in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub duration: f32,
}

impl Command {
    pub fn movement(direction: Direction, duration: f32) -> Self {
        Command {
            kind: CommandKind::Move(direction),
            duration,
        }
    }

    /// Effects happen instantly.
    pub fn effect(effect: Effect) -> Self {
        Command {
            kind: CommandKind::Effect(effect),
            duration: 0.0,
        }
    }

    pub fn idle(gap: f32) -> Self {
        Command {
            kind: CommandKind::Idle,
            duration: gap.max(0.0),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.kind, CommandKind::Idle)
    }

    pub fn execute(&self, agent: &mut dyn Actionable, ctx: &mut CommandContext<'_>) -> Verdict {
        let changed = match self.kind {
            CommandKind::Move(direction) => {
                direction != Direction::None && agent.try_move(ctx.maze, direction)
            }
            CommandKind::Effect(effect) => effect.apply(agent, ctx),
            CommandKind::Idle => false,
        };
        self.verdict(changed)
    }

    pub fn execute_reversed(
        &self,
        agent: &mut dyn Actionable,
        ctx: &mut CommandContext<'_>,
    ) -> Verdict {
        let changed = match self.kind {
            CommandKind::Move(direction) => {
                direction != Direction::None && agent.try_move(ctx.maze, direction.opposite())
            }
            CommandKind::Effect(effect) => effect.inverse().apply(agent, ctx),
            CommandKind::Idle => false,
        };
        self.verdict(changed)
    }

    fn verdict(&self, changed: bool) -> Verdict {
        Verdict {
            changed,
            elapsed: self.duration,
        }
    }
}
