use std::collections::VecDeque;

use rand::{RngCore, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{
    Direction, ItemKind, Position,
    clock::LevelClock,
    command::{Actionable, Command, CommandContext, Effect},
    history::CommandHistory,
    maze::Maze,
};

/// Identifies the acting agent of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    Player,
    Ghost(usize),
}

/// Executes `command` for `agent` and records it when something changed.
fn perform(
    agent: &mut dyn Actionable,
    id: AgentId,
    command: Command,
    ctx: &mut CommandContext<'_>,
    history: &mut CommandHistory,
    now: f32,
) -> bool {
    let verdict = command.execute(agent, ctx);
    if verdict.changed {
        history.add(id, command, now);
    }
    verdict.changed
}

/// The player: blocked by walls, auto-walks corridors, carries items.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    position: Position,
    speed: f32,
    moving: bool,
    inventory: Vec<ItemKind>,
    light_angle: f32,
    light_range: (f32, f32),
    pending: VecDeque<Direction>,
    step_timer: f32,
}

impl Player {
    /// `speed` is in cells per second; `light_range` is the `(min, max)`
    /// light cone angle in degrees.
    pub fn new(start: Position, speed: f32, light_range: (f32, f32)) -> Self {
        Player {
            position: start,
            speed: speed.max(f32::EPSILON),
            moving: false,
            inventory: Vec::new(),
            light_angle: light_range.1,
            light_range,
            pending: VecDeque::new(),
            step_timer: 0.0,
        }
    }

    pub fn reset(&mut self, start: Position) {
        self.position = start;
        self.moving = false;
        self.inventory.clear();
        self.pending.clear();
        self.step_timer = 0.0;
        self.light_angle = self.light_range.1;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Seconds one cell step takes.
    pub fn step_duration(&self) -> f32 {
        1.0 / self.speed
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Inventory stack, most recent item last.
    pub fn inventory(&self) -> &[ItemKind] {
        &self.inventory
    }

    pub fn carries(&self, kind: ItemKind) -> bool {
        self.inventory.contains(&kind)
    }

    pub fn count(&self, kind: ItemKind) -> usize {
        self.inventory.iter().filter(|item| **item == kind).count()
    }

    pub fn light_angle(&self) -> f32 {
        self.light_angle
    }

    /// Interpolates the light cone between its minimum and maximum angle.
    pub fn set_light_fraction(&mut self, fraction: f32) {
        let (min, max) = self.light_range;
        self.light_angle = min + (max - min) * fraction.clamp(0.0, 1.0);
    }

    /// Starts a move in `direction` from player input.
    ///
    /// Ignored while a previous move is still walking. On success the rest of
    /// the corridor is queued and walked by [`Player::update`].
    pub fn begin_move(
        &mut self,
        direction: Direction,
        ctx: &mut CommandContext<'_>,
        history: &mut CommandHistory,
        now: f32,
    ) -> bool {
        if self.moving || direction == Direction::None {
            return false;
        }
        let command = Command::movement(direction, self.step_duration());
        if !perform(self, AgentId::Player, command, ctx, history, now) {
            return false;
        }
        self.collect_item(ctx, history, now);

        self.pending = ctx
            .maze
            .sequence_to_decision_point(self.position, direction)
            .unwrap_or_default()
            .into();
        self.moving = true;
        self.step_timer = self.step_duration();
        true
    }

    /// Walks queued corridor steps as their time comes due.
    pub fn update(
        &mut self,
        dt: f32,
        ctx: &mut CommandContext<'_>,
        history: &mut CommandHistory,
        now: f32,
    ) {
        if !self.moving {
            return;
        }
        self.step_timer -= dt;
        while self.step_timer <= 0.0 {
            let Some(direction) = self.pending.pop_front() else {
                self.moving = false;
                self.step_timer = 0.0;
                return;
            };
            let command = Command::movement(direction, self.step_duration());
            if perform(self, AgentId::Player, command, ctx, history, now) {
                self.collect_item(ctx, history, now);
            } else {
                self.pending.clear();
            }
            self.step_timer += self.step_duration();
        }
    }

    fn collect_item(
        &mut self,
        ctx: &mut CommandContext<'_>,
        history: &mut CommandHistory,
        now: f32,
    ) {
        let has_item = ctx
            .maze
            .item_at(self.position)
            .is_ok_and(ItemKind::is_some);
        if has_item {
            perform(
                self,
                AgentId::Player,
                Command::effect(Effect::PickUpItem),
                ctx,
                history,
                now,
            );
        }
    }
}

impl Actionable for Player {
    fn position(&self) -> Position {
        self.position
    }

    fn try_move(&mut self, maze: &Maze, direction: Direction) -> bool {
        let target = self.position + direction;
        if maze.in_bounds(target) && maze.wall_exists(self.position, direction) == Ok(false) {
            self.position = target;
            true
        } else {
            false
        }
    }

    fn pick_up(&mut self, maze: &mut Maze) -> bool {
        match maze.take_item(self.position) {
            Ok(item) if item.is_some() => {
                self.inventory.push(item);
                true
            }
            _ => false,
        }
    }

    fn place_item(&mut self, maze: &mut Maze) -> bool {
        if maze.item_at(self.position) != Ok(ItemKind::None) {
            return false;
        }
        match self.inventory.pop() {
            Some(item) => maze.set_item(self.position, item).is_ok(),
            None => false,
        }
    }
}

/// A roaming hazard. Ghosts float through walls and are only held back by
/// the maze bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Ghost {
    index: usize,
    spawn: Position,
    position: Position,
    speed: f32,
    step_timer: f32,
    touching_player: bool,
    penalty: f32,
}

impl Ghost {
    /// `penalty` is the fraction of the time budget lost on contact.
    pub fn new(index: usize, spawn: Position, speed: f32, penalty: f32) -> Self {
        let speed = speed.max(f32::EPSILON);
        Ghost {
            index,
            spawn,
            position: spawn,
            speed,
            step_timer: 1.0 / speed,
            touching_player: false,
            penalty,
        }
    }

    pub fn id(&self) -> AgentId {
        AgentId::Ghost(self.index)
    }

    pub fn spawn(&self) -> Position {
        self.spawn
    }

    pub fn is_touching_player(&self) -> bool {
        self.touching_player
    }

    pub fn reset(&mut self) {
        self.position = self.spawn;
        self.step_timer = 1.0 / self.speed;
        self.touching_player = false;
    }

    /// Picks a random in-bounds direction, ignoring walls.
    pub fn choose_direction(&self, maze: &Maze, rng: &mut dyn RngCore) -> Direction {
        let mut directions = Direction::CARDINAL;
        directions.shuffle(rng);
        directions
            .into_iter()
            .find(|direction| maze.in_bounds(self.position + *direction))
            .unwrap_or(Direction::None)
    }

    /// Roams one cell each time its step timer runs out.
    pub fn update(
        &mut self,
        dt: f32,
        ctx: &mut CommandContext<'_>,
        rng: &mut dyn RngCore,
        history: &mut CommandHistory,
        now: f32,
    ) {
        self.step_timer -= dt;
        while self.step_timer <= 0.0 {
            let direction = self.choose_direction(ctx.maze, rng);
            let command = Command::movement(direction, 1.0 / self.speed);
            let id = self.id();
            perform(self, id, command, ctx, history, now);
            self.step_timer += 1.0 / self.speed;
        }
    }

    /// Records a hazard effect when the ghost starts or stops sharing the
    /// player's cell.
    pub fn check_player_contact(
        &mut self,
        player: Position,
        ctx: &mut CommandContext<'_>,
        history: &mut CommandHistory,
        now: f32,
    ) {
        let overlapping = self.position == player;
        let effect = match (overlapping, self.touching_player) {
            (true, false) => Effect::HazardEnter,
            (false, true) => Effect::HazardLeave,
            _ => return,
        };
        let id = self.id();
        perform(self, id, Command::effect(effect), ctx, history, now);
    }
}

impl Actionable for Ghost {
    fn position(&self) -> Position {
        self.position
    }

    fn try_move(&mut self, maze: &Maze, direction: Direction) -> bool {
        let target = self.position + direction;
        if direction != Direction::None && maze.in_bounds(target) {
            self.position = target;
            true
        } else {
            false
        }
    }

    fn on_hazard_enter(&mut self, clock: &mut LevelClock) -> bool {
        if self.touching_player {
            return false;
        }
        self.touching_player = true;
        clock.add_time(-self.penalty);
        true
    }

    fn on_hazard_leave(&mut self, clock: &mut LevelClock) -> bool {
        if !self.touching_player {
            return false;
        }
        self.touching_player = false;
        clock.add_time(self.penalty);
        true
    }
}
