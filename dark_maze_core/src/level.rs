//! The level session: maze, agents, history and clock, driven tick by tick.

use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
};

use rand::{SeedableRng, rngs::StdRng};
use tracing::{debug, info};

use crate::{
    Direction, Position,
    agent::{AgentId, Ghost, Player},
    clock::LevelClock,
    command::{Actionable, CommandContext, Verdict},
    config::LevelConfig,
    error::{LevelError, MazeError},
    history::{CommandHistory, HistoryEntry, Replay, ReplayExecutor, ReplayStatus},
    maze::Maze,
    mode::{GameMode, LevelView, mode_by_name},
    persistence::LevelRecord,
};

/// Set of level state flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LevelState(u8);

impl LevelState {
    pub const NONE: LevelState = LevelState(0);
    pub const IN_PROGRESS: LevelState = LevelState(1);
    pub const COMPLETED: LevelState = LevelState(1 << 1);
    pub const FAILED: LevelState = LevelState(1 << 2);
    pub const IN_REPLAY: LevelState = LevelState(1 << 3);
    pub const IN_REPLAY_REVERSED: LevelState = LevelState(1 << 4);

    const NAMES: [(LevelState, &'static str); 5] = [
        (LevelState::IN_PROGRESS, "InProgress"),
        (LevelState::COMPLETED, "Completed"),
        (LevelState::FAILED, "Failed"),
        (LevelState::IN_REPLAY, "InReplay"),
        (LevelState::IN_REPLAY_REVERSED, "InReplayReversed"),
    ];

    /// True when every flag of `other` is set.
    pub const fn contains(self, other: LevelState) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: LevelState) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: LevelState) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: LevelState) {
        self.0 &= !other.0;
    }
}

impl BitOr for LevelState {
    type Output = LevelState;

    fn bitor(self, rhs: LevelState) -> LevelState {
        LevelState(self.0 | rhs.0)
    }
}

impl BitOrAssign for LevelState {
    fn bitor_assign(&mut self, rhs: LevelState) {
        self.insert(rhs);
    }
}

impl fmt::Debug for LevelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LevelState({self})")
    }
}

impl fmt::Display for LevelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("None")
        } else {
            f.write_str(&names.join(" | "))
        }
    }
}

/// What happened during one [`Level::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelEvent {
    None,
    Completed,
    Failed,
    /// The forward replay reached its end.
    ReplayFinished,
    /// The rewind finished; the next level should be loaded.
    AdvanceLevel,
}

/// World state captured when live play ended.
#[derive(Debug, Clone)]
struct EndState {
    maze: Maze,
    player: Player,
    ghosts: Vec<Ghost>,
}

/// Executes replayed history entries against the live world.
struct WorldExecutor<'a> {
    maze: &'a mut Maze,
    clock: &'a mut LevelClock,
    player: &'a mut Player,
    ghosts: &'a mut [Ghost],
}

impl ReplayExecutor for WorldExecutor<'_> {
    fn execute(&mut self, entry: &HistoryEntry, reversed: bool) -> Verdict {
        let agent: &mut dyn Actionable = match entry.agent {
            AgentId::Player => &mut *self.player,
            AgentId::Ghost(index) => match self.ghosts.get_mut(index) {
                Some(ghost) => ghost,
                None => {
                    return Verdict {
                        changed: false,
                        elapsed: entry.command.duration,
                    };
                }
            },
        };
        let mut ctx = CommandContext {
            maze: &mut *self.maze,
            clock: &mut *self.clock,
        };
        if reversed {
            entry.command.execute_reversed(agent, &mut ctx)
        } else {
            entry.command.execute(agent, &mut ctx)
        }
    }
}

/// One level session: owns the maze, agents, command history and clock, and
/// decides which of them may act on each tick.
pub struct Level {
    config: LevelConfig,
    mode: Box<dyn GameMode>,
    initial_maze: Maze,
    maze: Maze,
    history: CommandHistory,
    player: Player,
    ghosts: Vec<Ghost>,
    clock: LevelClock,
    state: LevelState,
    rng: StdRng,
    play_time: f32,
    replay: Option<Replay>,
    end_state: Option<EndState>,
}

impl Level {
    /// Generates a fresh level for `mode`.
    pub fn new(config: LevelConfig, mode: Box<dyn GameMode>) -> Result<Self, LevelError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut maze = Maze::new(config.width, config.height)?;
        maze.generate(config.strategy.build().as_ref(), &mut rng)?;
        maze.place_items(&mode.items(), &mut rng);
        let hazards = maze.random_positions(config.ghost_count, &mut rng);
        Ok(Self::assemble(config, mode, maze, hazards, rng))
    }

    /// Rebuilds a persisted level. The record's maze, budget, mode and ghost
    /// spawns override `config`.
    pub fn from_record(record: &LevelRecord, mut config: LevelConfig) -> Result<Self, LevelError> {
        let mode =
            mode_by_name(&record.mode).ok_or_else(|| LevelError::UnknownMode(record.mode.clone()))?;
        let maze = Maze::from_snapshot(&record.maze)?;
        if let Some(spawn) = record.hazards.iter().find(|spawn| !maze.in_bounds(**spawn)) {
            return Err(MazeError::CorruptSnapshot(format!(
                "ghost spawn ({}, {}) lies outside the maze",
                spawn.x, spawn.y
            ))
            .into());
        }
        config.width = maze.width();
        config.height = maze.height();
        config.time_budget = record.time_budget;
        config.ghost_count = record.hazards.len();
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self::assemble(config, mode, maze, record.hazards.clone(), rng))
    }

    fn assemble(
        config: LevelConfig,
        mode: Box<dyn GameMode>,
        maze: Maze,
        hazards: Vec<Position>,
        rng: StdRng,
    ) -> Self {
        let player = Player::new(
            maze.start(),
            config.player_speed,
            (config.light_min_angle, config.light_max_angle),
        );
        let ghosts = hazards
            .into_iter()
            .enumerate()
            .map(|(index, spawn)| {
                Ghost::new(index, spawn, config.ghost_speed, config.hazard_penalty)
            })
            .collect();
        info!(
            mode = mode.name(),
            width = maze.width(),
            height = maze.height(),
            seed = config.seed,
            "level started"
        );
        Level {
            clock: LevelClock::new(config.time_budget),
            config,
            mode,
            initial_maze: maze.clone(),
            maze,
            history: CommandHistory::new(),
            player,
            ghosts,
            state: LevelState::IN_PROGRESS,
            rng,
            play_time: 0.0,
            replay: None,
            end_state: None,
        }
    }

    /// The persistable description of this level as it was generated.
    pub fn record(&self) -> LevelRecord {
        LevelRecord {
            maze: self.initial_maze.snapshot(),
            time_budget: self.clock.budget(),
            mode: self.mode.name().to_string(),
            hazards: self.ghosts.iter().map(Ghost::spawn).collect(),
        }
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    pub fn mode(&self) -> &dyn GameMode {
        self.mode.as_ref()
    }

    pub fn maze(&self) -> &Maze {
        &self.maze
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn ghosts(&self) -> &[Ghost] {
        &self.ghosts
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn state(&self) -> LevelState {
        self.state
    }

    /// True when every flag of `state` is set.
    pub fn level_is(&self, state: LevelState) -> bool {
        self.state.contains(state)
    }

    pub fn time_left(&self) -> f32 {
        self.clock.time_left()
    }

    /// Seconds of live play so far.
    pub fn play_time(&self) -> f32 {
        self.play_time
    }

    pub fn light_fraction(&self) -> f32 {
        self.clock.light_fraction()
    }

    fn in_replay(&self) -> bool {
        self.state
            .intersects(LevelState::IN_REPLAY | LevelState::IN_REPLAY_REVERSED)
    }

    fn is_over(&self) -> bool {
        self.state
            .intersects(LevelState::COMPLETED | LevelState::FAILED)
    }

    /// Advances the level by `dt` seconds. `input` is the direction the
    /// player asked for this tick, if any.
    pub fn update(&mut self, dt: f32, input: Option<Direction>) -> LevelEvent {
        if self.in_replay() {
            return self.update_replay(dt);
        }
        if !self.state.contains(LevelState::IN_PROGRESS) {
            return LevelEvent::None;
        }

        self.play_time += dt;
        self.clock.tick(dt);
        let now = self.play_time;

        let mut ctx = CommandContext {
            maze: &mut self.maze,
            clock: &mut self.clock,
        };
        self.player.update(dt, &mut ctx, &mut self.history, now);
        if let Some(direction) = input {
            self.player
                .begin_move(direction, &mut ctx, &mut self.history, now);
        }
        for ghost in &mut self.ghosts {
            ghost.update(dt, &mut ctx, &mut self.rng, &mut self.history, now);
            ghost.check_player_contact(self.player.position(), &mut ctx, &mut self.history, now);
        }

        self.player.set_light_fraction(self.clock.light_fraction());

        if self.clock.is_expired() {
            self.end_level(false)
        } else if self.mode.game_ended(&LevelView {
            maze: &self.maze,
            player: &self.player,
        }) {
            self.end_level(true)
        } else {
            LevelEvent::None
        }
    }

    fn update_replay(&mut self, dt: f32) -> LevelEvent {
        let Level {
            replay,
            history,
            maze,
            clock,
            player,
            ghosts,
            state,
            ..
        } = self;
        let Some(active) = replay.as_mut() else {
            state.remove(LevelState::IN_REPLAY | LevelState::IN_REPLAY_REVERSED);
            return LevelEvent::None;
        };

        let reversed = active.is_reversed();
        clock.tick_within_window(if reversed { dt } else { -dt });

        let mut executor = WorldExecutor {
            maze: &mut *maze,
            clock: &mut *clock,
            player: &mut *player,
            ghosts: ghosts.as_mut_slice(),
        };
        let status = active.advance(dt, history, &mut executor);
        player.set_light_fraction(clock.light_fraction());

        match status {
            ReplayStatus::Running => LevelEvent::None,
            ReplayStatus::Finished => {
                *replay = None;
                self.finish_replay(reversed)
            }
        }
    }

    fn finish_replay(&mut self, reversed: bool) -> LevelEvent {
        if reversed {
            self.state.remove(LevelState::IN_REPLAY_REVERSED);
            info!("rewind finished");
            LevelEvent::AdvanceLevel
        } else {
            self.state.remove(LevelState::IN_REPLAY);
            info!("replay finished");
            LevelEvent::ReplayFinished
        }
    }

    /// Adjusts time left by `ratio` of the budget. Ignored outside live play.
    pub fn add_time(&mut self, ratio: f32) -> bool {
        self.clock.add_time(ratio)
    }

    /// Stops live play as won or lost. Has no effect unless in progress.
    pub fn end_level(&mut self, completed: bool) -> LevelEvent {
        if !self.state.contains(LevelState::IN_PROGRESS) {
            return LevelEvent::None;
        }
        self.state.remove(LevelState::IN_PROGRESS);
        self.end_state = Some(EndState {
            maze: self.maze.clone(),
            player: self.player.clone(),
            ghosts: self.ghosts.clone(),
        });
        if completed {
            self.state.insert(LevelState::COMPLETED);
            info!(play_time = self.play_time, "level completed");
            LevelEvent::Completed
        } else {
            self.state.insert(LevelState::FAILED);
            info!(play_time = self.play_time, "level failed");
            LevelEvent::Failed
        }
    }

    /// Replays the finished run from the start at the configured replay
    /// speed. `on_complete` fires once the replay ends or is skipped.
    ///
    /// Returns `false` if the level is still in progress or already replaying.
    pub fn watch_replay(&mut self, on_complete: impl FnOnce() + 'static) -> bool {
        if !self.is_over() || self.in_replay() {
            return false;
        }
        self.maze = self.initial_maze.clone();
        self.player.reset(self.maze.start());
        self.ghosts.iter_mut().for_each(Ghost::reset);

        let replay = Replay::new(false, self.config.replay_speed).on_complete(on_complete);
        let window = replay.duration_of(&self.history);
        self.clock.start_window(window, window);
        self.replay = Some(replay);
        self.state.insert(LevelState::IN_REPLAY);
        info!(entries = self.history.len(), window, "replay started");
        true
    }

    /// Rewinds the run back to the start before the next level is loaded.
    ///
    /// A running forward replay is skipped first. Returns `false` while live
    /// play is still in progress or a rewind is already running.
    pub fn load_current_level(&mut self) -> bool {
        if !self.is_over() || self.state.contains(LevelState::IN_REPLAY_REVERSED) {
            return false;
        }
        if self.state.contains(LevelState::IN_REPLAY) {
            self.skip();
        }
        self.restore_end_state();

        let replay = Replay::new(true, self.config.rewind_speed);
        let window = replay.duration_of(&self.history);
        self.clock.start_window(window, 0.0);
        self.replay = Some(replay);
        self.state.insert(LevelState::IN_REPLAY_REVERSED);
        info!(entries = self.history.len(), window, "rewind started");
        true
    }

    /// Stops the running replay at once and jumps to where it would have
    /// ended: the end of the run for a replay, the start for a rewind.
    pub fn skip(&mut self) -> LevelEvent {
        let Some(mut replay) = self.replay.take() else {
            return LevelEvent::None;
        };
        let reversed = replay.is_reversed();
        debug!(reversed, executed = replay.position(), "replay skipped");
        replay.skip();
        if reversed {
            self.maze = self.initial_maze.clone();
            self.player.reset(self.maze.start());
            self.ghosts.iter_mut().for_each(Ghost::reset);
            self.clock.tick_within_window(self.clock.window());
        } else {
            self.restore_end_state();
            self.clock.tick_within_window(-self.clock.window());
        }
        self.player.set_light_fraction(self.clock.light_fraction());
        self.finish_replay(reversed)
    }

    /// Throws the attempt away and starts the same level again.
    pub fn restart(&mut self) {
        if let Some(mut replay) = self.replay.take() {
            replay.cancel();
        }
        self.maze = self.initial_maze.clone();
        self.player.reset(self.maze.start());
        self.ghosts.iter_mut().for_each(Ghost::reset);
        self.history.clear();
        self.clock.reset();
        self.state = LevelState::IN_PROGRESS;
        self.play_time = 0.0;
        self.end_state = None;
        info!("level restarted");
    }

    fn restore_end_state(&mut self) {
        if let Some(end) = &self.end_state {
            self.maze = end.maze.clone();
            self.player = end.player.clone();
            self.ghosts = end.ghosts.clone();
        }
    }
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Level")
            .field("mode", &self.mode.name())
            .field("state", &self.state)
            .field("time_left", &self.clock.time_left())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{Escape, KeyHunt};

    fn config() -> LevelConfig {
        LevelConfig {
            width: 6,
            height: 6,
            ghost_count: 0,
            seed: 17,
            ..LevelConfig::default()
        }
    }

    #[test]
    fn state_flags_combine() {
        let mut state = LevelState::COMPLETED | LevelState::IN_REPLAY;
        assert!(state.contains(LevelState::IN_REPLAY));
        assert!(!state.contains(LevelState::COMPLETED | LevelState::FAILED));
        state.remove(LevelState::IN_REPLAY);
        assert_eq!(state, LevelState::COMPLETED);
        assert_eq!(state.to_string(), "Completed");
        assert_eq!(LevelState::NONE.to_string(), "None");
    }

    #[test]
    fn new_level_starts_in_progress_with_full_time() {
        let level = Level::new(config(), Box::new(KeyHunt)).unwrap();
        assert!(level.level_is(LevelState::IN_PROGRESS));
        assert_eq!(level.time_left(), 60.0);
        assert!(level.history().is_empty());
        assert_eq!(level.player().position(), level.maze().start());
        assert_eq!(level.mode().name(), "key-hunt");
        assert_eq!(level.maze().path_length().map(|n| n > 0), Ok(true));
    }

    #[test]
    fn invalid_dimensions_are_rejected() {
        let bad = LevelConfig {
            height: 0,
            ..config()
        };
        assert!(matches!(
            Level::new(bad, Box::new(Escape)),
            Err(LevelError::Maze(_))
        ));
    }

    #[test]
    fn running_out_of_time_fails_the_level() {
        let mut level = Level::new(
            LevelConfig {
                time_budget: 1.0,
                ..config()
            },
            Box::new(Escape),
        )
        .unwrap();
        assert_eq!(level.update(1.0, None), LevelEvent::None);
        assert_eq!(level.update(0.5, None), LevelEvent::Failed);
        assert!(level.level_is(LevelState::FAILED));
        // Terminal: further ticks change nothing.
        assert_eq!(level.update(0.5, Some(Direction::Up)), LevelEvent::None);
        assert_eq!(level.play_time(), 1.5);
    }

    #[test]
    fn light_dims_with_time() {
        let mut level = Level::new(config(), Box::new(Escape)).unwrap();
        level.update(30.0, None);
        assert!((level.light_fraction() - 0.5).abs() < 1e-6);
        assert!((level.player().light_angle() - 55.0).abs() < 1e-4);
    }

    #[test]
    fn replay_requires_a_finished_level() {
        let mut level = Level::new(config(), Box::new(Escape)).unwrap();
        assert!(!level.watch_replay(|| {}));
        assert!(!level.load_current_level());
        level.end_level(false);
        assert!(level.watch_replay(|| {}));
        assert!(!level.watch_replay(|| {}));
        assert!(level.level_is(LevelState::FAILED | LevelState::IN_REPLAY));
    }

    #[test]
    fn record_rebuilds_the_same_level() {
        let level = Level::new(
            LevelConfig {
                ghost_count: 2,
                ..config()
            },
            Box::new(KeyHunt),
        )
        .unwrap();
        let rebuilt = Level::from_record(&level.record(), LevelConfig::default()).unwrap();
        assert_eq!(rebuilt.maze(), level.maze());
        assert_eq!(rebuilt.ghosts(), level.ghosts());
        assert_eq!(rebuilt.mode().name(), "key-hunt");
    }

    #[test]
    fn ghost_spawn_outside_the_maze_is_rejected() {
        let level = Level::new(config(), Box::new(Escape)).unwrap();
        let mut record = level.record();
        record.hazards = vec![Position::new(0, 0), Position::new(6, 2)];
        assert!(matches!(
            Level::from_record(&record, config()),
            Err(LevelError::Maze(MazeError::CorruptSnapshot(_)))
        ));
    }

    #[test]
    fn unknown_mode_in_record_is_an_error() {
        let level = Level::new(config(), Box::new(Escape)).unwrap();
        let mut record = level.record();
        record.mode = "tag".to_string();
        assert!(matches!(
            Level::from_record(&record, config()),
            Err(LevelError::UnknownMode(_))
        ));
    }
}
