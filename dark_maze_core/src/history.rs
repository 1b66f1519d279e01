//! Chronological command log and its tick-driven playback.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    agent::AgentId,
    command::{Command, Verdict},
};

/// One recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub agent: AgentId,
    pub command: Command,
    /// Play time at which the entry started.
    pub at: f32,
}

/// Ordered log of every command executed during live play, across agents.
///
/// The order is never rearranged: reversed playback reads it back to front
/// through [`CommandHistory::iter_reversed`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandHistory {
    entries: Vec<HistoryEntry>,
    last_command_time: f32,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `command` for `agent` at play time `now` (seconds).
    ///
    /// An idle entry carrying the gap since the previous command finished
    /// goes in first, so playback reproduces the pauses between inputs.
    /// Commands of several agents recorded in the same tick share `now`.
    pub fn add(&mut self, agent: AgentId, command: Command, now: f32) {
        let gap = now - self.last_command_time;
        self.entries.push(HistoryEntry {
            agent,
            command: Command::idle(gap),
            at: self.last_command_time.min(now),
        });
        self.entries.push(HistoryEntry {
            agent,
            command,
            at: now,
        });
        self.last_command_time = self.last_command_time.max(now + command.duration);
    }

    /// Forgets every entry and restarts the gap clock at zero.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_command_time = 0.0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_command_time(&self) -> f32 {
        self.last_command_time
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    fn chronological_index(&self, index: usize, reversed: bool) -> Option<usize> {
        if reversed {
            index
                .checked_add(1)
                .and_then(|n| self.entries.len().checked_sub(n))
        } else {
            (index < self.entries.len()).then_some(index)
        }
    }

    /// Entry at `index` of the chronological or the reversed view.
    pub fn get(&self, index: usize, reversed: bool) -> Option<&HistoryEntry> {
        self.chronological_index(index, reversed)
            .and_then(|i| self.entries.get(i))
    }

    /// Play time between the entry at `index` of a view and the entry that
    /// followed it during play, or the end of the log for the last one.
    ///
    /// Reversed playback mirrors the same gaps, so both directions span
    /// [`CommandHistory::total_duration`].
    pub fn wait_after(&self, index: usize, reversed: bool) -> f32 {
        let Some(i) = self.chronological_index(index, reversed) else {
            return 0.0;
        };
        let next = self
            .entries
            .get(i + 1)
            .map_or(self.last_command_time, |entry| entry.at);
        (next - self.entries[i].at).max(0.0)
    }

    pub fn iter_chronological(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn iter_reversed(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev()
    }

    /// Play time covered by the log, up to the end of the last command.
    pub fn total_duration(&self) -> f32 {
        self.last_command_time
    }
}

/// Runs a history entry against the world during playback.
pub trait ReplayExecutor {
    fn execute(&mut self, entry: &HistoryEntry, reversed: bool) -> Verdict;
}

impl<F> ReplayExecutor for F
where
    F: FnMut(&HistoryEntry, bool) -> Verdict,
{
    fn execute(&mut self, entry: &HistoryEntry, reversed: bool) -> Verdict {
        self(entry, reversed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStatus {
    Running,
    Finished,
}

/// Timed playback of a [`CommandHistory`], advanced once per tick.
///
/// Each entry fires, then playback waits the play time that separated it
/// from the next entry, scaled by `multiplier`. Dropping or cancelling the replay stops it without
/// running the remaining entries.
pub struct Replay {
    reversed: bool,
    multiplier: f32,
    cursor: usize,
    wait: f32,
    finished: bool,
    on_complete: Option<Box<dyn FnOnce()>>,
}

impl Replay {
    pub fn new(reversed: bool, multiplier: f32) -> Self {
        Replay {
            reversed,
            multiplier: multiplier.max(0.0),
            cursor: 0,
            wait: 0.0,
            finished: false,
            on_complete: None,
        }
    }

    /// Callback fired exactly once, after the last entry's wait.
    pub fn on_complete(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Number of entries already executed.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Real time the whole playback of `history` takes.
    pub fn duration_of(&self, history: &CommandHistory) -> f32 {
        history.total_duration() * self.multiplier
    }

    /// Advances playback by `dt` seconds, firing every entry that falls due.
    pub fn advance(
        &mut self,
        dt: f32,
        history: &CommandHistory,
        executor: &mut dyn ReplayExecutor,
    ) -> ReplayStatus {
        if self.finished {
            return ReplayStatus::Finished;
        }

        self.wait -= dt;
        while self.wait <= 0.0 {
            let Some(entry) = history.get(self.cursor, self.reversed) else {
                self.finish();
                return ReplayStatus::Finished;
            };
            executor.execute(entry, self.reversed);
            self.wait += history.wait_after(self.cursor, self.reversed) * self.multiplier;
            self.cursor += 1;
        }
        ReplayStatus::Running
    }

    /// Stops playback immediately. The completion callback does not fire.
    pub fn cancel(&mut self) {
        if !self.finished {
            debug!(executed = self.cursor, "replay cancelled");
        }
        self.finished = true;
        self.on_complete = None;
    }

    /// Ends playback without running the remaining entries, firing the
    /// completion callback as if playback had run to the end.
    pub fn skip(&mut self) {
        if !self.finished {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        debug!(
            reversed = self.reversed,
            executed = self.cursor,
            "replay finished"
        );
        if let Some(callback) = self.on_complete.take() {
            callback();
        }
    }
}

impl fmt::Debug for Replay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replay")
            .field("reversed", &self.reversed)
            .field("multiplier", &self.multiplier)
            .field("cursor", &self.cursor)
            .field("wait", &self.wait)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{Direction, command::CommandKind};

    fn moves(directions: &[Direction]) -> CommandHistory {
        let mut history = CommandHistory::new();
        for (i, direction) in directions.iter().enumerate() {
            history.add(
                AgentId::Player,
                Command::movement(*direction, 0.5),
                i as f32 + 1.0,
            );
        }
        history
    }

    fn recorder(
        log: &mut Vec<(CommandKind, bool)>,
    ) -> impl FnMut(&HistoryEntry, bool) -> Verdict + '_ {
        move |entry, reversed| {
            log.push((entry.command.kind, reversed));
            Verdict {
                changed: true,
                elapsed: entry.command.duration,
            }
        }
    }

    #[test]
    fn add_prepends_the_gap_as_idle() {
        let mut history = CommandHistory::new();
        history.add(AgentId::Player, Command::movement(Direction::Up, 0.25), 2.0);
        history.add(AgentId::Ghost(0), Command::movement(Direction::Left, 0.5), 2.75);

        let entries = history.entries();
        assert_eq!(entries.len(), 4);
        assert!(entries[0].command.is_idle());
        assert_eq!(entries[0].command.duration, 2.0);
        assert_eq!(entries[1].command.kind, CommandKind::Move(Direction::Up));
        // The gap is measured from the end of the previous command.
        assert_eq!(entries[2].command.duration, 0.5);
        assert_eq!(entries[3].agent, AgentId::Ghost(0));
        assert_eq!(history.last_command_time(), 3.25);
    }

    #[test]
    fn reversed_view_leaves_order_intact() {
        let history = moves(&[Direction::Up, Direction::Right]);
        let forward: Vec<_> = history.iter_chronological().copied().collect();
        let backward: Vec<_> = history.iter_reversed().copied().collect();
        assert_eq!(forward.iter().rev().copied().collect::<Vec<_>>(), backward);
        assert_eq!(history.get(0, true), forward.last());
        assert_eq!(history.get(4, true), None);
        assert_eq!(history.entries(), forward.as_slice());
    }

    #[test]
    fn empty_history_completes_on_first_advance() {
        let history = CommandHistory::new();
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        let mut replay = Replay::new(false, 1.0).on_complete(move || counter.set(counter.get() + 1));
        let mut log = Vec::new();

        assert_eq!(
            replay.advance(0.0, &history, &mut recorder(&mut log)),
            ReplayStatus::Finished
        );
        assert_eq!(
            replay.advance(1.0, &history, &mut recorder(&mut log)),
            ReplayStatus::Finished
        );
        assert_eq!(fired.get(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn entries_fire_after_scaled_waits() {
        // idle at 0, up at 1, idle at 1.5, right at 2, log ends at 2.5;
        // every gap doubled by the multiplier.
        let history = moves(&[Direction::Up, Direction::Right]);
        let mut replay = Replay::new(false, 2.0);
        let mut log = Vec::new();

        replay.advance(0.0, &history, &mut recorder(&mut log));
        assert_eq!(log.len(), 1);
        replay.advance(1.5, &history, &mut recorder(&mut log));
        assert_eq!(log.len(), 1);
        replay.advance(0.5, &history, &mut recorder(&mut log));
        assert_eq!(log[1].0, CommandKind::Move(Direction::Up));
        replay.advance(1.0, &history, &mut recorder(&mut log));
        assert_eq!(log.len(), 3);
        replay.advance(1.0, &history, &mut recorder(&mut log));
        assert_eq!(log.len(), 4);
        assert_eq!(
            replay.advance(0.5, &history, &mut recorder(&mut log)),
            ReplayStatus::Running
        );
        assert_eq!(
            replay.advance(0.5, &history, &mut recorder(&mut log)),
            ReplayStatus::Finished
        );
        assert_eq!(replay.duration_of(&history), 5.0);
    }

    #[test]
    fn reversed_playback_runs_back_to_front() {
        let history = moves(&[Direction::Up, Direction::Right]);
        let mut log = Vec::new();
        let mut replay = Replay::new(true, 0.0);
        assert_eq!(
            replay.advance(0.0, &history, &mut recorder(&mut log)),
            ReplayStatus::Finished
        );
        let kinds: Vec<_> = log.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                CommandKind::Move(Direction::Right),
                CommandKind::Idle,
                CommandKind::Move(Direction::Up),
                CommandKind::Idle
            ]
        );
        assert!(log.iter().all(|(_, reversed)| *reversed));
    }

    #[test]
    fn reversing_twice_does_not_flip_the_log() {
        let history = moves(&[Direction::Up, Direction::Left, Direction::Down]);
        let before = history.clone();
        for _ in 0..2 {
            let mut replay = Replay::new(true, 0.0);
            let mut log = Vec::new();
            replay.advance(0.0, &history, &mut recorder(&mut log));
            assert_eq!(log[0].0, CommandKind::Move(Direction::Down));
        }
        assert_eq!(history, before);
    }

    #[test]
    fn cancel_skips_remaining_entries_and_callback() {
        let history = moves(&[Direction::Up, Direction::Right]);
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let mut replay = Replay::new(false, 1.0).on_complete(move || flag.set(true));
        let mut log = Vec::new();

        replay.advance(0.0, &history, &mut recorder(&mut log));
        replay.cancel();
        assert_eq!(
            replay.advance(10.0, &history, &mut recorder(&mut log)),
            ReplayStatus::Finished
        );
        assert_eq!(log.len(), 1);
        assert!(!fired.get());
        assert_eq!(replay.position(), 1);
    }

    #[test]
    fn same_tick_commands_do_not_stretch_playback() {
        let mut history = CommandHistory::new();
        history.add(AgentId::Player, Command::movement(Direction::Up, 0.5), 1.0);
        history.add(AgentId::Ghost(0), Command::movement(Direction::Left, 0.5), 1.0);
        history.add(AgentId::Ghost(1), Command::movement(Direction::Right, 0.5), 1.0);
        assert_eq!(history.total_duration(), 1.5);

        let mut replay = Replay::new(false, 1.0);
        assert_eq!(replay.duration_of(&history), 1.5);
        let mut log = Vec::new();
        replay.advance(0.0, &history, &mut recorder(&mut log));
        assert_eq!(log.len(), 1);
        assert_eq!(
            replay.advance(1.0, &history, &mut recorder(&mut log)),
            ReplayStatus::Running
        );
        assert_eq!(log.len(), 6);
        assert_eq!(
            replay.advance(0.5, &history, &mut recorder(&mut log)),
            ReplayStatus::Finished
        );
    }

    #[test]
    fn reversed_playback_mirrors_the_gaps() {
        let history = moves(&[Direction::Up, Direction::Right]);
        let mut replay = Replay::new(true, 1.0);
        let mut log = Vec::new();

        replay.advance(0.0, &history, &mut recorder(&mut log));
        assert_eq!(log[0].0, CommandKind::Move(Direction::Right));
        replay.advance(0.5, &history, &mut recorder(&mut log));
        assert_eq!(log.len(), 2);
        replay.advance(0.5, &history, &mut recorder(&mut log));
        assert_eq!(log[2].0, CommandKind::Move(Direction::Up));
        replay.advance(0.5, &history, &mut recorder(&mut log));
        assert_eq!(log.len(), 4);
        assert_eq!(
            replay.advance(0.5, &history, &mut recorder(&mut log)),
            ReplayStatus::Running
        );
        assert_eq!(
            replay.advance(0.5, &history, &mut recorder(&mut log)),
            ReplayStatus::Finished
        );
        assert_eq!(replay.duration_of(&history), 2.5);
    }

    #[test]
    fn skip_completes_without_running_entries() {
        let history = moves(&[Direction::Up]);
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        let mut replay = Replay::new(false, 1.0).on_complete(move || counter.set(counter.get() + 1));

        replay.skip();
        replay.skip();
        let mut log = Vec::new();
        assert_eq!(
            replay.advance(1.0, &history, &mut recorder(&mut log)),
            ReplayStatus::Finished
        );
        assert!(log.is_empty());
        assert_eq!(fired.get(), 1);
    }
}
