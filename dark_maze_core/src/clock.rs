use tracing::debug;

/// Time-left accounting for one level.
///
/// During live play `time_left` counts down from `budget`. Replays reuse the
/// clock over their own window `[0, window]`. Ratio adjustments only apply
/// while adjustments are enabled, which the level does for live play only,
/// so replayed hazard effects do not disturb the replay window.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelClock {
    budget: f32,
    time_left: f32,
    window: f32,
    adjustments_enabled: bool,
}

impl LevelClock {
    pub fn new(budget: f32) -> Self {
        LevelClock {
            budget,
            time_left: budget,
            window: budget,
            adjustments_enabled: true,
        }
    }

    pub fn budget(&self) -> f32 {
        self.budget
    }

    pub fn time_left(&self) -> f32 {
        self.time_left
    }

    /// Length of the current timing window (the budget during live play).
    pub fn window(&self) -> f32 {
        self.window
    }

    pub fn is_expired(&self) -> bool {
        self.time_left < 0.0
    }

    /// Restarts live accounting at the full budget.
    pub fn reset(&mut self) {
        self.time_left = self.budget;
        self.window = self.budget;
        self.adjustments_enabled = true;
    }

    /// Switches to a replay window starting at `time_left`.
    pub fn start_window(&mut self, window: f32, time_left: f32) {
        self.window = window.max(0.0);
        self.time_left = time_left.clamp(0.0, self.window);
        self.adjustments_enabled = false;
    }

    /// Counts down by `dt` seconds without a lower bound.
    pub fn tick(&mut self, dt: f32) {
        self.time_left -= dt;
    }

    /// Moves time-left by `delta` within the replay window.
    pub fn tick_within_window(&mut self, delta: f32) {
        self.time_left = (self.time_left + delta).clamp(0.0, self.window);
    }

    /// Adds `ratio * budget` seconds. Negative ratios take time away.
    ///
    /// Returns whether the adjustment was applied.
    pub fn add_time(&mut self, ratio: f32) -> bool {
        if !self.adjustments_enabled {
            return false;
        }
        let delta = ratio * self.budget;
        self.time_left += delta;
        debug!(ratio, delta, time_left = self.time_left, "time adjusted");
        true
    }

    /// Fraction of the window still left, in `[0, 1]`.
    pub fn light_fraction(&self) -> f32 {
        if self.window <= 0.0 {
            return 0.0;
        }
        (self.time_left / self.window).clamp(0.0, 1.0)
    }
}
