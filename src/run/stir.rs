//! Stir motor cycler.
//!
//! Runs the stir motor inside a window of each repeating cycle:
//! on from `interval_start` to `interval_stop` minutes into the
//! cycle, off for the remainder, cycle length `time_span` minutes.
//! A window covering the whole cycle means "always on".

use crate::run::temp_log::EpochSecs;

#[derive(Debug, Clone, Copy, Default)]
pub struct StirState {
    /// Wall-clock start of the current cycle.
    pub start_cycle: EpochSecs,
    /// Cycle length in minutes.
    pub time_span_min: i64,
    /// Stir window inside the cycle, minutes from cycle start.
    pub interval_start_min: i64,
    pub interval_stop_min: i64,
}

impl StirState {
    /// Whether the motor should be on at `now`, advancing to the next
    /// cycle when the current one has elapsed.
    pub fn tick(&mut self, now: EpochSecs) -> bool {
        if self.interval_start_min == 0 && self.interval_stop_min == self.time_span_min {
            return true;
        }

        let window_start = self.start_cycle + self.interval_start_min * 60;
        let window_stop = self.start_cycle + self.interval_stop_min * 60;
        let cycle_end = self.start_cycle + self.time_span_min * 60;

        let on = now >= window_start && now <= window_stop;

        if now >= cycle_end {
            self.start_cycle = cycle_end;
        }

        on
    }
}
