//! Schedule runner — walks the compiled execution steps once per
//! second.
//!
//! Responsibilities per tick:
//!
//! 1. Interpolate the sliding target temperature inside a ramp
//!    (holds pin it to the step temperature).
//! 2. Enter/leave boost when the step allows it.
//! 3. Arm overtime shortly before an extendable step ends without
//!    having reached target, then shift the remaining plan forward
//!    until it does.
//! 4. Advance to the next step at its scheduled end, resetting the
//!    regulator and dropping overrides.
//! 5. Fire due notifications (suppressed while in overtime) and end
//!    the run once steps and notifications are both exhausted.
//!
//! The runner itself is a plain tick function over the shared
//! [`Engine`]; the task layer adds the 1 s cadence and honours
//! `no_delay` to collapse transitions.

use log::info;

use crate::app::{Annunciator, TelemetrySink};
use crate::engine::Engine;
use crate::run::temp_log::EpochSecs;
use crate::run::BoostStatus;

/// What the surrounding loop should do after a tick.
#[derive(Debug, Clone, Copy)]
pub struct TickOutcome {
    /// Re-enter immediately instead of sleeping one period.
    pub no_delay: bool,
    /// The program is complete and the run has been stopped.
    pub finished: bool,
}

pub struct ScheduleRunner {
    /// A transition wants a PID reset, but only after the next tick
    /// has recomputed the target — resetting earlier would regulate
    /// against a stale setpoint.
    reset_pid_next: bool,
    /// The current step holds temperature rather than ramping it.
    hold: bool,
    /// All steps are done; only notifications may remain.
    no_more_steps: bool,
    /// Latched once the measured temperature came within margin of
    /// the target during the current step.
    target_reached: bool,
}

impl ScheduleRunner {
    pub fn new() -> Self {
        Self {
            reset_pid_next: false,
            hold: true,
            no_more_steps: false,
            target_reached: false,
        }
    }

    pub fn tick(
        &mut self,
        engine: &Engine,
        annunciator: &dyn Annunciator,
        telemetry: &dyn TelemetrySink,
        now: EpochSecs,
    ) -> TickOutcome {
        let step_index = engine.current_mash_step();
        let (prev, curr, step_count) = {
            let plan = engine.plan.lock().unwrap();
            let Some(curr) = plan.steps.get(step_index).copied() else {
                log::error!("no execution step at index {step_index}");
                engine.stop();
                return TickOutcome {
                    no_delay: false,
                    finished: true,
                };
            };
            let prev = if step_index == 0 {
                curr
            } else {
                plan.steps[step_index - 1]
            };
            (prev, curr, plan.steps.len())
        };

        let temperature = engine.temperature();
        // The target compared here was set in the previous cycle (the
        // step temperature right after a transition).
        self.target_reached = self.target_reached
            || (engine.target_temperature() - temperature).abs() <= engine.tuning.temp_margin;

        let mut no_delay = false;

        if now < curr.time {
            self.run_within_step(engine, telemetry, now, prev, curr, temperature);
        } else if !curr.extend_if_needed || self.target_reached {
            no_delay = self.advance(engine, step_index, step_count, curr);
        } else {
            // Target not reached at the scheduled end of an extendable
            // step (or a zero-length extendable step is starting).
            engine.extend_overtime(step_index);
            info!("extend step");
            no_delay = true;
        }

        let no_more_notification = self.fire_due_notification(engine, annunciator, now);

        let finished = self.no_more_steps && no_more_notification;
        if finished {
            info!("program finished");
            engine.stop();
        }

        TickOutcome { no_delay, finished }
    }

    // ── Inside the current step ───────────────────────────────

    fn run_within_step(
        &mut self,
        engine: &Engine,
        telemetry: &dyn TelemetrySink,
        now: EpochSecs,
        prev: crate::run::ExecutionStep,
        curr: crate::run::ExecutionStep,
        temperature: f32,
    ) {
        let (pid_loop_time, boost_mode_until) = {
            let pid = engine.pid_settings.lock().unwrap();
            (i64::from(pid.pid_loop_time), pid.boost_mode_until)
        };

        // Elapsed ramp fraction in percent, looking one PID window
        // ahead so the goal temperature lands as the window completes.
        let temp_rate = if !self.hold && (curr.time - prev.time) > pid_loop_time {
            (100 * (now + pid_loop_time - prev.time) / (curr.time - prev.time)).clamp(0, 100)
        } else {
            100
        };

        let target = match engine.override_target() {
            Some(override_target) => override_target,
            None => {
                prev.temperature
                    + (curr.temperature - prev.temperature) * temp_rate as f32 / 100.0
            }
        };
        engine.set_target_temperature(target);

        if curr.allow_boost {
            let boost_until = prev.temperature
                + (target - prev.temperature) * f32::from(boost_mode_until) / 100.0;

            match engine.boost_status() {
                BoostStatus::Off if temperature < boost_until => {
                    info!("boost start until {boost_until}°");
                    telemetry.log("Boost Start");
                    engine.set_boost_status(BoostStatus::Boost);
                    self.reset_pid_next = true;
                }
                BoostStatus::Boost if temperature >= boost_until => {
                    info!("boost end");
                    telemetry.log("Boost End");
                    engine.set_boost_status(BoostStatus::Off);
                    self.reset_pid_next = true;
                }
                _ => {}
            }
        }

        if curr.extend_if_needed {
            if !engine.in_over_time()
                && now > curr.time - engine.tuning.over_time_trigger
                && !self.target_reached
            {
                engine.set_in_over_time(true);
                info!("entering time extension, notifications suspended");
            }
        } else {
            // Only extendable steps care about reaching target at the
            // boundary.
            self.target_reached = false;
        }

        if self.reset_pid_next {
            info!("requesting pid reset");
            engine.request_pid_reset();
            self.reset_pid_next = false;
        }
    }

    // ── Scheduled end reached ─────────────────────────────────

    fn advance(
        &mut self,
        engine: &Engine,
        step_index: usize,
        step_count: usize,
        curr: crate::run::ExecutionStep,
    ) -> bool {
        // Leaving overtime re-enables suspended notifications; let
        // clients re-sync the shifted plan.
        if engine.in_over_time() {
            engine.bump_running_version();
            engine.set_in_over_time(false);
        }

        if step_count < step_index + 2 {
            if !self.no_more_steps {
                self.no_more_steps = true;
                engine.set_boost_status(BoostStatus::Off);
                engine.clear_overrides();
                engine.set_target_temperature(0.0);
                engine.set_rest_run(true);
                engine.request_pid_reset();
                info!("no more steps");
            }
            return false;
        }

        let next_index = step_index + 1;
        engine.set_current_mash_step(next_index);
        let next = {
            let plan = engine.plan.lock().unwrap();
            plan.steps.get(next_index).copied()
        };
        let Some(next) = next else {
            log::error!("no execution step at index {next_index}");
            engine.stop();
            return false;
        };

        self.hold = next.temperature == curr.temperature;
        engine.set_target_temperature(next.temperature);
        self.target_reached = false;
        self.reset_pid_next = true;
        engine.set_boost_status(BoostStatus::Off);
        engine.clear_overrides();
        info!("next step started");

        // A zero-length extendable step lingers one cycle so a
        // notification scheduled at its start can fire first.
        next.time > curr.time || !next.extend_if_needed
    }

    // ── Notifications ─────────────────────────────────────────

    /// Fire the first due notification. Returns whether none remain
    /// pending (always true while overtime suppresses them).
    fn fire_due_notification(
        &self,
        engine: &Engine,
        annunciator: &dyn Annunciator,
        now: EpochSecs,
    ) -> bool {
        if engine.in_over_time() {
            return true;
        }

        let buzzer_time = engine.settings.lock().unwrap().buzzer_time;
        let fired = {
            let mut plan = engine.plan.lock().unwrap();
            match plan.first_pending_mut() {
                None => return true,
                Some(first) if now >= first.time_point => {
                    first.done = true;
                    Some(first.name.clone())
                }
                Some(_) => None,
            }
        };

        if let Some(name) = fired {
            info!("notify {name}");
            annunciator.buzz(buzzer_time);
            annunciator.chime(u32::from(buzzer_time) * 1000, 300);
        }
        false
    }
}

impl Default for ScheduleRunner {
    fn default() -> Self {
        Self::new()
    }
}
