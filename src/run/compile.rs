//! Schedule compiler.
//!
//! Turns a mash schedule into an ordered list of execution steps with
//! absolute wall-clock times:
//!
//! ```text
//!  index 0      synthetic anchor: (now, current temperature)
//!  index 1      end of step 0's ramp
//!  index 2      end of step 0's hold
//!  index 3      end of step 1's ramp
//!  ...
//! ```
//!
//! The anchor makes ramp interpolation uniform: step `k` always
//! interpolates between step `k-1`'s point and its own. Notification
//! fire times become absolute timestamps at compile time; overtime
//! later shifts both steps and pending notifications forward.

use serde::Serialize;

use crate::model::MashSchedule;
use crate::run::temp_log::EpochSecs;

// ---------------------------------------------------------------------------
// Execution steps
// ---------------------------------------------------------------------------

/// One compiled point of the temperature program.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    /// Absolute end time of this phase.
    pub time: EpochSecs,
    /// Target temperature at that time.
    pub temperature: f32,
    pub allow_boost: bool,
    pub extend_if_needed: bool,
}

/// A notification armed for the running schedule. `time_from_start`
/// here is the absolute minute offset within the schedule (not the
/// per-step offset it was authored with).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveNotification {
    pub name: String,
    pub message: String,
    pub time_from_start: i64,
    /// Absolute fire time.
    pub time_point: EpochSecs,
    pub buzzer: bool,
    pub done: bool,
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// The compiled program the runner walks.
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    pub steps: Vec<ExecutionStep>,
    pub notifications: Vec<ActiveNotification>,
}

impl ExecutionPlan {
    /// Compile `schedule` against the current wall clock and fused
    /// temperature. The result always starts with the synthetic
    /// anchor step.
    pub fn compile(schedule: &MashSchedule, now: EpochSecs, current_temp: f32) -> Self {
        let mut steps = Vec::with_capacity(1 + schedule.steps.len() * 2);

        steps.push(ExecutionStep {
            time: now,
            temperature: current_temp,
            allow_boost: false,
            extend_if_needed: false,
        });

        let mut prev_time = now;
        for step in &schedule.steps {
            let ramp_end = prev_time + i64::from(step.step_time) * 60;
            steps.push(ExecutionStep {
                time: ramp_end,
                temperature: step.temperature,
                allow_boost: step.allow_boost,
                extend_if_needed: step.extend_step_time_if_needed,
            });
            prev_time = ramp_end;

            let hold_end = prev_time + i64::from(step.time) * 60;
            steps.push(ExecutionStep {
                time: hold_end,
                temperature: step.temperature,
                allow_boost: false,
                extend_if_needed: false,
            });
            prev_time = hold_end;
        }

        let mut notifications: Vec<ActiveNotification> = schedule
            .notifications
            .iter()
            .map(|n| ActiveNotification {
                name: n.name.clone(),
                message: n.message.clone(),
                time_from_start: n.time_absolute,
                time_point: now + n.time_absolute * 60,
                buzzer: n.buzzer,
                done: false,
            })
            .collect();
        notifications.sort_by_key(|n| n.time_point);

        Self {
            steps,
            notifications,
        }
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.notifications.clear();
    }

    /// Shift the step at `from_index` and everything after it, plus
    /// every pending notification, forward by `extra_secs`. Returns
    /// `false` when the step no longer exists.
    pub fn shift_from(&mut self, from_index: usize, extra_secs: i64) -> bool {
        if from_index >= self.steps.len() {
            return false;
        }
        for step in &mut self.steps[from_index..] {
            step.time += extra_secs;
        }
        for notification in &mut self.notifications {
            if !notification.done {
                notification.time_point += extra_secs;
            }
        }
        true
    }

    /// The first undone notification (they are sorted by fire time).
    pub fn first_pending(&self) -> Option<&ActiveNotification> {
        self.notifications.iter().find(|n| !n.done)
    }

    pub fn first_pending_mut(&mut self) -> Option<&mut ActiveNotification> {
        self.notifications.iter_mut().find(|n| !n.done)
    }
}
