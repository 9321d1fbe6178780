//! Mash schedules: steps, notifications, seeds.
//!
//! A schedule step is really two phases — a ramp from the previous
//! temperature over `step_time` minutes, then `time` minutes of hold.
//! Notifications anchor to a step's start via `ref_step_index` and an
//! offset; their absolute minute offset is recomputed whenever any
//! schedule's steps or notifications change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::TemperatureScale;

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MashStep {
    /// 0-based position within the schedule.
    pub index: u16,
    pub name: String,
    /// Target temperature at the end of the ramp.
    pub temperature: f32,
    /// Minutes to reach the target (the ramp).
    pub step_time: u32,
    /// Minutes to hold at the target.
    pub time: u32,
    /// May over-drive the regulator to 100% early in the ramp.
    #[serde(default)]
    pub allow_boost: bool,
    /// If the target is not reached in time, elongate the ramp instead
    /// of abandoning it.
    #[serde(default)]
    pub extend_step_time_if_needed: bool,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub name: String,
    #[serde(default)]
    pub message: String,
    /// Minutes after the referenced step's start.
    pub time_from_start: i64,
    /// Step this offset anchors to. Legacy payloads omit it, which
    /// anchors to the schedule start.
    #[serde(default)]
    pub ref_step_index: u16,
    pub buzzer: bool,
    /// Minutes from schedule start; recomputed, never authoritative.
    #[serde(default)]
    pub time_absolute: i64,
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MashSchedule {
    /// Unique key across the schedule map.
    pub name: String,
    /// Boil runs select the boil gain set and boil heaters.
    pub boil: bool,
    pub steps: Vec<MashStep>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    /// Imported-but-not-saved schedules; excluded from persistence.
    #[serde(skip)]
    pub temporary: bool,
}

impl MashSchedule {
    pub fn sort_steps(&mut self) {
        self.steps.sort_by_key(|s| s.index);
    }

    pub fn sort_notifications(&mut self) {
        self.notifications.sort_by_key(|n| n.time_absolute);
    }

    /// Recompute every notification's absolute minute offset:
    /// the summed ramp+hold time of all steps before the referenced
    /// step, plus the notification's own offset. Idempotent.
    pub fn compute_notification_times(&mut self) {
        for notification in &mut self.notifications {
            let mut sum = notification.time_from_start;
            for step in &self.steps {
                if step.index < notification.ref_step_index {
                    sum += i64::from(step.step_time);
                    sum += i64::from(step.time);
                }
            }
            notification.time_absolute = sum;
        }
        self.sort_notifications();
    }

    /// Total scheduled minutes: every ramp plus every hold.
    pub fn total_minutes(&self) -> u32 {
        self.steps.iter().map(|s| s.step_time + s.time).sum()
    }
}

/// Recompute absolute notification times across the whole schedule map.
pub fn compute_all_notification_times(schedules: &mut BTreeMap<String, MashSchedule>) {
    for schedule in schedules.values_mut() {
        schedule.compute_notification_times();
    }
}

// ---------------------------------------------------------------------------
// Seeds
// ---------------------------------------------------------------------------

fn step(
    index: u16,
    name: &str,
    temperature: f32,
    step_time: u32,
    time: u32,
    allow_boost: bool,
) -> MashStep {
    MashStep {
        index,
        name: name.to_string(),
        temperature,
        step_time,
        time,
        allow_boost,
        extend_step_time_if_needed: true,
    }
}

fn notification(name: &str, message: &str, time_from_start: i64) -> Notification {
    Notification {
        name: name.to_string(),
        message: message.to_string(),
        time_from_start,
        ref_step_index: 0,
        buzzer: true,
        time_absolute: 0,
    }
}

/// Factory schedules seeded when the store holds no schedule blob:
/// a single-infusion mash, a rye mash, and a 70-minute boil.
pub fn default_schedules(scale: TemperatureScale) -> Vec<MashSchedule> {
    let celsius = scale == TemperatureScale::Celsius;
    let t = |c: f32, f: f32| if celsius { c } else { f };

    let default_mash = MashSchedule {
        name: "Default".to_string(),
        boil: false,
        steps: vec![
            step(0, "Beta Amylase", t(64.0, 150.0), 5, 45, true),
            step(1, "Alpha Amylase", t(72.0, 160.0), 5, 20, false),
            step(2, "Mash Out", t(78.0, 170.0), 5, 5, false),
        ],
        notifications: vec![
            notification("Add Grains", "Please add Grains", 5),
            notification("Start Lautering", "Please Start Lautering/Sparging", 85),
        ],
        temporary: false,
    };

    let rye_mash = MashSchedule {
        name: "Rye Mash".to_string(),
        boil: false,
        steps: vec![
            step(0, "Beta Glucanase", t(43.0, 110.0), 5, 20, true),
            step(1, "Beta Amylase", t(64.0, 150.0), 5, 45, false),
            step(2, "Alpha Amylase", t(72.0, 160.0), 5, 20, false),
            step(3, "Mash Out", t(78.0, 170.0), 5, 5, false),
        ],
        notifications: vec![
            notification("Add Grains", "Please add Grains", 5),
            notification("Start Lautering", "Please Start Lautering/Sparging", 110),
        ],
        temporary: false,
    };

    let boil = MashSchedule {
        name: "Boil 70 Min".to_string(),
        boil: true,
        steps: vec![step(0, "Boil", t(101.0, 214.0), 0, 70, false)],
        notifications: vec![
            notification("Bittering Hops", "Please add Bittering Hops", 0),
            notification("Aroma Hops", "Please add Aroma Hops", 55),
        ],
        temporary: false,
    };

    vec![default_mash, rye_mash, boil]
}
