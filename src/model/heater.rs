//! Resistive heater model.
//!
//! A system drives 1..=10 heaters. The duty planner walks them in
//! preference order (lower first) and hands each a per-window burn
//! time; the output mirror reflects the live `burn` flag onto GPIO.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heater {
    /// Sequential id, renumbered 1..=N on every save (so inbound
    /// payloads may omit it).
    #[serde(default)]
    pub id: u8,
    pub name: String,
    /// Output GPIO pin.
    pub pin_nr: u8,
    /// Tie-break for the duty planner: lower preference burns first.
    pub preference: u8,
    /// Rated power in watts.
    pub watt: u32,
    pub use_for_mash: bool,
    pub use_for_boil: bool,

    /// Participates in the current run (derived from the run mode).
    #[serde(skip)]
    pub enabled: bool,
    /// Burn time for the current PID window, percent 0..=100.
    #[serde(skip)]
    pub burn_time: u8,
    /// Live on/off flag, mirrored onto GPIO once per second.
    #[serde(skip)]
    pub burn: bool,
}

impl Heater {
    pub fn new(id: u8, name: &str, pin_nr: u8, preference: u8, watt: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            pin_nr,
            preference,
            watt,
            use_for_mash: true,
            use_for_boil: true,
            enabled: false,
            burn_time: 0,
            burn: false,
        }
    }
}

/// Keep the heater list in the order the duty planner walks it.
pub fn sort_by_preference(heaters: &mut [Heater]) {
    heaters.sort_by_key(|h| h.preference);
}

/// Factory heater pair used when the store holds no heater blob.
pub fn default_heaters(pin1: u8, pin2: u8) -> Vec<Heater> {
    vec![
        Heater::new(1, "Heater 1", pin1, 1, 1500),
        Heater::new(2, "Heater 2", pin2, 2, 1500),
    ]
}
