//! System configuration parameters.
//!
//! All tunable parameters for the brewing controller. Values are
//! overridden via the persistent store (see [`crate::persist`]) or the
//! command channel; saving system settings requires a reboot to take
//! effect on the pin assignments.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Maximum number of heaters the duty planner supports.
pub const MAX_HEATERS: usize = 10;

/// Maximum number of DS18B20-class probes on the bus.
pub const MAX_PROBES: usize = 10;

/// Fixed debug pin mirroring the OR of all heater states.
pub const STATUS_LED_PIN: u8 = 2;

// ---------------------------------------------------------------------------
// Temperature scale
// ---------------------------------------------------------------------------

/// Display/arithmetic scale for all temperatures in the system.
///
/// Only affects the boil-threshold default (100 °C / 212 °F), seeded
/// schedule temperatures, and the probe conversion; everything else
/// treats the value opaquely. Serialized as `0` / `1` on both the
/// command channel and the store (`tempScale` key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureScale {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureScale {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Fahrenheit,
            _ => Self::Celsius,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Celsius => 0,
            Self::Fahrenheit => 1,
        }
    }

    /// The temperature at which a free run counts as a boil.
    pub fn boil_threshold(self) -> f32 {
        match self {
            Self::Celsius => 100.0,
            Self::Fahrenheit => 212.0,
        }
    }

    /// Convert a probe reading (always Celsius on the wire) to this scale.
    pub fn from_celsius(self, celsius: f32) -> f32 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 1.8 + 32.0,
        }
    }
}

impl Serialize for TemperatureScale {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for TemperatureScale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        if raw > 1 {
            return Err(D::Error::custom("temperature scale must be 0 or 1"));
        }
        Ok(Self::from_u8(raw))
    }
}

// ---------------------------------------------------------------------------
// System settings (pins, outputs, MQTT)
// ---------------------------------------------------------------------------

/// Pin assignments and platform knobs. Persisted as individual typed
/// keys; changing them requires a reboot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    /// 1-Wire bus data pin.
    pub onewire_pin: u8,
    /// Stir motor pin (0 = not configured).
    pub stir_pin: u8,
    /// Buzzer pin (0 = not configured).
    pub buzzer_pin: u8,
    /// Buzzer on-time per notification, in seconds.
    pub buzzer_time: u8,
    /// Differential speaker pins (0 = not configured).
    pub speaker1_pin: u8,
    pub speaker2_pin: u8,
    /// Invert every output: logical "on" becomes a low level.
    pub invert_outputs: bool,
    /// MQTT broker URI; telemetry is disabled unless it starts with `mqtt://`.
    pub mqtt_uri: String,
    pub temperature_scale: TemperatureScale,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            onewire_pin: 4,
            stir_pin: 0,
            buzzer_pin: 0,
            buzzer_time: 2,
            speaker1_pin: 0,
            speaker2_pin: 0,
            invert_outputs: false,
            mqtt_uri: String::new(),
            temperature_scale: TemperatureScale::Celsius,
        }
    }
}

impl SystemSettings {
    /// Physical level for logical "on" / "off".
    pub fn gpio_high(&self) -> bool {
        !self.invert_outputs
    }

    pub fn gpio_low(&self) -> bool {
        self.invert_outputs
    }
}

// ---------------------------------------------------------------------------
// PID / heater timing settings
// ---------------------------------------------------------------------------

/// Regulator gains and duty timing. Gains are persisted ×10 as u16
/// (the store has no float support; one decimal is plenty).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidSettings {
    /// Mash gains.
    #[serde(rename = "kP")]
    pub mash_kp: f32,
    #[serde(rename = "kI")]
    pub mash_ki: f32,
    #[serde(rename = "kD")]
    pub mash_kd: f32,
    /// Boil gains.
    #[serde(rename = "boilkP")]
    pub boil_kp: f32,
    #[serde(rename = "boilkI")]
    pub boil_ki: f32,
    #[serde(rename = "boilkD")]
    pub boil_kd: f32,
    /// PID window length in seconds; one demand value governs each window.
    pub pid_loop_time: u16,
    /// Schedule runner step interval in seconds.
    pub step_interval: u16,
    /// Boost drives 100% until this fraction (percent) of the ramp is covered.
    /// Zero disables boost entirely.
    pub boost_mode_until: u8,
    /// Demand ceiling in percent; 100 disables the clamp.
    pub heater_limit: u8,
    /// Sub-windows per PID window for duty slicing.
    pub heater_cycles: u8,
    /// Relay guard in percent of a window (0–50).
    pub relay_guard: u8,
}

impl Default for PidSettings {
    fn default() -> Self {
        Self {
            mash_kp: 10.0,
            mash_ki: 1.0,
            mash_kd: 5.0,
            boil_kp: 20.0,
            boil_ki: 2.0,
            boil_kd: 10.0,
            pid_loop_time: 60,
            step_interval: 60,
            boost_mode_until: 85,
            heater_limit: 100,
            heater_cycles: 4,
            relay_guard: 5,
        }
    }
}

impl PidSettings {
    /// Gains for the given run mode.
    pub fn gains(&self, boil: bool) -> (f32, f32, f32) {
        if boil {
            (self.boil_kp, self.boil_ki, self.boil_kd)
        } else {
            (self.mash_kp, self.mash_ki, self.mash_kd)
        }
    }
}

/// Range-check PID settings before they are applied or persisted.
pub fn validate_pid_settings(s: &PidSettings) -> Result<(), &'static str> {
    if s.pid_loop_time == 0 {
        return Err("pidLoopTime must be > 0");
    }
    if s.heater_cycles == 0 || u16::from(s.heater_cycles) > s.pid_loop_time {
        return Err("heaterCycles must be 1..=pidLoopTime");
    }
    if s.heater_limit > 100 {
        return Err("heaterLimit must be 0-100");
    }
    if s.relay_guard > 50 {
        return Err("relayGuard must be 0-50");
    }
    if s.boost_mode_until > 100 {
        return Err("boostModeUntil must be 0-100");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Runner tuning
// ---------------------------------------------------------------------------

/// Fixed tuning for the schedule runner.
#[derive(Debug, Clone, Copy)]
pub struct RunnerTuning {
    /// A step's target counts as reached within this margin (degrees).
    pub temp_margin: f32,
    /// Overtime arms this many seconds before an extendable step ends.
    pub over_time_trigger: i64,
    /// Each overtime extension shifts the plan by this many seconds.
    pub over_time_step: i64,
}

impl Default for RunnerTuning {
    fn default() -> Self {
        Self {
            temp_margin: 0.5,
            over_time_trigger: 5,
            over_time_step: 30,
        }
    }
}
