//! Temperature probe model.
//!
//! A probe exists once detected on the bus or loaded from the store;
//! its lifecycle is independent of schedule runs. The 1-Wire driver
//! handle stays inside the bus adapter, keyed by the 64-bit address —
//! the model only carries configuration and the last reading.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    /// 64-bit 1-Wire address. JSON carries it as a decimal string
    /// because JavaScript numbers are not 64-bit clean.
    #[serde(with = "string_id")]
    pub id: u64,
    pub name: String,
    /// Display colour for the UI, e.g. `#ffffff`.
    pub color: String,
    /// Contributes to the fused control average.
    pub use_for_control: bool,
    /// Reported in the per-probe telemetry map.
    pub show: bool,
    #[serde(default)]
    pub connected: bool,
    /// Additive bias, applied first.
    #[serde(default)]
    pub compensate_absolute: f32,
    /// Multiplicative gain, applied when it is neither 0 nor 1.
    #[serde(default = "default_gain")]
    pub compensate_relative: f32,
    /// Last calibrated reading; cleared when the probe drops off the bus.
    #[serde(skip)]
    pub last_temp: Option<f32>,
}

fn default_gain() -> f32 {
    1.0
}

impl Probe {
    /// A freshly detected probe: named after its address, white,
    /// fused into control and shown.
    pub fn detected(id: u64) -> Self {
        Self {
            id,
            name: id.to_string(),
            color: "#ffffff".to_string(),
            use_for_control: true,
            show: true,
            connected: true,
            compensate_absolute: 0.0,
            compensate_relative: 1.0,
            last_temp: None,
        }
    }

    /// Apply the per-probe calibration: bias, then gain.
    pub fn compensate(&self, raw: f32) -> f32 {
        let mut t = raw + self.compensate_absolute;
        if self.compensate_relative != 0.0 && self.compensate_relative != 1.0 {
            t *= self.compensate_relative;
        }
        t
    }
}

mod string_id {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u64>()
            .map_err(|_| D::Error::custom("probe id must be a decimal string"))
    }
}
