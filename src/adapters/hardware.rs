//! GPIO output bank and the pin-driven annunciator.
//!
//! ## Dual-target design
//!
//! On ESP-IDF the bank drives real pins through the IDF GPIO API.
//! On the host it tracks levels in memory so the simulation binary
//! and tests can observe them.

#[cfg(not(target_os = "espidf"))]
use std::collections::BTreeMap;
use std::sync::Arc;
#[cfg(not(target_os = "espidf"))]
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

#[cfg(not(target_os = "espidf"))]
use log::debug;

use crate::app::{Annunciator, OutputBank};

// ───────────────────────────────────────────────────────────────
// GpioBank
// ───────────────────────────────────────────────────────────────

pub struct GpioBank {
    #[cfg(not(target_os = "espidf"))]
    levels: Mutex<BTreeMap<u8, bool>>,
}

impl GpioBank {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            levels: Mutex::new(BTreeMap::new()),
        }
    }

    /// Host-side inspection of the last written level.
    #[cfg(not(target_os = "espidf"))]
    pub fn level(&self, pin: u8) -> Option<bool> {
        self.levels.lock().unwrap().get(&pin).copied()
    }
}

impl Default for GpioBank {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBank for GpioBank {
    #[cfg(target_os = "espidf")]
    fn configure(&self, pin: u8, level: bool) {
        use esp_idf_svc::sys::*;
        // SAFETY: plain register writes on a pin this firmware owns.
        unsafe {
            gpio_reset_pin(i32::from(pin));
            gpio_set_direction(i32::from(pin), gpio_mode_t_GPIO_MODE_OUTPUT);
            gpio_set_level(i32::from(pin), u32::from(level));
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn configure(&self, pin: u8, level: bool) {
        debug!("gpio {pin} configured, level {level}");
        self.levels.lock().unwrap().insert(pin, level);
    }

    #[cfg(target_os = "espidf")]
    fn write(&self, pin: u8, level: bool) {
        // SAFETY: pin was configured as an output in `configure`.
        unsafe {
            esp_idf_svc::sys::gpio_set_level(i32::from(pin), u32::from(level));
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn write(&self, pin: u8, level: bool) {
        self.levels.lock().unwrap().insert(pin, level);
    }
}

// ───────────────────────────────────────────────────────────────
// PinAnnunciator
// ───────────────────────────────────────────────────────────────

/// Drives the buzzer and speaker pins through an [`OutputBank`], one
/// short-lived thread per sound so the runner never blocks. Pins set
/// to 0 are treated as not configured.
pub struct PinAnnunciator {
    outputs: Arc<dyn OutputBank>,
    buzzer_pin: u8,
    speaker_pins: (u8, u8),
    gpio_high: bool,
    gpio_low: bool,
}

impl PinAnnunciator {
    pub fn new(
        outputs: Arc<dyn OutputBank>,
        buzzer_pin: u8,
        speaker_pins: (u8, u8),
        gpio_high: bool,
    ) -> Self {
        Self {
            outputs,
            buzzer_pin,
            speaker_pins,
            gpio_high,
            gpio_low: !gpio_high,
        }
    }
}

impl Annunciator for PinAnnunciator {
    fn buzz(&self, seconds: u8) {
        if self.buzzer_pin == 0 {
            return;
        }
        let outputs = Arc::clone(&self.outputs);
        let (pin, high, low) = (self.buzzer_pin, self.gpio_high, self.gpio_low);
        thread::Builder::new()
            .name("buzzer".to_string())
            .spawn(move || {
                outputs.write(pin, high);
                thread::sleep(Duration::from_secs(u64::from(seconds)));
                outputs.write(pin, low);
            })
            .map_err(|e| log::error!("failed to spawn buzzer: {e}"))
            .ok();
    }

    fn chime(&self, total_ms: u32, burst_ms: u32) {
        let (pin1, pin2) = self.speaker_pins;
        if pin1 == 0 || pin2 == 0 || burst_ms == 0 {
            return;
        }
        let outputs = Arc::clone(&self.outputs);
        thread::Builder::new()
            .name("speaker".to_string())
            .spawn(move || {
                let mut elapsed = 0;
                while elapsed < total_ms {
                    outputs.write(pin1, true);
                    outputs.write(pin2, false);
                    thread::sleep(Duration::from_millis(u64::from(burst_ms)));
                    outputs.write(pin1, false);
                    outputs.write(pin2, false);
                    thread::sleep(Duration::from_millis(u64::from(burst_ms)));
                    elapsed += burst_ms * 2;
                }
            })
            .map_err(|e| log::error!("failed to spawn speaker: {e}"))
            .ok();
    }
}
