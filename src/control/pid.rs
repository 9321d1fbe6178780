//! Kettle demand regulator.
//!
//! Produces the 0..100% heater demand for one PID window from the
//! fused kettle temperature and the runner's sliding target, then
//! resolves it through the override chain: manual output first, boost,
//! the heater limit, rest. Gains come in mash and boil flavours and
//! are fixed for the lifetime of a run; the window length follows the
//! live settings.
//!
//! Two formulation choices matter for a mash kettle:
//!
//! - The derivative acts on the measured temperature, not the error,
//!   so the target jumps the runner makes at step transitions cannot
//!   kick the output.
//! - The integral contribution only banks while the output is inside
//!   its range, so a long cold-start ramp at 100% cannot wind it up.

use crate::config::PidSettings;
use crate::run::BoostStatus;

/// Everything one PID window regulates against.
#[derive(Debug, Clone, Copy)]
pub struct WindowInputs {
    /// Fused kettle temperature.
    pub temperature: f32,
    /// Target for this window, interpolated by the schedule runner.
    pub target: f32,
    /// Window length in seconds.
    pub window_secs: f32,
    /// Manual output override from the command channel.
    pub manual_override: Option<u8>,
    pub boost: BoostStatus,
    /// Demand ceiling in percent; 100 disables the clamp.
    pub heater_limit: u8,
}

/// The demand that drives the heaters plus the value reported to
/// clients. Under manual override the report keeps showing the raw
/// regulator output so the user sees what the controller would want.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demand {
    pub applied: u8,
    pub reported: u8,
}

pub struct Regulator {
    kp: f32,
    ki: f32,
    kd: f32,
    /// Banked integral contribution, already in percent.
    integral_percent: f32,
    /// Kettle temperature at the previous window, for the derivative.
    prev_temperature: Option<f32>,
}

impl Regulator {
    /// Pick gains for a run: the boil set on boil runs, the mash set
    /// otherwise.
    pub fn for_run(settings: &PidSettings, boil: bool) -> Self {
        let (kp, ki, kd) = settings.gains(boil);
        Self {
            kp,
            ki,
            kd,
            integral_percent: 0.0,
            prev_temperature: None,
        }
    }

    /// Raw regulator output for one window, percent.
    pub fn demand(&mut self, temperature: f32, target: f32, window_secs: f32) -> u8 {
        let error = target - temperature;
        let proportional = self.kp * error;

        let banked = self.integral_percent + self.ki * error * window_secs;

        let derivative = match self.prev_temperature {
            Some(prev) if window_secs > 0.0 => -self.kd * (temperature - prev) / window_secs,
            _ => 0.0,
        };
        self.prev_temperature = Some(temperature);

        let unclamped = proportional + banked + derivative;
        if (0.0..=100.0).contains(&unclamped) {
            self.integral_percent = banked;
        }
        unclamped.clamp(0.0, 100.0) as u8
    }

    /// One full window: raw demand resolved through the override
    /// chain, first match wins.
    pub fn resolve(&mut self, inputs: &WindowInputs) -> Demand {
        let raw = self.demand(inputs.temperature, inputs.target, inputs.window_secs);

        if let Some(manual) = inputs.manual_override {
            Demand {
                applied: manual,
                reported: raw,
            }
        } else if inputs.boost == BoostStatus::Boost {
            Demand {
                applied: 100,
                reported: 100,
            }
        } else if raw > inputs.heater_limit {
            Demand {
                applied: inputs.heater_limit,
                reported: inputs.heater_limit,
            }
        } else if inputs.boost == BoostStatus::Rest {
            Demand {
                applied: 0,
                reported: 0,
            }
        } else {
            Demand {
                applied: raw,
                reported: raw,
            }
        }
    }

    /// Forget accumulated history; the next window starts fresh.
    /// Requested on step transitions, boost transitions and manual
    /// override changes.
    pub fn reset(&mut self) {
        self.integral_percent = 0.0;
        self.prev_temperature = None;
    }
}
