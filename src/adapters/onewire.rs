//! Probe bus adapters.
//!
//! The real DS18B20 driver rides the IDF RMT 1-Wire component and
//! lives outside this crate; firmware binaries hand the core whatever
//! implements [`ProbeBus`]. [`SimProbeBus`] is the in-memory twin used
//! by the host binary and the test suites: scripted probes with
//! settable temperatures and injectable read failures.
//! [`UnboundProbeBus`] is the loud placeholder for board profiles
//! that have no driver linked yet.

use std::collections::BTreeMap;
use std::sync::Mutex;

use log::error;

use crate::app::ProbeBus;
use crate::error::ProbeError;

// ───────────────────────────────────────────────────────────────
// Unbound bus
// ───────────────────────────────────────────────────────────────

/// Stand-in for firmware builds without a bound 1-Wire driver.
///
/// Every scan logs an error and comes back empty, and conversions
/// report no device, so the fused temperature stays at its
/// no-control-probe value. The binary can still boot for
/// commissioning (settings, schedule CRUD, heater wiring checks) but
/// cannot be mistaken for a working probe bus — callers should refuse
/// control runs while this is wired.
pub struct UnboundProbeBus;

impl ProbeBus for UnboundProbeBus {
    fn scan(&self) -> Vec<u64> {
        error!("probe bus has no driver bound: scan finds nothing");
        Vec::new()
    }

    fn convert(&self, _id: u64) -> Result<f32, ProbeError> {
        Err(ProbeError::NoDevice)
    }
}

#[derive(Debug, Clone, Copy)]
struct SimProbe {
    temperature_c: f32,
    failing: bool,
}

/// Scriptable probe bus.
#[derive(Default)]
pub struct SimProbeBus {
    probes: Mutex<BTreeMap<u64, SimProbe>>,
}

impl SimProbeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a probe to the bus (or reset an existing one).
    pub fn attach(&self, id: u64, temperature_c: f32) {
        self.probes.lock().unwrap().insert(
            id,
            SimProbe {
                temperature_c,
                failing: false,
            },
        );
    }

    /// Remove a probe from the bus entirely.
    pub fn detach(&self, id: u64) {
        self.probes.lock().unwrap().remove(&id);
    }

    pub fn set_temperature(&self, id: u64, temperature_c: f32) {
        if let Some(probe) = self.probes.lock().unwrap().get_mut(&id) {
            probe.temperature_c = temperature_c;
        }
    }

    /// Make reads from this probe fail until reset.
    pub fn set_failing(&self, id: u64, failing: bool) {
        if let Some(probe) = self.probes.lock().unwrap().get_mut(&id) {
            probe.failing = failing;
        }
    }
}

impl ProbeBus for SimProbeBus {
    fn scan(&self) -> Vec<u64> {
        self.probes.lock().unwrap().keys().copied().collect()
    }

    fn convert(&self, id: u64) -> Result<f32, ProbeError> {
        match self.probes.lock().unwrap().get(&id) {
            None => Err(ProbeError::NoDevice),
            Some(probe) if probe.failing => Err(ProbeError::ReadFailed),
            Some(probe) => Ok(probe.temperature_c),
        }
    }
}
