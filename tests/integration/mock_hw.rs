//! Simulated board for integration tests.
//!
//! Uses the crate's own simulation adapters for GPIO, the probe bus,
//! storage and the clock, and adds recording mocks for the annunciator
//! and telemetry so tests can assert on what the core emitted.

#![allow(dead_code)] // Not every suite touches every recorded channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use brewctl::adapters::{GpioBank, NvsStore, SimClock, SimProbeBus};
use brewctl::app::{Annunciator, Board, Clock, PlatformPort, TelemetrySample, TelemetrySink};
use brewctl::Engine;

// ── Recording annunciator ─────────────────────────────────────

#[derive(Default)]
pub struct RecordingAnnunciator {
    pub buzzes: Mutex<Vec<u8>>,
    pub chimes: Mutex<Vec<(u32, u32)>>,
}

impl Annunciator for RecordingAnnunciator {
    fn buzz(&self, seconds: u8) {
        self.buzzes.lock().unwrap().push(seconds);
    }

    fn chime(&self, total_ms: u32, burst_ms: u32) {
        self.chimes.lock().unwrap().push((total_ms, burst_ms));
    }
}

// ── Recording telemetry ───────────────────────────────────────

#[derive(Default)]
pub struct RecordingTelemetry {
    pub samples: Mutex<Vec<TelemetrySample>>,
    pub lines: Mutex<Vec<String>>,
}

impl TelemetrySink for RecordingTelemetry {
    fn enabled(&self) -> bool {
        true
    }

    fn publish_sample(&self, sample: &TelemetrySample) {
        self.samples.lock().unwrap().push(*sample);
    }

    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

// ── Recording platform ────────────────────────────────────────

#[derive(Default)]
pub struct RecordingPlatform {
    pub reboots: Mutex<u32>,
}

impl PlatformPort for RecordingPlatform {
    fn reboot(&self) {
        *self.reboots.lock().unwrap() += 1;
    }

    fn boot_into_recovery(&self) -> Result<String, String> {
        Ok("Device is booting into recovery hold on!".to_string())
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub struct Rig {
    pub engine: Arc<Engine>,
    pub board: Board,
    pub probe_bus: Arc<SimProbeBus>,
    pub outputs: Arc<GpioBank>,
    pub clock: Arc<SimClock>,
    pub annunciator: Arc<RecordingAnnunciator>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub platform: Arc<RecordingPlatform>,
}

impl Rig {
    /// Fresh engine over a simulated board. One probe at 20 °C is
    /// already attached and detected; the clock starts at a fixed
    /// epoch so times are predictable.
    pub fn new() -> Self {
        Self::with_probe(0xAA01, 20.0)
    }

    pub fn with_probe(probe_id: u64, temperature_c: f32) -> Self {
        let probe_bus = Arc::new(SimProbeBus::new());
        probe_bus.attach(probe_id, temperature_c);

        let outputs = Arc::new(GpioBank::new());
        let clock = Arc::new(SimClock::new(1_700_000_000));
        let annunciator = Arc::new(RecordingAnnunciator::default());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let platform = Arc::new(RecordingPlatform::default());
        let storage = Arc::new(NvsStore::new().expect("in-memory store"));

        let board = Board {
            clock: clock.clone(),
            probe_bus: probe_bus.clone(),
            outputs: outputs.clone(),
            storage,
            telemetry: telemetry.clone(),
            annunciator: annunciator.clone(),
            platform: platform.clone(),
        };

        let engine = Arc::new(Engine::with_drain_delay(Duration::ZERO));
        Self {
            engine,
            board,
            probe_bus,
            outputs,
            clock,
            annunciator,
            telemetry,
            platform,
        }
    }

    /// Load persisted defaults, reset output pins and detect probes,
    /// but do not start the long-lived read loop (tests drive cycles
    /// by hand).
    pub fn bring_up(&self) {
        brewctl::persist::load_all(&self.engine, self.board.storage.as_ref());
        self.engine.configure_outputs(&self.board);
        self.engine.detect_probes(self.board.probe_bus.as_ref());
    }

    /// One sensor read cycle at the current simulated time.
    pub fn read_cycle(&self, log_cycle: &mut u32) {
        self.engine.read_cycle(
            self.board.probe_bus.as_ref(),
            self.board.telemetry.as_ref(),
            self.clock.now(),
            log_cycle,
        );
    }

    pub fn dispatch(&self, payload: &str) -> serde_json::Value {
        let reply = brewctl::api::dispatch(&self.engine, &self.board, payload);
        serde_json::from_str(&reply).expect("reply is JSON")
    }
}
