//! The brewing engine — the one owning instance of all shared state.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        Engine (Arc-shared)                    │
//! │                                                               │
//! │  read loop ──▶ temperature, probe map, temp log               │
//! │  pid loop  ──▶ demand %, burn times, burn flags, power usage  │
//! │  output    ──▶ GPIO mirror of burn flags                      │
//! │  runner    ──▶ target temperature, boost, overtime, steps     │
//! │  dispatcher ─▶ configuration, overrides, start/stop           │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Hot scalars are word-sized atomics; containers sit behind a mutex
//! each and are only mutated under the phase fences described on the
//! individual methods. The only place two locks nest is the sensor
//! path, which always takes `sensors` before `current_temperatures`,
//! so deadlock is structurally impossible.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info, warn};

use crate::app::{Board, ProbeBus, TelemetrySample, TelemetrySink};
use crate::config::{PidSettings, RunnerTuning, SystemSettings, MAX_PROBES};
use crate::error::ProbeError;
use crate::model::{Heater, MashSchedule, Probe};
use crate::run::stir::StirState;
use crate::run::temp_log::EpochSecs;
use crate::run::{BoostStatus, ExecutionPlan, TempLog};
use crate::tasks;

/// Status strings advertised on the command channel.
pub const STATUS_RUNNING: &str = "Running";
pub const STATUS_IDLE: &str = "Idle";
pub const STATUS_DISABLED: &str = "Disabled";

/// An `f32` stored as bits in an `AtomicU32`, the word-sized store
/// the loop model relies on for shared scalars.
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Optional overrides set from the command channel. Empty means "no
/// override" — no magic sentinel values.
#[derive(Debug, Default, Clone, Copy)]
struct Overrides {
    target_temperature: Option<f32>,
    output: Option<u8>,
}

pub struct Engine {
    pub tuning: RunnerTuning,

    // ── Configuration ─────────────────────────────────────────
    pub settings: Mutex<SystemSettings>,
    pub pid_settings: Mutex<PidSettings>,

    // ── Entities ──────────────────────────────────────────────
    pub schedules: Mutex<BTreeMap<String, MashSchedule>>,
    pub sensors: Mutex<BTreeMap<u64, Probe>>,
    pub heaters: Mutex<Vec<Heater>>,

    // ── Run-time containers ───────────────────────────────────
    pub plan: Mutex<ExecutionPlan>,
    pub temp_log: Mutex<TempLog>,
    pub current_temperatures: Mutex<BTreeMap<u64, f32>>,
    pub selected_schedule: Mutex<Option<String>>,
    pub stir: Mutex<StirState>,

    status_text: Mutex<String>,
    stir_status_text: Mutex<String>,
    overrides: Mutex<Overrides>,

    // ── Flags and hot scalars ─────────────────────────────────
    run: AtomicBool,
    control_run: AtomicBool,
    boil_run: AtomicBool,
    rest_run: AtomicBool,
    stir_run: AtomicBool,
    in_over_time: AtomicBool,
    skip_temp_loop: AtomicBool,
    reset_pid: AtomicBool,
    boost_status: AtomicU8,
    current_mash_step: AtomicUsize,
    running_version: AtomicU32,
    temperature: AtomicF32,
    target_temperature: AtomicF32,
    pid_output: AtomicU8,
    power_usage_ws: AtomicU64,

    /// How long mutating commands wait for the loops to drain before
    /// touching the sensor/heater containers.
    drain_delay: Duration,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_drain_delay(Duration::from_secs(2))
    }

    /// Tests pass a zero drain delay so fenced mutations are instant.
    pub fn with_drain_delay(drain_delay: Duration) -> Self {
        Self {
            tuning: RunnerTuning::default(),
            settings: Mutex::new(SystemSettings::default()),
            pid_settings: Mutex::new(PidSettings::default()),
            schedules: Mutex::new(BTreeMap::new()),
            sensors: Mutex::new(BTreeMap::new()),
            heaters: Mutex::new(Vec::new()),
            plan: Mutex::new(ExecutionPlan::default()),
            temp_log: Mutex::new(TempLog::new()),
            current_temperatures: Mutex::new(BTreeMap::new()),
            selected_schedule: Mutex::new(None),
            stir: Mutex::new(StirState::default()),
            status_text: Mutex::new(STATUS_IDLE.to_string()),
            stir_status_text: Mutex::new(STATUS_IDLE.to_string()),
            overrides: Mutex::new(Overrides::default()),
            run: AtomicBool::new(false),
            control_run: AtomicBool::new(false),
            boil_run: AtomicBool::new(false),
            rest_run: AtomicBool::new(false),
            stir_run: AtomicBool::new(false),
            in_over_time: AtomicBool::new(false),
            skip_temp_loop: AtomicBool::new(false),
            reset_pid: AtomicBool::new(false),
            boost_status: AtomicU8::new(BoostStatus::Off.as_u8()),
            current_mash_step: AtomicUsize::new(0),
            running_version: AtomicU32::new(0),
            temperature: AtomicF32::new(0.0),
            target_temperature: AtomicF32::new(0.0),
            pid_output: AtomicU8::new(0),
            power_usage_ws: AtomicU64::new(0),
            drain_delay,
        }
    }

    // ── Flag accessors ────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::Relaxed)
    }

    pub fn set_run(&self, on: bool) {
        self.run.store(on, Ordering::Relaxed);
    }

    pub fn control_run(&self) -> bool {
        self.control_run.load(Ordering::Relaxed)
    }

    pub fn boil_run(&self) -> bool {
        self.boil_run.load(Ordering::Relaxed)
    }

    pub fn rest_run(&self) -> bool {
        self.rest_run.load(Ordering::Relaxed)
    }

    pub fn set_rest_run(&self, on: bool) {
        self.rest_run.store(on, Ordering::Relaxed);
    }

    pub fn stir_run(&self) -> bool {
        self.stir_run.load(Ordering::Relaxed)
    }

    pub fn set_stir_run(&self, on: bool) {
        self.stir_run.store(on, Ordering::Relaxed);
    }

    pub fn in_over_time(&self) -> bool {
        self.in_over_time.load(Ordering::Relaxed)
    }

    pub fn set_in_over_time(&self, on: bool) {
        self.in_over_time.store(on, Ordering::Relaxed);
    }

    pub fn skip_temp_loop(&self) -> bool {
        self.skip_temp_loop.load(Ordering::Relaxed)
    }

    /// Request a PID window abort; the next pid-loop second consumes it.
    pub fn request_pid_reset(&self) {
        self.reset_pid.store(true, Ordering::Relaxed);
    }

    /// Consume a pending PID reset request.
    pub fn take_pid_reset(&self) -> bool {
        self.reset_pid.swap(false, Ordering::Relaxed)
    }

    pub fn boost_status(&self) -> BoostStatus {
        BoostStatus::from_u8(self.boost_status.load(Ordering::Relaxed))
    }

    pub fn set_boost_status(&self, status: BoostStatus) {
        self.boost_status.store(status.as_u8(), Ordering::Relaxed);
    }

    pub fn current_mash_step(&self) -> usize {
        self.current_mash_step.load(Ordering::Relaxed)
    }

    pub fn set_current_mash_step(&self, step: usize) {
        self.current_mash_step.store(step, Ordering::Relaxed);
    }

    pub fn running_version(&self) -> u32 {
        self.running_version.load(Ordering::Relaxed)
    }

    /// Advertise a plan change to polling clients.
    pub fn bump_running_version(&self) {
        self.running_version.fetch_add(1, Ordering::Relaxed);
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.load()
    }

    pub fn set_temperature(&self, value: f32) {
        self.temperature.store(value);
    }

    pub fn target_temperature(&self) -> f32 {
        self.target_temperature.load()
    }

    pub fn set_target_temperature(&self, value: f32) {
        self.target_temperature.store(value);
    }

    pub fn pid_output(&self) -> u8 {
        self.pid_output.load(Ordering::Relaxed)
    }

    pub fn set_pid_output(&self, value: u8) {
        self.pid_output.store(value, Ordering::Relaxed);
    }

    pub fn add_power_usage(&self, watt_seconds: u64) {
        self.power_usage_ws.fetch_add(watt_seconds, Ordering::Relaxed);
    }

    /// Accumulated energy in watt-hours.
    pub fn power_usage_wh(&self) -> u64 {
        self.power_usage_ws.load(Ordering::Relaxed) / 3600
    }

    // ── Overrides ─────────────────────────────────────────────

    pub fn override_target(&self) -> Option<f32> {
        self.overrides.lock().unwrap().target_temperature
    }

    pub fn set_override_target(&self, value: Option<f32>) {
        self.overrides.lock().unwrap().target_temperature = value;
    }

    pub fn override_output(&self) -> Option<u8> {
        self.overrides.lock().unwrap().output
    }

    pub fn set_override_output(&self, value: Option<u8>) {
        self.overrides.lock().unwrap().output = value;
    }

    /// Step transitions drop both overrides.
    pub fn clear_overrides(&self) {
        *self.overrides.lock().unwrap() = Overrides::default();
    }

    // ── Status text ───────────────────────────────────────────

    pub fn status_text(&self) -> String {
        self.status_text.lock().unwrap().clone()
    }

    pub fn set_status_text(&self, text: &str) {
        *self.status_text.lock().unwrap() = text.to_string();
    }

    pub fn stir_status_text(&self) -> String {
        self.stir_status_text.lock().unwrap().clone()
    }

    pub fn set_stir_status_text(&self, text: &str) {
        *self.stir_status_text.lock().unwrap() = text.to_string();
    }

    // ── Sensor cycle (C1) ─────────────────────────────────────

    /// One pass of the sensor reader: poll every connected probe,
    /// calibrate, fuse, publish, and log. Runs once per second from
    /// the read loop; yields untouched while the sensor-config fence
    /// (`skip_temp_loop`) is up.
    pub fn read_cycle(
        &self,
        bus: &dyn ProbeBus,
        telemetry: &dyn TelemetrySink,
        now: EpochSecs,
        log_cycle: &mut u32,
    ) {
        if self.skip_temp_loop.load(Ordering::Relaxed) {
            return;
        }

        let scale = self.settings.lock().unwrap().temperature_scale;
        let mut sum = 0.0f32;
        let mut control_probes = 0u32;

        {
            let mut sensors = self.sensors.lock().unwrap();
            let mut current = self.current_temperatures.lock().unwrap();

            for (&id, probe) in sensors.iter_mut() {
                if !probe.connected {
                    continue;
                }

                let raw = match bus.convert(id) {
                    Ok(raw) => raw,
                    Err(ProbeError::NoDevice) => continue,
                    Err(ProbeError::ReadFailed) => {
                        warn!("error reading probe [{id}], disabling sensor");
                        probe.connected = false;
                        probe.last_temp = None;
                        current.remove(&id);
                        continue;
                    }
                };

                let temperature = scale.from_celsius(probe.compensate(raw));

                if probe.use_for_control {
                    sum += temperature;
                    control_probes += 1;
                }
                probe.last_temp = Some(temperature);
                if probe.show {
                    current.insert(id, temperature);
                }
            }
        }

        // With no control probe the fused value is zero; configure at
        // least one probe for control before starting a run.
        let avg = if control_probes > 0 {
            sum / control_probes as f32
        } else {
            0.0
        };
        self.set_temperature(avg);

        if self.control_run() {
            *log_cycle += 1;
            if *log_cycle >= 5 {
                *log_cycle = 0;
                if self.temp_log.lock().unwrap().push(now, avg as i32) {
                    info!("logging: {}°", avg as i32);
                }
            }

            if telemetry.enabled() {
                telemetry.publish_sample(&TelemetrySample {
                    time: now,
                    temp: avg,
                    target: self.target_temperature(),
                    output: self.pid_output(),
                });
            }
        }
    }

    // ── Probe detection ───────────────────────────────────────

    /// Bus scan under the sensor fence: merge newly found probes and
    /// reconnect known ones. The read loop drains for `drain_delay`
    /// before the containers are touched.
    pub fn detect_probes(&self, bus: &dyn ProbeBus) {
        self.skip_temp_loop.store(true, Ordering::Relaxed);
        std::thread::sleep(self.drain_delay);

        let found = bus.scan();
        {
            let mut sensors = self.sensors.lock().unwrap();
            for id in found {
                if sensors.len() >= MAX_PROBES && !sensors.contains_key(&id) {
                    info!("max probe count reached, stop merging");
                    break;
                }
                match sensors.get_mut(&id) {
                    Some(probe) => {
                        info!("existing probe [{id}] reconnected");
                        probe.connected = true;
                    }
                    None => {
                        info!("new probe [{id}] detected");
                        sensors.insert(id, Probe::detected(id));
                    }
                }
            }
        }

        self.skip_temp_loop.store(false, Ordering::Relaxed);
    }

    /// Raise the sensor fence, wait for the read loop to drain, and
    /// run `mutate` against the probe containers.
    pub fn with_sensor_fence<T>(&self, mutate: impl FnOnce(&Engine) -> T) -> T {
        self.skip_temp_loop.store(true, Ordering::Relaxed);
        std::thread::sleep(self.drain_delay);
        let result = mutate(self);
        self.skip_temp_loop.store(false, Ordering::Relaxed);
        result
    }

    /// Pause long enough for in-flight loop iterations to finish.
    /// Used before heater mutation, which only happens while no run
    /// is active.
    pub fn drain_pause(&self) {
        std::thread::sleep(self.drain_delay);
    }

    // ── Bring-up ──────────────────────────────────────────────

    /// Full bring-up: load persisted state, initialise output pins,
    /// detect probes, and start the long-lived read loop. Call once.
    pub fn init(engine: &Arc<Engine>, board: &Board) {
        crate::persist::load_all(engine, board.storage.as_ref());
        engine.configure_outputs(board);
        engine.detect_probes(board.probe_bus.as_ref());
        engine.set_run(true);
        tasks::spawn_read_loop(engine, board);
        info!("engine initialised");
    }

    /// Reset every output pin to its off level. Also used after the
    /// heater list changes.
    pub fn configure_outputs(&self, board: &Board) {
        self.configure_heater_outputs(board);

        let settings = self.settings.lock().unwrap().clone();
        let low = settings.gpio_low();

        if settings.stir_pin == 0 {
            warn!("stir pin is not configured");
            self.set_stir_status_text(STATUS_DISABLED);
        } else {
            board.outputs.configure(settings.stir_pin, low);
        }

        if settings.buzzer_pin == 0 {
            warn!("buzzer pin is not configured");
        } else {
            board.outputs.configure(settings.buzzer_pin, low);
        }

        if settings.speaker1_pin == 0 || settings.speaker2_pin == 0 {
            warn!("speaker pins are not (both) configured");
        } else {
            board.outputs.configure(settings.speaker1_pin, false);
            board.outputs.configure(settings.speaker2_pin, false);
        }
    }

    /// Reset heater pins (plus the status LED) to their off level.
    pub fn configure_heater_outputs(&self, board: &Board) {
        let low = self.settings.lock().unwrap().gpio_low();
        {
            let heaters = self.heaters.lock().unwrap();
            for heater in heaters.iter() {
                info!("heater {} configured on pin {}", heater.name, heater.pin_nr);
                board.outputs.configure(heater.pin_nr, low);
            }
        }
        board.outputs.configure(crate::config::STATUS_LED_PIN, false);
    }

    // ── Run control ───────────────────────────────────────────

    /// Begin a run: compile the selected schedule (if any) and spawn
    /// the control loops. A no-op while a run is already active.
    pub fn start(engine: &Arc<Engine>, board: &Board) {
        if engine.control_run.swap(true, Ordering::Relaxed) {
            return;
        }

        engine.set_in_over_time(false);
        engine.set_boost_status(BoostStatus::Off);
        engine.set_override_target(None);
        engine.set_rest_run(false);
        engine.temp_log.lock().unwrap().clear();
        engine.plan.lock().unwrap().clear();

        let selected = engine.selected_schedule.lock().unwrap().clone();
        if let Some(name) = selected {
            engine.load_schedule(&name, board.clock.now());
            engine.set_current_mash_step(0);
            tasks::spawn_control_loop(engine, board);
        } else {
            // Free run: infer the boil flag from the target.
            let threshold = engine
                .settings
                .lock()
                .unwrap()
                .temperature_scale
                .boil_threshold();
            engine
                .boil_run
                .store(engine.target_temperature() >= threshold, Ordering::Relaxed);
        }

        tasks::spawn_pid_loop(engine, board);
        tasks::spawn_output_loop(engine, board);
        engine.set_status_text(STATUS_RUNNING);
    }

    /// Compile `name` into the execution plan. A missing schedule
    /// leaves the plan empty; the runner then terminates the run on
    /// its first tick.
    fn load_schedule(&self, name: &str, now: EpochSecs) {
        let compiled = {
            let schedules = self.schedules.lock().unwrap();
            match schedules.get(name) {
                Some(schedule) => {
                    self.boil_run.store(schedule.boil, Ordering::Relaxed);
                    Some(ExecutionPlan::compile(schedule, now, self.temperature()))
                }
                None => {
                    error!("schedule '{name}' not found");
                    None
                }
            }
        };
        if let Some(compiled) = compiled {
            for step in &compiled.steps {
                info!(
                    "step end {}: {}° boost:{} extend:{}",
                    step.time, step.temperature, step.allow_boost, step.extend_if_needed
                );
            }
            *self.plan.lock().unwrap() = compiled;
            self.bump_running_version();
        }
    }

    /// End the run. Loops observe `control_run == false` on their
    /// next cycle and exit; the output mirror forces all heaters off
    /// on its way out.
    pub fn stop(&self) {
        self.control_run.store(false, Ordering::Relaxed);
        self.set_boost_status(BoostStatus::Off);
        self.set_in_over_time(false);
        self.set_status_text(STATUS_IDLE);
    }

    /// Overtime extension: shift the current step, every later step
    /// and every pending notification by `over_time_step` seconds.
    /// Terminates the run when the plan vanished underneath us.
    pub fn extend_overtime(&self, from_step: usize) {
        info!("shifting schedule during overtime");
        let shifted = self
            .plan
            .lock()
            .unwrap()
            .shift_from(from_step, self.tuning.over_time_step);
        if !shifted {
            error!("execution steps no longer available");
            self.stop();
            return;
        }
        self.bump_running_version();
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
