//! Task layer: one thread per control loop.
//!
//! ```text
//!  read loop ──1 s──▶ Engine::read_cycle
//!  pid loop ──1 s inner, pid_loop_time outer──▶ demand + burn flags
//!  output loop ──1 s──▶ burn flags onto GPIO
//!  control loop ──1 s (or no delay)──▶ ScheduleRunner::tick
//!  stir loop ──1 s──▶ StirState::tick onto GPIO
//! ```
//!
//! Every loop shares the single [`Engine`] by `Arc` and parks on a
//! one-second sleep at the end of its period; the tick logic itself
//! lives in the engine and `run/` modules so tests can drive it with
//! a simulated clock. Setting `run=false` ends every loop at its
//! next period; `control_run=false` ends the pid/output/control
//! loops only.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::app::Board;
use crate::config::STATUS_LED_PIN;
use crate::control::{duty, Regulator, WindowInputs};
use crate::engine::Engine;
use crate::run::ScheduleRunner;

const PERIOD: Duration = Duration::from_secs(1);

// ───────────────────────────────────────────────────────────────
// Sensor read loop (lives for the whole process)
// ───────────────────────────────────────────────────────────────

pub fn spawn_read_loop(engine: &Arc<Engine>, board: &Board) {
    let engine = Arc::clone(engine);
    let board = board.clone();
    thread::Builder::new()
        .name("readloop".to_string())
        .spawn(move || {
            let mut log_cycle = 0u32;
            while engine.is_running() {
                thread::sleep(PERIOD);
                engine.read_cycle(
                    board.probe_bus.as_ref(),
                    board.telemetry.as_ref(),
                    board.clock.now(),
                    &mut log_cycle,
                );
            }
            info!("read loop ended");
        })
        .map_err(|e| log::error!("failed to spawn readloop: {e}"))
        .ok();
}

// ───────────────────────────────────────────────────────────────
// PID + duty loop (per run)
// ───────────────────────────────────────────────────────────────

pub fn spawn_pid_loop(engine: &Arc<Engine>, _board: &Board) {
    let engine = Arc::clone(engine);
    thread::Builder::new()
        .name("pidloop".to_string())
        .spawn(move || pid_loop(&engine))
        .map_err(|e| log::error!("failed to spawn pidloop: {e}"))
        .ok();
}

fn pid_loop(engine: &Arc<Engine>) {
    let boil = engine.boil_run();
    let mut regulator = {
        let settings = engine.pid_settings.lock().unwrap();
        Regulator::for_run(&settings, boil)
    };

    // Wattage budget for this run, derived from the run mode.
    let total_wattage = {
        let mut heaters = engine.heaters.lock().unwrap();
        duty::select_heaters(&mut heaters, boil)
    };
    info!("pid loop started: boil={boil}, total wattage {total_wattage} W");

    while engine.is_running() && engine.control_run() && !engine.rest_run() {
        let settings = engine.pid_settings.lock().unwrap().clone();

        // One demand value governs the whole window.
        let demand = regulator.resolve(&WindowInputs {
            temperature: engine.temperature(),
            target: engine.target_temperature(),
            window_secs: f32::from(settings.pid_loop_time),
            manual_override: engine.override_output(),
            boost: engine.boost_status(),
            heater_limit: settings.heater_limit,
        });
        debug!(
            "pid output {}% target {}",
            demand.reported,
            engine.target_temperature()
        );
        engine.set_pid_output(demand.reported);
        let output = demand.applied;

        {
            let mut heaters = engine.heaters.lock().unwrap();
            duty::plan_burn_times(&mut heaters, total_wattage, output, settings.relay_guard);
        }

        // Time-slice the window at 1 Hz.
        for second in 0..settings.pid_loop_time {
            if !engine.is_running() || !engine.control_run() {
                break;
            }

            {
                let mut heaters = engine.heaters.lock().unwrap();
                for heater in heaters.iter_mut().filter(|h| h.enabled) {
                    let on = duty::slice_is_on(
                        heater.burn_time,
                        settings.pid_loop_time,
                        settings.heater_cycles,
                        second,
                    );
                    if on != heater.burn {
                        debug!("heater {}: {}", heater.name, if on { "on" } else { "off" });
                    }
                    heater.burn = on;
                    if on {
                        engine.add_power_usage(u64::from(heater.watt));
                    }
                }
            }

            if engine.take_pid_reset() {
                info!("pid timer reset");
                regulator.reset();
                break;
            }
            thread::sleep(PERIOD);
        }
    }

    // Drop demand so the output mirror drives everything off during
    // the rest phase and after the run.
    engine.set_pid_output(0);
    let mut heaters = engine.heaters.lock().unwrap();
    for heater in heaters.iter_mut() {
        heater.burn_time = 0;
        heater.burn = false;
    }
    info!("pid loop ended");
}

// ───────────────────────────────────────────────────────────────
// Output mirror loop (per run)
// ───────────────────────────────────────────────────────────────

pub fn spawn_output_loop(engine: &Arc<Engine>, board: &Board) {
    let engine = Arc::clone(engine);
    let board = board.clone();
    thread::Builder::new()
        .name("outputloop".to_string())
        .spawn(move || output_loop(&engine, &board))
        .map_err(|e| log::error!("failed to spawn outputloop: {e}"))
        .ok();
}

fn output_loop(engine: &Arc<Engine>, board: &Board) {
    let (high, low) = {
        let settings = engine.settings.lock().unwrap();
        (settings.gpio_high(), settings.gpio_low())
    };

    let all_off = |engine: &Engine| {
        let heaters = engine.heaters.lock().unwrap();
        for heater in heaters.iter() {
            board.outputs.write(heater.pin_nr, low);
        }
        board.outputs.write(STATUS_LED_PIN, false);
    };

    all_off(engine);

    while engine.is_running() && engine.control_run() {
        thread::sleep(PERIOD);

        let mut any_burning = false;
        {
            let heaters = engine.heaters.lock().unwrap();
            for heater in heaters.iter() {
                let level = if heater.burn { high } else { low };
                board.outputs.write(heater.pin_nr, level);
                any_burning |= heater.burn;
            }
        }
        board.outputs.write(STATUS_LED_PIN, any_burning);
    }

    all_off(engine);
    info!("output loop ended");
}

// ───────────────────────────────────────────────────────────────
// Schedule runner loop (per run)
// ───────────────────────────────────────────────────────────────

pub fn spawn_control_loop(engine: &Arc<Engine>, board: &Board) {
    let engine = Arc::clone(engine);
    let board = board.clone();
    thread::Builder::new()
        .name("controlloop".to_string())
        .spawn(move || control_loop(&engine, &board))
        .map_err(|e| log::error!("failed to spawn controlloop: {e}"))
        .ok();
}

fn control_loop(engine: &Arc<Engine>, board: &Board) {
    let mut runner = ScheduleRunner::new();
    engine.set_rest_run(false);
    engine.set_in_over_time(false);
    // First approximation; exact for a zero-length first step.
    engine.set_target_temperature(engine.temperature());

    while engine.is_running() && engine.control_run() {
        let outcome = runner.tick(
            engine,
            board.annunciator.as_ref(),
            board.telemetry.as_ref(),
            board.clock.now(),
        );
        if outcome.finished {
            break;
        }
        if !outcome.no_delay {
            thread::sleep(PERIOD);
        }
    }
    info!("control loop ended");
}

// ───────────────────────────────────────────────────────────────
// Stir loop (independent of runs)
// ───────────────────────────────────────────────────────────────

pub fn spawn_stir_loop(engine: &Arc<Engine>, board: &Board) {
    let engine = Arc::clone(engine);
    let board = board.clone();
    thread::Builder::new()
        .name("stirloop".to_string())
        .spawn(move || stir_loop(&engine, &board))
        .map_err(|e| log::error!("failed to spawn stirloop: {e}"))
        .ok();
}

fn stir_loop(engine: &Arc<Engine>, board: &Board) {
    let (pin, high, low) = {
        let settings = engine.settings.lock().unwrap();
        (settings.stir_pin, settings.gpio_high(), settings.gpio_low())
    };

    while engine.is_running() && engine.stir_run() {
        let on = engine.stir.lock().unwrap().tick(board.clock.now());
        board.outputs.write(pin, if on { high } else { low });
        thread::sleep(PERIOD);
    }

    board.outputs.write(pin, low);
    info!("stir loop ended");
}
