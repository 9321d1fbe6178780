//! Command dispatcher.
//!
//! The external request handler (HTTP, test harness, …) feeds framed
//! JSON commands `{"command": ..., "data": ...}` into [`dispatch`]
//! and gets `{"data": ..., "success": ..., "message"?}` back. Every
//! failure is a `success=false` reply with a human message — the
//! loops keep running regardless of what the channel sends.

use std::sync::Arc;

use log::{debug, warn};
use serde_json::{json, Value};

use crate::app::Board;
use crate::config::{validate_pid_settings, PidSettings, SystemSettings, TemperatureScale, MAX_HEATERS};
use crate::engine::{Engine, STATUS_IDLE, STATUS_RUNNING};
use crate::error::CommandError;
use crate::model::schedule::compute_all_notification_times;
use crate::model::{heater, Heater, MashSchedule};
use crate::persist;
use crate::run::temp_log::EpochSecs;
use crate::tasks;

/// A successful command reply: payload plus an optional user message.
struct Reply {
    data: Value,
    message: Option<String>,
}

impl Reply {
    fn data(data: Value) -> Self {
        Self {
            data,
            message: None,
        }
    }

    fn empty() -> Self {
        Self::data(json!({}))
    }

    fn message(text: &str) -> Self {
        Self {
            data: json!({}),
            message: Some(text.to_string()),
        }
    }
}

/// Handle one framed command and render the reply envelope.
pub fn dispatch(engine: &Arc<Engine>, board: &Board, payload: &str) -> String {
    debug!("command payload: {payload}");

    let result = match serde_json::from_str::<Value>(payload) {
        Ok(frame) => {
            let command = frame["command"].as_str().unwrap_or_default().to_string();
            if command.is_empty() {
                Err(CommandError::MissingField("command"))
            } else {
                let data = frame.get("data").cloned().unwrap_or(Value::Null);
                handle(engine, board, &command, data)
            }
        }
        Err(_) => Err(CommandError::WrongType("Invalid JSON request")),
    };

    let envelope = match result {
        Ok(reply) => {
            let mut envelope = json!({ "data": reply.data, "success": true });
            if let Some(message) = reply.message {
                envelope["message"] = json!(message);
            }
            envelope
        }
        Err(error) => {
            warn!("command failed: {error}");
            json!({ "data": {}, "success": false, "message": error.to_string() })
        }
    };

    envelope.to_string()
}

fn handle(
    engine: &Arc<Engine>,
    board: &Board,
    command: &str,
    data: Value,
) -> Result<Reply, CommandError> {
    match command {
        "Data" => telemetry_snapshot(engine, board, &data),
        "GetRunningSchedule" => running_schedule(engine),
        "SetTemp" => set_temp(engine, &data),
        "SetOverrideOutput" => set_override_output(engine, &data),
        "Start" => start(engine, board, &data),
        "Stop" => {
            engine.stop();
            Ok(Reply::empty())
        }
        "StartStir" => start_stir(engine, board, &data),
        "StopStir" => stop_stir(engine, board),
        "GetMashSchedules" => get_schedules(engine),
        "SaveMashSchedule" => save_schedule(engine, board, data, false),
        "SetMashSchedule" => save_schedule(engine, board, data, true),
        "DeleteMashSchedule" => delete_schedule(engine, board, &data),
        "GetPIDSettings" => {
            let settings = engine.pid_settings.lock().unwrap().clone();
            Ok(Reply::data(to_value(&settings)?))
        }
        "SavePIDSettings" => save_pid_settings(engine, board, data),
        "GetTempSettings" => get_temp_settings(engine),
        "SaveTempSettings" => save_temp_settings(engine, board, &data),
        "DetectTempSensors" => {
            engine.detect_probes(board.probe_bus.as_ref());
            Ok(Reply::empty())
        }
        "GetHeaterSettings" => {
            let heaters = engine.heaters.lock().unwrap().clone();
            Ok(Reply::data(to_value(&heaters)?))
        }
        "SaveHeaterSettings" => save_heater_settings(engine, board, &data),
        "GetSystemSettings" => {
            let settings = engine.settings.lock().unwrap().clone();
            Ok(Reply::data(to_value(&settings)?))
        }
        "SaveSystemSettings" => save_system_settings(engine, board, &data),
        "Reboot" => {
            board.platform.reboot();
            Ok(Reply::empty())
        }
        "FactoryReset" => {
            board.storage.erase_all()?;
            board.platform.reboot();
            Ok(Reply::message(
                "Device will restart shortly, reconnect to factory wifi settings to continue!",
            ))
        }
        "BootIntoRecovery" => match board.platform.boot_into_recovery() {
            Ok(message) => {
                board.platform.reboot();
                Ok(Reply::message(&message))
            }
            Err(message) => Err(CommandError::Platform(message)),
        },
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

// ───────────────────────────────────────────────────────────────
// Telemetry
// ───────────────────────────────────────────────────────────────

/// Round toward zero to one decimal for display.
fn tenths(value: f32) -> f64 {
    f64::from((value * 10.0) as i64 as i32) / 10.0
}

fn telemetry_snapshot(
    engine: &Arc<Engine>,
    board: &Board,
    data: &Value,
) -> Result<Reply, CommandError> {
    let now = board.clock.now();

    let (last_log_date_time, temp_log_json) = {
        let log = engine.temp_log.lock().unwrap();
        let cursor: Option<EpochSecs> = if data["lastDate"].is_number() {
            data["lastDate"].as_i64()
        } else {
            None
        };
        let entries: Vec<Value> = log
            .delta_since(cursor)
            .into_iter()
            .map(|(time, temp)| json!({ "time": time, "temp": temp }))
            .collect();
        (log.last_time().unwrap_or(now), Value::Array(entries))
    };

    let temps: Vec<Value> = engine
        .current_temperatures
        .lock()
        .unwrap()
        .iter()
        .map(|(id, temp)| json!({ "sensor": id.to_string(), "temp": tenths(*temp) }))
        .collect();

    let mut reply = json!({
        "temp": tenths(engine.temperature()),
        "temps": temps,
        "targetTemp": tenths(engine.target_temperature()),
        "manualOverrideTargetTemp": Value::Null,
        "output": engine.pid_output(),
        "manualOverrideOutput": Value::Null,
        "status": engine.status_text(),
        "stirStatus": engine.stir_status_text(),
        "lastLogDateTime": last_log_date_time,
        "tempLog": temp_log_json,
        "runningVersion": engine.running_version(),
        "inOverTime": engine.in_over_time(),
        "boostStatus": engine.boost_status().as_u8(),
        "powerUsage": engine.power_usage_wh(),
    });

    if let Some(output) = engine.override_output() {
        reply["manualOverrideOutput"] = json!(output);
    }
    if let Some(target) = engine.override_target() {
        reply["manualOverrideTargetTemp"] = json!(target);
    }

    Ok(Reply::data(reply))
}

fn running_schedule(engine: &Arc<Engine>) -> Result<Reply, CommandError> {
    let plan = engine.plan.lock().unwrap();
    Ok(Reply::data(json!({
        "version": engine.running_version(),
        "steps": to_value(&plan.steps)?,
        "notifications": to_value(&plan.notifications)?,
    })))
}

// ───────────────────────────────────────────────────────────────
// Targets and overrides
// ───────────────────────────────────────────────────────────────

fn set_temp(engine: &Arc<Engine>, data: &Value) -> Result<Reply, CommandError> {
    let free_running = engine.selected_schedule.lock().unwrap().is_none();
    let target = &data["targetTemp"];

    if target.is_null() {
        engine.set_override_target(None);
        if free_running {
            engine.set_target_temperature(0.0);
        }
        Ok(Reply::empty())
    } else if let Some(value) = target.as_f64() {
        engine.set_override_target(Some(value as f32));
        if free_running {
            engine.set_target_temperature(value as f32);
        }
        Ok(Reply::empty())
    } else {
        engine.set_override_target(None);
        Err(CommandError::WrongType(
            "Incorrect data, integer or float expected!",
        ))
    }
}

fn set_override_output(engine: &Arc<Engine>, data: &Value) -> Result<Reply, CommandError> {
    match data["output"].as_f64() {
        Some(value) => engine.set_override_output(Some((value as i64).clamp(0, 100) as u8)),
        None => engine.set_override_output(None),
    }
    // Reset so the effect is immediate.
    engine.request_pid_reset();
    Ok(Reply::empty())
}

// ───────────────────────────────────────────────────────────────
// Run control
// ───────────────────────────────────────────────────────────────

fn start(engine: &Arc<Engine>, board: &Board, data: &Value) -> Result<Reply, CommandError> {
    {
        let mut selected = engine.selected_schedule.lock().unwrap();
        *selected = data["selectedMashSchedule"]
            .as_str()
            .map(|name| name.to_string());
    }
    Engine::start(engine, board);
    Ok(Reply::empty())
}

fn start_stir(engine: &Arc<Engine>, board: &Board, data: &Value) -> Result<Reply, CommandError> {
    if engine.settings.lock().unwrap().stir_pin == 0 {
        warn!("stir pin is not configured, ignoring StartStir");
        return Ok(Reply::empty());
    }

    {
        let mut stir = engine.stir.lock().unwrap();
        stir.start_cycle = board.clock.now();
        if let Some(max) = data["max"].as_i64() {
            stir.time_span_min = max;
        }
        if let Some(start) = data["intervalStart"].as_i64() {
            stir.interval_start_min = start;
        }
        if let Some(stop) = data["intervalStop"].as_i64() {
            stir.interval_stop_min = stop;
        }
    }

    engine.set_stir_run(true);
    tasks::spawn_stir_loop(engine, board);
    engine.set_stir_status_text(STATUS_RUNNING);
    Ok(Reply::empty())
}

fn stop_stir(engine: &Arc<Engine>, board: &Board) -> Result<Reply, CommandError> {
    let settings = engine.settings.lock().unwrap().clone();
    if settings.stir_pin == 0 {
        warn!("stir pin is not configured, ignoring StopStir");
        return Ok(Reply::empty());
    }

    engine.set_stir_run(false);
    // Stop at once rather than waiting out the loop period.
    board.outputs.write(settings.stir_pin, settings.gpio_low());
    engine.set_stir_status_text(STATUS_IDLE);
    Ok(Reply::empty())
}

// ───────────────────────────────────────────────────────────────
// Schedule CRUD
// ───────────────────────────────────────────────────────────────

fn get_schedules(engine: &Arc<Engine>) -> Result<Reply, CommandError> {
    let schedules = engine.schedules.lock().unwrap();
    let all: Vec<&MashSchedule> = schedules.values().collect();
    Ok(Reply::data(to_value(&all)?))
}

fn save_schedule(
    engine: &Arc<Engine>,
    board: &Board,
    data: Value,
    temporary: bool,
) -> Result<Reply, CommandError> {
    let mut schedule: MashSchedule = serde_json::from_value(data)
        .map_err(|_| CommandError::WrongType("Invalid schedule payload"))?;
    schedule.sort_steps();
    schedule.sort_notifications();
    schedule.temporary = temporary;

    {
        let mut schedules = engine.schedules.lock().unwrap();
        schedules.insert(schedule.name.clone(), schedule);
        if !temporary {
            persist::save_schedules(board.storage.as_ref(), &schedules)?;
        }
        compute_all_notification_times(&mut schedules);
    }
    Ok(Reply::empty())
}

fn delete_schedule(
    engine: &Arc<Engine>,
    board: &Board,
    data: &Value,
) -> Result<Reply, CommandError> {
    let name = data["name"]
        .as_str()
        .ok_or(CommandError::MissingField("name"))?;

    let mut schedules = engine.schedules.lock().unwrap();
    if schedules.remove(name).is_none() {
        return Err(CommandError::NotFound(format!(
            "Schedule with name: {name} not found"
        )));
    }
    persist::save_schedules(board.storage.as_ref(), &schedules)?;
    Ok(Reply::empty())
}

// ───────────────────────────────────────────────────────────────
// PID settings
// ───────────────────────────────────────────────────────────────

fn save_pid_settings(
    engine: &Arc<Engine>,
    board: &Board,
    data: Value,
) -> Result<Reply, CommandError> {
    let settings: PidSettings = serde_json::from_value(data)
        .map_err(|_| CommandError::WrongType("Invalid PID settings payload"))?;
    validate_pid_settings(&settings).map_err(CommandError::WrongType)?;

    persist::save_pid_settings(board.storage.as_ref(), &settings)?;
    // Takes effect at the top of the next PID window.
    *engine.pid_settings.lock().unwrap() = settings;
    Ok(Reply::empty())
}

// ───────────────────────────────────────────────────────────────
// Probe settings
// ───────────────────────────────────────────────────────────────

fn get_temp_settings(engine: &Arc<Engine>) -> Result<Reply, CommandError> {
    let sensors = engine.sensors.lock().unwrap();
    let all: Vec<_> = sensors.values().collect();
    Ok(Reply::data(to_value(&all)?))
}

fn save_temp_settings(
    engine: &Arc<Engine>,
    board: &Board,
    data: &Value,
) -> Result<Reply, CommandError> {
    let entries = data
        .as_array()
        .ok_or(CommandError::WrongType("Temp settings must be an array!"))?;

    engine.with_sensor_fence(|engine| {
        let mut sensors = engine.sensors.lock().unwrap();
        let mut current = engine.current_temperatures.lock().unwrap();

        for entry in entries {
            let Some(id) = entry["id"].as_str().and_then(|s| s.parse::<u64>().ok()) else {
                continue;
            };
            let Some(probe) = sensors.get_mut(&id) else {
                // Doesn't exist anymore, just ignore.
                continue;
            };

            if let Some(name) = entry["name"].as_str() {
                probe.name = name.to_string();
            }
            if let Some(color) = entry["color"].as_str() {
                probe.color = color.to_string();
            }
            if let Some(use_for_control) = entry["useForControl"].as_bool() {
                probe.use_for_control = use_for_control;
            }
            if let Some(show) = entry["show"].as_bool() {
                probe.show = show;
                if !show {
                    current.remove(&id);
                }
            }
            if let Some(bias) = entry["compensateAbsolute"].as_f64() {
                probe.compensate_absolute = bias as f32;
            }
            if let Some(gain) = entry["compensateRelative"].as_f64() {
                probe.compensate_relative = gain as f32;
            }
        }

        // Drop probes that are no longer in the submitted list.
        let submitted: Vec<u64> = entries
            .iter()
            .filter_map(|e| e["id"].as_str().and_then(|s| s.parse().ok()))
            .collect();
        sensors.retain(|id, _| {
            let keep = submitted.contains(id);
            if !keep {
                current.remove(id);
            }
            keep
        });

        persist::save_sensors(board.storage.as_ref(), &sensors)
    })?;

    Ok(Reply::empty())
}

// ───────────────────────────────────────────────────────────────
// Heater settings
// ───────────────────────────────────────────────────────────────

fn save_heater_settings(
    engine: &Arc<Engine>,
    board: &Board,
    data: &Value,
) -> Result<Reply, CommandError> {
    if engine.control_run() {
        return Err(CommandError::Busy(
            "You cannot save heater settings while running!",
        ));
    }
    let entries = data
        .as_array()
        .ok_or(CommandError::WrongType("Heater settings must be an array!"))?;

    // Let in-flight loop iterations finish before touching the list.
    engine.drain_pause();

    let mut heaters = Vec::new();
    for (position, entry) in entries.iter().enumerate() {
        if position >= MAX_HEATERS {
            warn!("only {MAX_HEATERS} heaters supported");
            break;
        }
        let mut heater: Heater = serde_json::from_value(entry.clone())
            .map_err(|_| CommandError::WrongType("Invalid heater payload"))?;
        heater.id = position as u8 + 1;
        heaters.push(heater);
    }
    heater::sort_by_preference(&mut heaters);

    persist::save_heaters(board.storage.as_ref(), &heaters)?;
    *engine.heaters.lock().unwrap() = heaters;
    engine.configure_heater_outputs(board);
    Ok(Reply::empty())
}

// ───────────────────────────────────────────────────────────────
// System settings
// ───────────────────────────────────────────────────────────────

fn save_system_settings(
    engine: &Arc<Engine>,
    board: &Board,
    data: &Value,
) -> Result<Reply, CommandError> {
    {
        let mut settings = engine.settings.lock().unwrap();
        merge_system_settings(&mut settings, data);
        persist::save_system_settings(board.storage.as_ref(), &settings)?;
    }
    Ok(Reply::message("Please restart device for changes to have effect!"))
}

fn merge_system_settings(settings: &mut SystemSettings, data: &Value) {
    if let Some(pin) = data["onewirePin"].as_u64() {
        settings.onewire_pin = pin as u8;
    }
    if let Some(pin) = data["stirPin"].as_u64() {
        settings.stir_pin = pin as u8;
    }
    if let Some(pin) = data["buzzerPin"].as_u64() {
        settings.buzzer_pin = pin as u8;
    }
    if let Some(time) = data["buzzerTime"].as_u64() {
        settings.buzzer_time = time as u8;
    }
    if let Some(invert) = data["invertOutputs"].as_bool() {
        settings.invert_outputs = invert;
    }
    if let Some(uri) = data["mqttUri"].as_str() {
        settings.mqtt_uri = uri.to_string();
    }
    if let Some(scale) = data["temperatureScale"].as_u64() {
        settings.temperature_scale = TemperatureScale::from_u8(scale as u8);
    }
    if let Some(pin) = data["speaker1Pin"].as_u64() {
        settings.speaker1_pin = pin as u8;
    }
    if let Some(pin) = data["speaker2Pin"].as_u64() {
        settings.speaker2_pin = pin as u8;
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|_| CommandError::WrongType("Serialization failed"))
}
