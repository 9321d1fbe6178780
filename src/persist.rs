//! Persistence glue against the external key/value store.
//!
//! Scalar settings live under short typed keys (the store caps keys
//! at 15 characters); entity lists are MessagePack-encoded arrays of
//! their JSON shapes under blob keys. Gains are stored ×10 as u16 —
//! the store has no float support and one decimal is plenty.
//!
//! Loads never fail the bring-up: a missing or corrupted value falls
//! back to the compiled-in default (seeding factory schedules and
//! heaters on first boot).

use std::collections::BTreeMap;

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::app::StoragePort;
use crate::config::{PidSettings, SystemSettings, TemperatureScale};
use crate::engine::Engine;
use crate::error::StorageError;
use crate::model::schedule::{compute_all_notification_times, default_schedules};
use crate::model::{heater, Heater, MashSchedule, Probe};

// ── Keys ──────────────────────────────────────────────────────

pub const KEY_ONEWIRE_PIN: &str = "onewirePin";
pub const KEY_STIR_PIN: &str = "stirPin";
pub const KEY_BUZZER_PIN: &str = "buzzerPin";
pub const KEY_BUZZER_TIME: &str = "buzzerTime";
pub const KEY_SPEAKER1_PIN: &str = "speaker1Pin";
pub const KEY_SPEAKER2_PIN: &str = "speaker2Pin";
pub const KEY_INVERT_OUTPUTS: &str = "invertOutputs";
pub const KEY_MQTT_URI: &str = "mqttUri";
pub const KEY_TEMP_SCALE: &str = "tempScale";
pub const KEY_SCHEDULES: &str = "mashschedules";
pub const KEY_HEATERS: &str = "heaters";
pub const KEY_SENSORS: &str = "tempsensors";
pub const KEY_KP: &str = "kP";
pub const KEY_KI: &str = "kI";
pub const KEY_KD: &str = "kD";
pub const KEY_BOIL_KP: &str = "boilkP";
pub const KEY_BOIL_KI: &str = "boilkI";
pub const KEY_BOIL_KD: &str = "boilkD";
pub const KEY_PID_LOOP_TIME: &str = "pidLoopTime";
pub const KEY_STEP_INTERVAL: &str = "stepInterval";
pub const KEY_BOOST_UNTIL: &str = "boostModeUntil";
pub const KEY_HEATER_LIMIT: &str = "heaterLimit";
pub const KEY_HEATER_CYCLES: &str = "heaterCycles";
pub const KEY_RELAY_GUARD: &str = "relayGuard";

/// Factory heater pins used when seeding.
const DEFAULT_HEATER_PINS: (u8, u8) = (32, 33);

// ── Typed scalar helpers ──────────────────────────────────────

pub fn read_u8(storage: &dyn StoragePort, key: &str, default: u8) -> u8 {
    match storage.read_blob(key) {
        Ok(bytes) if bytes.len() == 1 => bytes[0],
        Ok(_) | Err(StorageError::NotFound) => default,
        Err(e) => {
            warn!("read {key}: {e}, using default");
            default
        }
    }
}

pub fn write_u8(storage: &dyn StoragePort, key: &str, value: u8) -> Result<(), StorageError> {
    storage.write_blob(key, &[value])
}

pub fn read_u16(storage: &dyn StoragePort, key: &str, default: u16) -> u16 {
    match storage.read_blob(key) {
        Ok(bytes) if bytes.len() == 2 => u16::from_le_bytes([bytes[0], bytes[1]]),
        Ok(_) | Err(StorageError::NotFound) => default,
        Err(e) => {
            warn!("read {key}: {e}, using default");
            default
        }
    }
}

pub fn write_u16(storage: &dyn StoragePort, key: &str, value: u16) -> Result<(), StorageError> {
    storage.write_blob(key, &value.to_le_bytes())
}

pub fn read_bool(storage: &dyn StoragePort, key: &str, default: bool) -> bool {
    read_u8(storage, key, u8::from(default)) != 0
}

pub fn write_bool(storage: &dyn StoragePort, key: &str, value: bool) -> Result<(), StorageError> {
    write_u8(storage, key, u8::from(value))
}

pub fn read_string(storage: &dyn StoragePort, key: &str, default: &str) -> String {
    match storage.read_blob(key) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| default.to_string()),
        Err(_) => default.to_string(),
    }
}

pub fn write_string(storage: &dyn StoragePort, key: &str, value: &str) -> Result<(), StorageError> {
    storage.write_blob(key, value.as_bytes())
}

// ── Blob helpers ──────────────────────────────────────────────

fn read_entities<T: DeserializeOwned>(storage: &dyn StoragePort, key: &str) -> Vec<T> {
    match storage.read_blob(key) {
        Ok(bytes) => match rmp_serde::from_slice(&bytes) {
            Ok(entities) => entities,
            Err(e) => {
                warn!("stored {key} blob corrupted ({e}), using defaults");
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

fn write_entities<T: Serialize>(
    storage: &dyn StoragePort,
    key: &str,
    entities: &[T],
) -> Result<(), StorageError> {
    let serialized = rmp_serde::to_vec_named(entities).map_err(|_| StorageError::IoError)?;
    storage.write_blob(key, &serialized)?;
    info!("saved {key}, {} bytes", serialized.len());
    Ok(())
}

// ── Section loads/saves ───────────────────────────────────────

pub fn load_system_settings(storage: &dyn StoragePort) -> SystemSettings {
    let defaults = SystemSettings::default();
    SystemSettings {
        onewire_pin: read_u8(storage, KEY_ONEWIRE_PIN, defaults.onewire_pin),
        stir_pin: read_u8(storage, KEY_STIR_PIN, defaults.stir_pin),
        buzzer_pin: read_u8(storage, KEY_BUZZER_PIN, defaults.buzzer_pin),
        buzzer_time: read_u8(storage, KEY_BUZZER_TIME, defaults.buzzer_time),
        speaker1_pin: read_u8(storage, KEY_SPEAKER1_PIN, defaults.speaker1_pin),
        speaker2_pin: read_u8(storage, KEY_SPEAKER2_PIN, defaults.speaker2_pin),
        invert_outputs: read_bool(storage, KEY_INVERT_OUTPUTS, defaults.invert_outputs),
        mqtt_uri: read_string(storage, KEY_MQTT_URI, &defaults.mqtt_uri),
        temperature_scale: TemperatureScale::from_u8(read_u8(
            storage,
            KEY_TEMP_SCALE,
            defaults.temperature_scale.as_u8(),
        )),
    }
}

pub fn save_system_settings(
    storage: &dyn StoragePort,
    settings: &SystemSettings,
) -> Result<(), StorageError> {
    write_u8(storage, KEY_ONEWIRE_PIN, settings.onewire_pin)?;
    write_u8(storage, KEY_STIR_PIN, settings.stir_pin)?;
    write_u8(storage, KEY_BUZZER_PIN, settings.buzzer_pin)?;
    write_u8(storage, KEY_BUZZER_TIME, settings.buzzer_time)?;
    write_u8(storage, KEY_SPEAKER1_PIN, settings.speaker1_pin)?;
    write_u8(storage, KEY_SPEAKER2_PIN, settings.speaker2_pin)?;
    write_bool(storage, KEY_INVERT_OUTPUTS, settings.invert_outputs)?;
    write_string(storage, KEY_MQTT_URI, &settings.mqtt_uri)?;
    write_u8(storage, KEY_TEMP_SCALE, settings.temperature_scale.as_u8())
}

fn gain_to_store(gain: f32) -> u16 {
    (gain * 10.0) as u16
}

fn gain_from_store(raw: u16) -> f32 {
    f32::from(raw) / 10.0
}

pub fn load_pid_settings(storage: &dyn StoragePort) -> PidSettings {
    let defaults = PidSettings::default();
    PidSettings {
        mash_kp: gain_from_store(read_u16(storage, KEY_KP, gain_to_store(defaults.mash_kp))),
        mash_ki: gain_from_store(read_u16(storage, KEY_KI, gain_to_store(defaults.mash_ki))),
        mash_kd: gain_from_store(read_u16(storage, KEY_KD, gain_to_store(defaults.mash_kd))),
        boil_kp: gain_from_store(read_u16(
            storage,
            KEY_BOIL_KP,
            gain_to_store(defaults.boil_kp),
        )),
        boil_ki: gain_from_store(read_u16(
            storage,
            KEY_BOIL_KI,
            gain_to_store(defaults.boil_ki),
        )),
        boil_kd: gain_from_store(read_u16(
            storage,
            KEY_BOIL_KD,
            gain_to_store(defaults.boil_kd),
        )),
        pid_loop_time: read_u16(storage, KEY_PID_LOOP_TIME, defaults.pid_loop_time),
        step_interval: read_u16(storage, KEY_STEP_INTERVAL, defaults.step_interval),
        boost_mode_until: read_u8(storage, KEY_BOOST_UNTIL, defaults.boost_mode_until),
        heater_limit: read_u8(storage, KEY_HEATER_LIMIT, defaults.heater_limit),
        heater_cycles: read_u8(storage, KEY_HEATER_CYCLES, defaults.heater_cycles),
        relay_guard: read_u8(storage, KEY_RELAY_GUARD, defaults.relay_guard),
    }
}

pub fn save_pid_settings(
    storage: &dyn StoragePort,
    settings: &PidSettings,
) -> Result<(), StorageError> {
    write_u16(storage, KEY_KP, gain_to_store(settings.mash_kp))?;
    write_u16(storage, KEY_KI, gain_to_store(settings.mash_ki))?;
    write_u16(storage, KEY_KD, gain_to_store(settings.mash_kd))?;
    write_u16(storage, KEY_BOIL_KP, gain_to_store(settings.boil_kp))?;
    write_u16(storage, KEY_BOIL_KI, gain_to_store(settings.boil_ki))?;
    write_u16(storage, KEY_BOIL_KD, gain_to_store(settings.boil_kd))?;
    write_u16(storage, KEY_PID_LOOP_TIME, settings.pid_loop_time)?;
    write_u16(storage, KEY_STEP_INTERVAL, settings.step_interval)?;
    write_u8(storage, KEY_BOOST_UNTIL, settings.boost_mode_until)?;
    write_u8(storage, KEY_HEATER_LIMIT, settings.heater_limit)?;
    write_u8(storage, KEY_HEATER_CYCLES, settings.heater_cycles)?;
    write_u8(storage, KEY_RELAY_GUARD, settings.relay_guard)
}

pub fn load_schedules(
    storage: &dyn StoragePort,
    scale: TemperatureScale,
) -> BTreeMap<String, MashSchedule> {
    let mut loaded: Vec<MashSchedule> = read_entities(storage, KEY_SCHEDULES);

    if loaded.is_empty() {
        info!("seeding factory mash schedules");
        loaded = default_schedules(scale);
    }

    let mut schedules = BTreeMap::new();
    for mut schedule in loaded {
        schedule.sort_steps();
        schedule.sort_notifications();
        schedules.insert(schedule.name.clone(), schedule);
    }
    compute_all_notification_times(&mut schedules);
    schedules
}

pub fn save_schedules(
    storage: &dyn StoragePort,
    schedules: &BTreeMap<String, MashSchedule>,
) -> Result<(), StorageError> {
    let persistent: Vec<&MashSchedule> =
        schedules.values().filter(|s| !s.temporary).collect();
    write_entities(storage, KEY_SCHEDULES, &persistent)
}

pub fn load_heaters(storage: &dyn StoragePort) -> Vec<Heater> {
    let mut heaters: Vec<Heater> = read_entities(storage, KEY_HEATERS);
    if heaters.is_empty() {
        info!("seeding factory heaters");
        heaters = heater::default_heaters(DEFAULT_HEATER_PINS.0, DEFAULT_HEATER_PINS.1);
    }
    heater::sort_by_preference(&mut heaters);
    heaters
}

pub fn save_heaters(storage: &dyn StoragePort, heaters: &[Heater]) -> Result<(), StorageError> {
    write_entities(storage, KEY_HEATERS, heaters)
}

pub fn load_sensors(storage: &dyn StoragePort) -> BTreeMap<u64, Probe> {
    let probes: Vec<Probe> = read_entities(storage, KEY_SENSORS);
    probes.into_iter().map(|p| (p.id, p)).collect()
}

pub fn save_sensors(
    storage: &dyn StoragePort,
    sensors: &BTreeMap<u64, Probe>,
) -> Result<(), StorageError> {
    let probes: Vec<&Probe> = sensors.values().collect();
    write_entities(storage, KEY_SENSORS, &probes)
}

/// Populate a fresh engine from the store (seeding factory defaults
/// where nothing is persisted yet).
pub fn load_all(engine: &Engine, storage: &dyn StoragePort) {
    let system = load_system_settings(storage);
    let scale = system.temperature_scale;
    *engine.settings.lock().unwrap() = system;
    *engine.pid_settings.lock().unwrap() = load_pid_settings(storage);
    *engine.heaters.lock().unwrap() = load_heaters(storage);
    *engine.sensors.lock().unwrap() = load_sensors(storage);

    let schedules = load_schedules(storage, scale);
    let seeded = !storage.exists(KEY_SCHEDULES);
    *engine.schedules.lock().unwrap() = schedules;
    if seeded {
        let schedules = engine.schedules.lock().unwrap();
        if let Err(e) = save_schedules(storage, &schedules) {
            warn!("saving seeded schedules failed: {e}");
        }
    }
    info!("settings loaded");
}
