//! brewctl firmware entry point.
//!
//! On ESP-IDF this wires the real adapters (NVS, GPIO, MQTT, system
//! clock) to the engine and parks; the platform HTTP server binds
//! [`brewctl::api::dispatch`] as its POST handler. On the host it
//! runs a small closed-loop simulation so the whole control core can
//! be watched without hardware.

use std::sync::Arc;

use anyhow::Result;
use log::info;

use brewctl::adapters::{GpioBank, LogTelemetry, NvsStore, PinAnnunciator, SystemClock};
use brewctl::app::Board;
use brewctl::Engine;

// ───────────────────────────────────────────────────────────────
// ESP-IDF target
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn main() -> Result<()> {
    use brewctl::adapters::mqtt::MqttTelemetry;
    use brewctl::adapters::platform::EspPlatform;
    use brewctl::adapters::UnboundProbeBus;
    use brewctl::app::TelemetrySink;
    use brewctl::persist;

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("brewctl v{} starting", env!("CARGO_PKG_VERSION"));

    let storage = Arc::new(NvsStore::new().map_err(|e| anyhow::anyhow!("NVS init: {e}"))?);
    let settings = persist::load_system_settings(storage.as_ref());

    let outputs = Arc::new(GpioBank::new());
    let telemetry: Arc<dyn TelemetrySink> =
        match MqttTelemetry::connect(&settings.mqtt_uri, "brewctl") {
            Some(mqtt) => Arc::new(mqtt),
            None => Arc::new(LogTelemetry),
        };
    let annunciator = Arc::new(PinAnnunciator::new(
        outputs.clone(),
        settings.buzzer_pin,
        (settings.speaker1_pin, settings.speaker2_pin),
        settings.gpio_high(),
    ));

    // TODO: bind the RMT DS18B20 bus driver here once its
    // esp-idf-sys bindings are generated from the onewire component.
    // Until then this profile boots for commissioning only: the bus
    // is explicitly unbound and control runs are refused below.
    let probe_bus = Arc::new(UnboundProbeBus);
    log::error!(
        "no 1-Wire driver in this build profile: probes cannot be read and control runs will be refused"
    );

    let board = Board {
        clock: Arc::new(SystemClock),
        probe_bus,
        outputs,
        storage,
        telemetry,
        annunciator,
        platform: Arc::new(EspPlatform),
    };

    let engine = Arc::new(Engine::new());
    Engine::init(&engine, &board);

    // The request handler owns the foreground from here. With the
    // probe bus unbound the fused temperature would be pinned at its
    // no-probe value, so any run that slips in through the command
    // channel is stopped before it can heat blind.
    loop {
        if engine.control_run() {
            log::error!("refusing control run: no probe driver bound");
            engine.stop();
        }
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
fn main() -> Result<()> {
    use std::thread;
    use std::time::Duration;

    use brewctl::adapters::{SimPlatform, SimProbeBus};
    use brewctl::api;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let storage = Arc::new(NvsStore::new().map_err(|e| anyhow::anyhow!("store init: {e}"))?);
    let outputs = Arc::new(GpioBank::new());
    let probe_bus = Arc::new(SimProbeBus::new());
    probe_bus.attach(0xA100_0000_0000_0001, 20.0);

    let board = Board {
        clock: Arc::new(SystemClock),
        probe_bus: probe_bus.clone(),
        outputs: outputs.clone(),
        storage,
        telemetry: Arc::new(LogTelemetry),
        annunciator: Arc::new(PinAnnunciator::new(outputs.clone(), 0, (0, 0), true)),
        platform: Arc::new(SimPlatform),
    };

    let engine = Arc::new(Engine::new());
    Engine::init(&engine, &board);

    // Crude kettle model: heat while any heater pin is driven, bleed
    // towards ambient otherwise.
    {
        let engine = Arc::clone(&engine);
        let outputs = outputs.clone();
        let probe_bus = probe_bus.clone();
        thread::spawn(move || {
            let mut temperature = 20.0f32;
            loop {
                let heating = {
                    let heaters = engine.heaters.lock().unwrap();
                    heaters
                        .iter()
                        .any(|h| outputs.level(h.pin_nr).unwrap_or(false))
                };
                temperature += if heating { 0.15 } else { -0.01 };
                temperature = temperature.max(18.0);
                probe_bus.set_temperature(0xA100_0000_0000_0001, temperature);
                thread::sleep(Duration::from_millis(250));
            }
        });
    }

    info!("starting free run towards 30°");
    api::dispatch(
        &engine,
        &board,
        r#"{"command": "SetTemp", "data": {"targetTemp": 30}}"#,
    );
    api::dispatch(
        &engine,
        &board,
        r#"{"command": "Start", "data": {"selectedMashSchedule": null}}"#,
    );

    for _ in 0..6 {
        thread::sleep(Duration::from_secs(5));
        let reply = api::dispatch(&engine, &board, r#"{"command": "Data", "data": {}}"#);
        println!("{reply}");
    }

    api::dispatch(&engine, &board, r#"{"command": "Stop", "data": {}}"#);
    engine.set_run(false);
    thread::sleep(Duration::from_secs(2));
    info!("simulation done");
    Ok(())
}
