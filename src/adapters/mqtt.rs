//! Telemetry sinks.
//!
//! While a run is active the read loop publishes one history sample
//! per second (time, temperature, target, demand) and the runner
//! emits occasional remote log lines. On ESP-IDF these go to an MQTT
//! broker under `brewctl/<hostname>/history` and `.../log`; the host
//! twin just logs (disabled for publishing, so loops skip the work).

use log::debug;

use crate::app::{TelemetrySample, TelemetrySink};

// ───────────────────────────────────────────────────────────────
// Host / fallback sink
// ───────────────────────────────────────────────────────────────

/// Debug-log sink used on the host and whenever no broker is
/// configured. Reports `enabled() == false` so publishers skip it.
#[derive(Default)]
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn enabled(&self) -> bool {
        false
    }

    fn publish_sample(&self, sample: &TelemetrySample) {
        debug!(
            "telemetry: t={} temp={} target={} output={}",
            sample.time, sample.temp, sample.target, sample.output
        );
    }

    fn log(&self, message: &str) {
        debug!("remote log: {message}");
    }
}

// ───────────────────────────────────────────────────────────────
// MQTT sink (ESP-IDF)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp_impl::MqttTelemetry;

#[cfg(target_os = "espidf")]
mod esp_impl {
    use std::sync::Mutex;

    use esp_idf_svc::mqtt::client::{EspMqttClient, MqttClientConfiguration, QoS};
    use log::warn;
    use serde_json::json;

    use crate::app::{TelemetrySample, TelemetrySink};

    pub struct MqttTelemetry {
        client: Mutex<EspMqttClient<'static>>,
        history_topic: String,
        log_topic: String,
    }

    impl MqttTelemetry {
        /// Connect to `uri` (must start with `mqtt://`); returns
        /// `None` when no broker is configured or the client could
        /// not be created.
        pub fn connect(uri: &str, hostname: &str) -> Option<Self> {
            if !uri.starts_with("mqtt://") {
                return None;
            }

            let config = MqttClientConfiguration {
                client_id: Some("brewctl"),
                ..Default::default()
            };
            let client = EspMqttClient::new_cb(uri, &config, |_| {})
                .map_err(|e| warn!("MQTT client creation failed: {e}"))
                .ok()?;

            Some(Self {
                client: Mutex::new(client),
                history_topic: format!("brewctl/{hostname}/history"),
                log_topic: format!("brewctl/{hostname}/log"),
            })
        }

        fn publish(&self, topic: &str, payload: &str) {
            let mut client = self.client.lock().unwrap();
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, true, payload.as_bytes()) {
                warn!("MQTT publish failed: {e}");
            }
        }
    }

    impl TelemetrySink for MqttTelemetry {
        fn enabled(&self) -> bool {
            true
        }

        fn publish_sample(&self, sample: &TelemetrySample) {
            let payload = json!({
                "time": sample.time,
                "temp": sample.temp,
                "target": sample.target,
                "output": sample.output,
            });
            self.publish(&self.history_topic, &payload.to_string());
        }

        fn log(&self, message: &str) {
            let payload = json!({ "level": "Debug", "message": message });
            self.publish(&self.log_topic, &payload.to_string());
        }
    }
}
