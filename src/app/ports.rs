//! Port traits — the boundary between the control core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Engine / tasks (domain)
//! ```
//!
//! Driven adapters (1-Wire bus, GPIO, store, MQTT, buzzer, platform)
//! implement these traits. The core consumes them through [`Board`],
//! so the domain never touches hardware directly and every loop can
//! run against simulation adapters on the host.
//!
//! All port objects are `Send + Sync` because each control loop runs
//! on its own thread and shares the board by `Arc`.

use std::sync::Arc;

use crate::error::{ProbeError, StorageError};
use crate::run::temp_log::EpochSecs;

// ───────────────────────────────────────────────────────────────
// Time
// ───────────────────────────────────────────────────────────────

/// Wall-clock source. The runner works against absolute times and
/// tolerates small skews; long clock jumps are not modelled.
pub trait Clock: Send + Sync {
    /// Seconds since the UNIX epoch.
    fn now(&self) -> EpochSecs;
}

// ───────────────────────────────────────────────────────────────
// Probe bus (driven adapter: 1-Wire hardware → domain)
// ───────────────────────────────────────────────────────────────

/// The 1-Wire temperature bus with DS18B20-class devices.
///
/// The bus owns every device driver handle; the core refers to probes
/// only by their 64-bit address.
pub trait ProbeBus: Send + Sync {
    /// Enumerate device addresses currently present on the bus.
    fn scan(&self) -> Vec<u64>;

    /// Trigger a conversion and read the result in Celsius.
    /// May block for the conversion time (~750 ms at 12-bit).
    fn convert(&self, id: u64) -> Result<f32, ProbeError>;
}

// ───────────────────────────────────────────────────────────────
// Output pins (domain → GPIO)
// ───────────────────────────────────────────────────────────────

/// Digital output pins for heaters, stir motor, buzzer and the
/// status LED. Levels here are physical; the caller applies the
/// `invert_outputs` mapping.
pub trait OutputBank: Send + Sync {
    /// Reset a pin to output mode at the given level.
    fn configure(&self, pin: u8, level: bool);

    /// Drive a pin.
    fn write(&self, pin: u8, level: bool);
}

// ───────────────────────────────────────────────────────────────
// Telemetry (domain → MQTT / log)
// ───────────────────────────────────────────────────────────────

/// One history sample published per sensor cycle while a run is live.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub time: EpochSecs,
    pub temp: f32,
    pub target: f32,
    pub output: u8,
}

/// Outbound telemetry. Adapters decide where frames go (MQTT topic,
/// serial log, nothing at all).
pub trait TelemetrySink: Send + Sync {
    /// Whether publishing is worth the work (e.g. a broker is
    /// configured and connected).
    fn enabled(&self) -> bool;

    fn publish_sample(&self, sample: &TelemetrySample);

    /// Free-form remote log line (boost transitions and the like).
    fn log(&self, message: &str);
}

// ───────────────────────────────────────────────────────────────
// Annunciator (domain → buzzer + speaker)
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget user notification sounds. Implementations must not
/// block the runner; drive the hardware from their own thread.
pub trait Annunciator: Send + Sync {
    /// Hold the buzzer pin for the given number of seconds.
    fn buzz(&self, seconds: u8);

    /// Pulse the speaker pair: bursts of `burst_ms` with equal pauses,
    /// for `total_ms` overall.
    fn chime(&self, total_ms: u32, burst_ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Persistent store
// ───────────────────────────────────────────────────────────────

/// Key/value store with short string keys (≤ 15 chars) and opaque
/// byte values. Typed scalar helpers live in [`crate::persist`].
pub trait StoragePort: Send + Sync {
    fn read_blob(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    fn write_blob(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. `Ok(())` even if the key did not exist.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    fn exists(&self, key: &str) -> bool;

    /// Wipe the whole store (factory reset).
    fn erase_all(&self) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Platform
// ───────────────────────────────────────────────────────────────

/// Reboot/recovery hooks delegated to the platform.
pub trait PlatformPort: Send + Sync {
    /// Schedule a restart shortly after the current reply is sent.
    fn reboot(&self);

    /// Switch the boot partition to recovery. Returns a user-facing
    /// confirmation, or an error message when no recovery partition
    /// exists.
    fn boot_into_recovery(&self) -> Result<String, String>;
}

// ───────────────────────────────────────────────────────────────
// Board
// ───────────────────────────────────────────────────────────────

/// Every port the core needs, bundled for cheap cloning into task
/// threads.
#[derive(Clone)]
pub struct Board {
    pub clock: Arc<dyn Clock>,
    pub probe_bus: Arc<dyn ProbeBus>,
    pub outputs: Arc<dyn OutputBank>,
    pub storage: Arc<dyn StoragePort>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub annunciator: Arc<dyn Annunciator>,
    pub platform: Arc<dyn PlatformPort>,
}
