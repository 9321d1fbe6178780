//! brewctl — networked brewing controller core.
//!
//! Drives one or more resistive heaters to follow a multi-stage mash
//! schedule against DS18B20-class probes on a shared 1-Wire bus.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  GpioBank        NvsStore       SimProbeBus     MqttTelemetry  │
//! │  (OutputBank)    (StoragePort)  (ProbeBus)      (TelemetrySink)│
//! │  PinAnnunciator  SystemClock    SimPlatform                    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌──────────────────────────────────────────────────────────┐  │
//! │  │            Engine + tasks (control core)                 │  │
//! │  │  sensor fusion · PID · duty planner · schedule runner    │  │
//! │  └──────────────────────────────────────────────────────────┘  │
//! │                                                                │
//! │  api::dispatch (JSON command channel, bound by the firmware)   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os =
//! "espidf")]` inside the adapter modules; everything else builds and
//! tests on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod app;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod model;
pub mod persist;
pub mod run;
pub mod tasks;

pub use engine::Engine;
