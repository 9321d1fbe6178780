//! Domain entities: heaters, probes, mash schedules.
//!
//! Everything here is plain owned data with serde contracts matching
//! the command channel (camelCase, probe ids as decimal strings).
//! Runtime-only fields are `#[serde(skip)]` so persisted blobs stay
//! free of transient state.

pub mod heater;
pub mod probe;
pub mod schedule;

pub use heater::Heater;
pub use probe::Probe;
pub use schedule::{MashSchedule, MashStep, Notification};
