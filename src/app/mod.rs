//! Application boundary: port traits and the board bundle.

pub mod ports;

pub use ports::{
    Annunciator, Board, Clock, OutputBank, PlatformPort, ProbeBus, StoragePort, TelemetrySample,
    TelemetrySink,
};
