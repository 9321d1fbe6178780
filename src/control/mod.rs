//! Closed-loop control: the kettle demand regulator and the heater
//! duty planner.

pub mod duty;
pub mod pid;

pub use pid::{Demand, Regulator, WindowInputs};
