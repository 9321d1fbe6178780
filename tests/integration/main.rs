//! Integration suite: simulated board, real engine, JSON command
//! channel.

mod mock_hw;

mod command_tests;
mod run_flow_tests;
mod smoke_tests;
