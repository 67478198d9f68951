//! Support library for the boxfit command-line interface.
//!
//! The binary in `main.rs` stays thin; argument parsing, command execution,
//! and logging setup live here so they can be exercised directly by tests.

pub mod cli;
pub mod logging;
