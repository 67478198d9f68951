//! Command-line interface for the boxfit training pipeline.

mod commands;
mod render;

pub use commands::{
    Cli, CliError, Command, ExecutionSummary, ReshuffleArg, SampleCommand, SampleSummary,
    TrainCommand, TrainSummary, render_summary, run_cli,
};

#[cfg(test)]
mod tests;
