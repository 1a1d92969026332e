//! Command-line entry point.

mod args;
mod commands;

pub use args::{Cli, Command};
pub use commands::run_command;
