//! Command line interface

pub mod commands;

pub use commands::{execute, run_cli, Cli, Commands};
