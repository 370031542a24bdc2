//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing, enums, and subcommand handlers.

mod args;
mod commands;
mod enums;

pub use args::{Args, Command, ConfigAction};
pub use commands::{
    apply_capture_overrides, capture, detect, doctor, handle_config_action, init_config,
    list_devices,
};
pub use enums::MethodArg;
