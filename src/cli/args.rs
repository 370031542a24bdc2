//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::MethodArg;

/// Capture a still from a Raspberry Pi camera and count objects in it
#[derive(Parser, Debug)]
#[command(name = "picam-detect")]
#[command(version, about = "Camera capture with fallbacks, plus object detection", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture one image, falling back through the configured methods
    Capture {
        /// Output image path
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Methods to try, in order (repeatable)
        #[arg(long = "method", short, value_enum)]
        methods: Vec<MethodArg>,

        /// External tool timeout in seconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Capture (unless --image is given) and run the detector
    Detect {
        /// Use an existing image instead of capturing
        #[arg(long, short)]
        image: Option<PathBuf>,

        /// Capture output path
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Detection confidence threshold (0.0 to 1.0)
        #[arg(long, value_parser = parse_confidence)]
        confidence: Option<f32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List V4L2 nodes and libcamera cameras
    ListDevices,
    /// Check device permissions and installed tools
    Doctor,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

fn parse_confidence(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("confidence must be between 0.0 and 1.0, got {}", value))
    }
}
