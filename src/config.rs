//! Configuration file handling for picam-detect.
//!
//! Loads configuration from `~/.config/picam-detect/config.toml` or a custom
//! path. Every section and key is optional; omitted values take the defaults
//! below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::frame_grab::GrabPolicy;
use crate::capture::MethodKind;

/// Configuration file structure for picam-detect.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub detection: DetectionConfig,
}

/// `[capture]`: the fallback chain.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Destination image path
    pub output: PathBuf,
    /// Method order; each entry is tried at most once
    pub methods: Vec<MethodKind>,
    pub tool: ToolConfig,
    pub library: LibraryConfig,
    pub frame_grab: FrameGrabConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("capture.jpg"),
            methods: MethodKind::ALL.to_vec(),
            tool: ToolConfig::default(),
            library: LibraryConfig::default(),
            frame_grab: FrameGrabConfig::default(),
        }
    }
}

/// `[capture.tool]`: still-capture program.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolConfig {
    pub program: String,
    /// Tried in order when `program` is not installed
    pub fallback_programs: Vec<String>,
    /// Placeholders: {output}, {duration_ms}, {width}, {height}
    pub args: Vec<String>,
    pub duration_ms: u64,
    pub width: u32,
    pub height: u32,
    pub timeout_secs: u64,
    /// Time between SIGTERM and SIGKILL once the timeout hits
    pub grace_ms: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "libcamera-still".to_string(),
            fallback_programs: vec!["rpicam-still".to_string()],
            args: [
                "-n",
                "-t",
                "{duration_ms}",
                "--width",
                "{width}",
                "--height",
                "{height}",
                "-o",
                "{output}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            duration_ms: 1000,
            width: 1920,
            height: 1080,
            timeout_secs: 10,
            grace_ms: 500,
        }
    }
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[capture.library]`: camera-library handle.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    /// Settle time between start and capture
    pub warmup_ms: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1920,
            height: 1080,
            warmup_ms: 2000,
        }
    }
}

/// Frame-grab backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrabBackend {
    /// One-frame V4L2 grabs through ffmpeg
    #[default]
    Ffmpeg,
    /// nokhwa (requires the `webcam` feature)
    Native,
}

/// `[capture.frame_grab]`: index-based frame grabbing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FrameGrabConfig {
    pub backend: GrabBackend,
    pub ffmpeg: String,
    pub device_count: u32,
    pub read_attempts: u32,
    pub retry_delay_ms: u64,
    pub read_timeout_secs: u64,
    pub width: u32,
    pub height: u32,
}

impl Default for FrameGrabConfig {
    fn default() -> Self {
        let policy = GrabPolicy::default();
        Self {
            backend: GrabBackend::default(),
            ffmpeg: "ffmpeg".to_string(),
            device_count: policy.device_count,
            read_attempts: policy.read_attempts,
            retry_delay_ms: policy.retry_delay.as_millis() as u64,
            read_timeout_secs: 5,
            width: policy.width,
            height: policy.height,
        }
    }
}

impl FrameGrabConfig {
    pub fn policy(&self) -> GrabPolicy {
        GrabPolicy {
            device_count: self.device_count,
            read_attempts: self.read_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            width: self.width,
            height: self.height,
        }
    }
}

/// `[detection]`: the external detector.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub program: String,
    /// Placeholders: {model}, {input}, {confidence}, {project}
    pub args: Vec<String>,
    pub model: String,
    /// Class name whose detections are counted
    pub label: String,
    pub confidence: f32,
    /// Where the detector writes annotated images
    pub output_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            program: "yolo".to_string(),
            args: [
                "predict",
                "model={model}",
                "source={input}",
                "conf={confidence}",
                "project={project}",
                "name=detect",
                "exist_ok=True",
                "save=True",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            model: "yolov8n.pt".to_string(),
            label: "person".to_string(),
            confidence: 0.5,
            output_dir: PathBuf::from("detections"),
            timeout_secs: 120,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            source: e,
        })?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject values the chain cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if capture.methods.is_empty() {
            return Err(ConfigError::Invalid(
                "capture.methods must list at least one method".to_string(),
            ));
        }
        if capture.tool.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "capture.tool.program must not be empty".to_string(),
            ));
        }
        if capture.tool.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "capture.tool.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if capture.frame_grab.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "capture.frame_grab.read_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.detection.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "detection.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if capture.frame_grab.read_attempts == 0 {
            return Err(ConfigError::Invalid(
                "capture.frame_grab.read_attempts must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence) {
            return Err(ConfigError::Invalid(format!(
                "detection.confidence must be between 0.0 and 1.0, got {}",
                self.detection.confidence
            )));
        }
        Ok(())
    }

    /// Serialize the effective configuration.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(toml::ser::Error),
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("picam-detect").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/picam-detect/config.toml")
        })
}

/// Commented config written by `config init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# picam-detect configuration

[capture]
# Where the captured image is written
output = "capture.jpg"
# Methods tried in order: tool, library, frame-grab
methods = ["tool", "library", "frame-grab"]

[capture.tool]
# Still-capture program; fallbacks are tried when it is not installed
program = "libcamera-still"
fallback_programs = ["rpicam-still"]
# Placeholders: {output}, {duration_ms}, {width}, {height}
args = ["-n", "-t", "{duration_ms}", "--width", "{width}", "--height", "{height}", "-o", "{output}"]
duration_ms = 1000
width = 1920
height = 1080
# Hard limit; the tool is terminated past it
timeout_secs = 10
grace_ms = 500

[capture.library]
# Camera index for the camera library (needs the `webcam` build feature)
index = 0
width = 1920
height = 1080
warmup_ms = 2000

[capture.frame_grab]
# "ffmpeg" (V4L2 via ffmpeg) or "native" (needs the `webcam` build feature)
backend = "ffmpeg"
ffmpeg = "ffmpeg"
# Devices /dev/video0 .. /dev/video{device_count - 1}
device_count = 3
read_attempts = 5
retry_delay_ms = 500
read_timeout_secs = 5
width = 640
height = 480

[detection]
program = "yolo"
# Placeholders: {model}, {input}, {confidence}, {project}
args = ["predict", "model={model}", "source={input}", "conf={confidence}", "project={project}", "name=detect", "exist_ok=True", "save=True"]
model = "yolov8n.pt"
label = "person"
confidence = 0.5
output_dir = "detections"
timeout_secs = 120
"#;
